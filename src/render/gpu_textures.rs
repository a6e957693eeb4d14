//! GPU copies of cached textures
//!
//! Still images upload once with the mip chain built at decode time. Clips
//! are created without mips and rewritten whenever the cache flags a new
//! frame.

use std::collections::HashMap;

use crate::render::pipeline::TilePipeline;
use crate::texture::cache::{Texture, TextureCache};
use crate::texture::decode::DecodedImage;

pub const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

pub struct GpuTexture {
    texture: wgpu::Texture,
    pub bind_group: wgpu::BindGroup,
    pub size: (u32, u32),
    pub mip_levels: u32,
}

/// GPU textures keyed by cache texture id
#[derive(Default)]
pub struct GpuTextures {
    textures: HashMap<u64, GpuTexture>,
    bytes: u64,
}

impl GpuTextures {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upload every texture the cache has flagged. Returns the number of
    /// uploads issued.
    pub fn sync(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        pipeline: &TilePipeline,
        cache: &TextureCache,
    ) -> usize {
        let mut uploads = 0;
        let pending = std::iter::once(cache.placeholder()).chain(cache.textures());
        for texture in pending {
            if !texture.is_ready() || !texture.needs_upload() {
                continue;
            }
            if self.upload(device, queue, pipeline, texture) {
                uploads += 1;
            }
            texture.mark_uploaded();
        }
        uploads
    }

    fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, pipeline: &TilePipeline, texture: &Texture) -> bool {
        let Some(frame) = texture.current_frame() else {
            return false;
        };

        if let Some(existing) = self.textures.get(&texture.id()) {
            if existing.size == (frame.width, frame.height) && existing.mip_levels == 1 {
                write_level(queue, &existing.texture, 0, &frame);
                return true;
            }
        }

        let levels = texture.mip_levels();
        let mipmapped = levels.as_ref().is_some_and(|l| l.len() > 1);
        let mip_levels = levels.as_ref().map_or(1, |l| l.len() as u32);
        let gpu_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("tile_texture"),
            size: wgpu::Extent3d {
                width: frame.width.max(1),
                height: frame.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: mip_levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        match &levels {
            Some(levels) => {
                for (level, image) in levels.iter().enumerate() {
                    write_level(queue, &gpu_texture, level as u32, image);
                }
            }
            None => write_level(queue, &gpu_texture, 0, &frame),
        }

        let view = gpu_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = pipeline.create_texture_bind_group(device, &view, mipmapped);
        self.bytes += match &levels {
            Some(levels) => levels.iter().map(|l| l.byte_len() as u64).sum(),
            None => frame.byte_len() as u64,
        };
        log::debug!(
            "Uploaded {} ({}x{}, {} mips)",
            texture.url(), frame.width, frame.height, mip_levels
        );

        if let Some(old) = self.textures.insert(
            texture.id(),
            GpuTexture {
                texture: gpu_texture,
                bind_group,
                size: (frame.width, frame.height),
                mip_levels,
            },
        ) {
            old.texture.destroy();
        }
        true
    }

    pub fn get(&self, texture_id: u64) -> Option<&GpuTexture> {
        self.textures.get(&texture_id)
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    /// Approximate bytes uploaded so far, mip chains included
    pub fn uploaded_bytes(&self) -> u64 {
        self.bytes
    }
}

fn write_level(queue: &wgpu::Queue, texture: &wgpu::Texture, mip_level: u32, image: &DecodedImage) {
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &image.pixels,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * image.width),
            rows_per_image: Some(image.height),
        },
        wgpu::Extent3d {
            width: image.width,
            height: image.height,
            depth_or_array_layers: 1,
        },
    );
}
