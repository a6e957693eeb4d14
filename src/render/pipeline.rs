//! Textured tile pipeline
//!
//! Tiles are drawn as instanced quads. Per-tile data lives in one storage
//! buffer indexed by `instance_index`; the quad corners come from
//! `vertex_index`, so there is no vertex buffer. Two pipeline variants share
//! the shader: one writes depth (opaque tiles), one does not (fading tiles).

use std::ops::Range;

use bytemuck::{Pod, Zeroable};

use crate::core::camera::Camera;
use crate::core::config::FogConfig;

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Frame-wide uniforms (must match `Globals` in tile.wgsl)
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct TileGlobals {
    pub view_proj: [[f32; 4]; 4],
    pub camera_pos: [f32; 4],
    pub fog_color: [f32; 4],
    /// x = near, y = far
    pub fog: [f32; 4],
}

impl TileGlobals {
    pub fn new(camera: &Camera, fog: &FogConfig) -> Self {
        let [r, g, b] = fog.color.to_linear();
        Self {
            view_proj: camera.view_projection().to_cols_array_2d(),
            camera_pos: camera.position.extend(1.0).to_array(),
            fog_color: [r, g, b, 1.0],
            fog: [fog.near, fog.far, 0.0, 0.0],
        }
    }
}

/// Per-tile instance data (must match `TileInstance` in tile.wgsl)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct TileInstance {
    pub center: [f32; 3],
    pub opacity: f32,
    pub size: [f32; 2],
    pub _pad: [f32; 2],
}

/// A run of instances sharing one texture
pub struct DrawBatch<'a> {
    pub texture: &'a wgpu::BindGroup,
    pub instances: Range<u32>,
    /// Draw with depth writes
    pub opaque: bool,
}

pub struct TilePipeline {
    opaque: wgpu::RenderPipeline,
    translucent: wgpu::RenderPipeline,
    globals_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    globals_buffer: wgpu::Buffer,
    instance_buffer: wgpu::Buffer,
    instance_capacity: u64,
    globals_bind_group: wgpu::BindGroup,
    mipmapped_sampler: wgpu::Sampler,
    linear_sampler: wgpu::Sampler,
    depth_view: wgpu::TextureView,
}

impl TilePipeline {
    const INITIAL_INSTANCES: u64 = 1024;

    pub fn new(device: &wgpu::Device, surface_format: wgpu::TextureFormat, width: u32, height: u32) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("tile_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../shaders/tile.wgsl").into()),
        });

        let globals_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("tile_globals_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("tile_texture_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("tile_pipeline_layout"),
            bind_group_layouts: &[&globals_layout, &texture_layout],
            immediate_size: 0,
        });

        let make_pipeline = |label: &str, depth_write: bool| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    buffers: &[],
                    compilation_options: Default::default(),
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: depth_write,
                    depth_compare: wgpu::CompareFunction::LessEqual,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: surface_format,
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                multiview_mask: None,
                cache: None,
            })
        };
        let opaque = make_pipeline("tile_opaque_pipeline", true);
        let translucent = make_pipeline("tile_translucent_pipeline", false);

        let globals_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("tile_globals"),
            size: std::mem::size_of::<TileGlobals>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let instance_buffer = Self::create_instance_buffer(device, Self::INITIAL_INSTANCES);
        let globals_bind_group = Self::create_globals_bind_group(device, &globals_layout, &globals_buffer, &instance_buffer);

        let mipmapped_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("tile_sampler_mipmapped"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Linear,
            anisotropy_clamp: 4,
            ..Default::default()
        });
        let linear_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("tile_sampler_linear"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let depth_view = Self::create_depth_view(device, width, height);

        Self {
            opaque,
            translucent,
            globals_layout,
            texture_layout,
            globals_buffer,
            instance_buffer,
            instance_capacity: Self::INITIAL_INSTANCES,
            globals_bind_group,
            mipmapped_sampler,
            linear_sampler,
            depth_view,
        }
    }

    fn create_instance_buffer(device: &wgpu::Device, capacity: u64) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("tile_instances"),
            size: capacity * std::mem::size_of::<TileInstance>() as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn create_globals_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        globals: &wgpu::Buffer,
        instances: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("tile_globals_bind_group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: globals.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: instances.as_entire_binding(),
                },
            ],
        })
    }

    fn create_depth_view(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
        let depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("tile_depth"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        depth.create_view(&wgpu::TextureViewDescriptor::default())
    }

    /// Recreate the depth target after a surface resize
    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        self.depth_view = Self::create_depth_view(device, width, height);
    }

    /// Bind group for one tile texture. Mipmapped textures get trilinear,
    /// anisotropic sampling; clips get plain linear sampling.
    pub fn create_texture_bind_group(
        &self,
        device: &wgpu::Device,
        view: &wgpu::TextureView,
        mipmapped: bool,
    ) -> wgpu::BindGroup {
        let sampler = if mipmapped { &self.mipmapped_sampler } else { &self.linear_sampler };
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("tile_texture_bind_group"),
            layout: &self.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        })
    }

    /// Upload this frame's uniforms and instances, growing the instance
    /// buffer when needed.
    pub fn prepare(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, globals: &TileGlobals, instances: &[TileInstance]) {
        let needed = instances.len() as u64;
        if needed > self.instance_capacity {
            let capacity = needed.next_power_of_two();
            log::debug!("Growing tile instance buffer to {} instances", capacity);
            self.instance_buffer = Self::create_instance_buffer(device, capacity);
            self.instance_capacity = capacity;
            self.globals_bind_group = Self::create_globals_bind_group(
                device,
                &self.globals_layout,
                &self.globals_buffer,
                &self.instance_buffer,
            );
        }

        queue.write_buffer(&self.globals_buffer, 0, bytemuck::bytes_of(globals));
        if !instances.is_empty() {
            queue.write_buffer(&self.instance_buffer, 0, bytemuck::cast_slice(instances));
        }
    }

    /// Clear the target and draw the batches in order
    pub fn render(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        clear: wgpu::Color,
        batches: &[DrawBatch<'_>],
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("tile_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Discard,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        pass.set_bind_group(0, &self.globals_bind_group, &[]);
        let mut current_opaque = None;
        for batch in batches {
            if current_opaque != Some(batch.opaque) {
                pass.set_pipeline(if batch.opaque { &self.opaque } else { &self.translucent });
                current_opaque = Some(batch.opaque);
            }
            pass.set_bind_group(1, batch.texture, &[]);
            pass.draw(0..6, batch.instances.clone());
        }
    }
}
