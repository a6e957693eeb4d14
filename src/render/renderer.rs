//! Frame rendering for a [`Canvas`]

use std::sync::Arc;

use winit::window::Window;

use crate::canvas::{Canvas, DrawItem};
use crate::core::error::Error;
use crate::render::context::GpuContext;
use crate::render::gpu_textures::GpuTextures;
use crate::render::pipeline::{DrawBatch, TileGlobals, TileInstance, TilePipeline};

pub struct Renderer {
    context: GpuContext,
    pipeline: TilePipeline,
    textures: GpuTextures,
}

impl Renderer {
    pub async fn new(window: Arc<Window>) -> Result<Self, Error> {
        let context = GpuContext::new(window).await?;
        let (width, height) = context.size();
        let pipeline = TilePipeline::new(&context.device, context.format(), width, height);
        Ok(Self {
            context,
            pipeline,
            textures: GpuTextures::new(),
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.context.resize(width, height);
        self.pipeline.resize(&self.context.device, width, height);
    }

    /// Upload pending textures and draw the canvas' visible tiles
    pub fn render(&mut self, canvas: &Canvas) -> Result<(), Error> {
        let uploads = self.textures.sync(
            &self.context.device,
            &self.context.queue,
            &self.pipeline,
            canvas.textures(),
        );
        if uploads > 0 {
            log::trace!("{} texture uploads ({} bytes resident)", uploads, self.textures.uploaded_bytes());
        }

        let draws = canvas.draw_list();
        let instances: Vec<TileInstance> = draws.iter().map(tile_instance).collect();
        let globals = TileGlobals::new(canvas.camera(), &canvas.config().fog);
        self.pipeline.prepare(&self.context.device, &self.context.queue, &globals, &instances);

        let batches = self.batches(&draws);

        let frame = match self.context.get_current_texture() {
            Ok(frame) => frame,
            Err(e) => {
                // Lost or outdated surfaces recover on the next frame
                log::warn!("Skipping frame: {}", e);
                self.context.reconfigure();
                return Ok(());
            }
        };
        let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let [r, g, b] = canvas.config().background_color.to_linear();
        let clear = wgpu::Color { r: r as f64, g: g as f64, b: b as f64, a: 1.0 };

        let mut encoder = self.context.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("tile_encoder"),
        });
        self.pipeline.render(&mut encoder, &view, clear, &batches);
        self.context.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        Ok(())
    }

    /// Merge consecutive draws that share a texture and pipeline variant
    fn batches<'a>(&'a self, draws: &[DrawItem]) -> Vec<DrawBatch<'a>> {
        let mut batches: Vec<DrawBatch<'a>> = Vec::new();
        let mut last: Option<(u64, bool)> = None;

        for (index, draw) in draws.iter().enumerate() {
            let index = index as u32;
            let Some(gpu) = self.textures.get(draw.texture_id) else {
                continue;
            };
            match batches.last_mut() {
                Some(batch) if last == Some((draw.texture_id, draw.opaque)) && batch.instances.end == index => {
                    batch.instances.end = index + 1;
                }
                _ => {
                    batches.push(DrawBatch {
                        texture: &gpu.bind_group,
                        instances: index..index + 1,
                        opaque: draw.opaque,
                    });
                    last = Some((draw.texture_id, draw.opaque));
                }
            }
        }
        batches
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
    }
}

fn tile_instance(draw: &DrawItem) -> TileInstance {
    TileInstance {
        center: draw.center.to_array(),
        opacity: draw.opacity,
        size: draw.size.to_array(),
        _pad: [0.0; 2],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec2, Vec3};

    #[test]
    fn test_tile_instance_from_draw() {
        let draw = DrawItem {
            texture_id: 7,
            center: Vec3::new(1.0, 2.0, 3.0),
            size: Vec2::new(4.0, 5.0),
            opacity: 0.5,
            opaque: false,
        };
        let instance = tile_instance(&draw);
        assert_eq!(instance.center, [1.0, 2.0, 3.0]);
        assert_eq!(instance.size, [4.0, 5.0]);
        assert_eq!(instance.opacity, 0.5);
    }
}
