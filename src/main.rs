//! Tessera - infinite media canvas viewer

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{CursorIcon, Window, WindowId},
};

use tessera::core::{
    camera_controller::CursorStyle,
    config::CanvasConfig,
    error::Error,
    input::InputState,
    logging,
};
use tessera::media::{self, MediaItem};
use tessera::render::Renderer;
use tessera::streaming::IdleScheduler;
use tessera::texture::AsyncTextureLoader;
use tessera::Canvas;

/// Concurrent texture fetches
const MAX_CONCURRENT_LOADS: usize = 6;

#[derive(Parser, Debug)]
#[command(name = "tessera", about = "Fly through an infinite canvas of images and clips")]
struct Args {
    /// JSON manifest listing the media to tile
    #[arg(short, long)]
    media: PathBuf,

    /// Optional JSON config overriding the defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = 1280)]
    width: u32,

    #[arg(long, default_value_t = 720)]
    height: u32,
}

struct App {
    config: CanvasConfig,
    media: Vec<MediaItem>,
    size: PhysicalSize<u32>,
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,
    canvas: Option<Canvas>,
    input: InputState,
    cursor: CursorStyle,
    title: String,
}

impl App {
    fn new(config: CanvasConfig, media: Vec<MediaItem>, size: PhysicalSize<u32>) -> Self {
        Self {
            config,
            media,
            size,
            window: None,
            renderer: None,
            canvas: None,
            input: InputState::new(size.width, size.height),
            cursor: CursorStyle::Grab,
            title: String::new(),
        }
    }

    fn init(&mut self, window: Arc<Window>) -> Result<(), Error> {
        let size = window.inner_size();
        let renderer = pollster::block_on(Renderer::new(window.clone()))?;
        let loader = AsyncTextureLoader::new(MAX_CONCURRENT_LOADS)?;
        let scheduler = IdleScheduler::new(self.config.chunks.idle_budget(), self.config.chunks.idle_timeout());

        let mut canvas = Canvas::new(
            self.config.clone(),
            std::mem::take(&mut self.media),
            Box::new(scheduler),
            Box::new(loader),
            size.width.max(1) as f32 / size.height.max(1) as f32,
            Instant::now(),
        );
        canvas.set_progress_callback(Box::new(|percent| log::info!("Loading media: {}%", percent)));

        self.input.set_viewport(size.width, size.height);
        log::info!("Window created: {}x{}", size.width, size.height);

        window.set_cursor(CursorIcon::Grab);
        self.renderer = Some(renderer);
        self.canvas = Some(canvas);
        self.window = Some(window);
        Ok(())
    }

    fn redraw(&mut self) {
        let (Some(window), Some(renderer), Some(canvas)) = (&self.window, &mut self.renderer, &mut self.canvas) else {
            return;
        };

        for event in self.input.drain_events() {
            canvas.handle_input(&event);
        }
        canvas.set_touch_primary(self.input.is_touch_primary());
        canvas.frame(self.input.movement_keys(), Instant::now());

        if let Err(e) = renderer.render(canvas) {
            log::error!("Render failed: {}", e);
        }

        // Layout generation runs in the time left after submission
        canvas.run_deferred(Instant::now());

        let cursor = canvas.cursor();
        if cursor != self.cursor {
            window.set_cursor(match cursor {
                CursorStyle::Grab => CursorIcon::Grab,
                CursorStyle::Grabbing => CursorIcon::Grabbing,
            });
            self.cursor = cursor;
        }

        let title = canvas.window_title();
        if title != self.title {
            window.set_title(&title);
            self.title = title;
        }

        window.request_redraw();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = Window::default_attributes()
            .with_title("Tessera")
            .with_inner_size(self.size);

        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        if let Err(e) = self.init(window) {
            log::error!("Failed to initialise canvas: {}", e);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        self.input.process_event(&event);

        match event {
            WindowEvent::CloseRequested => {
                log::info!("Window close requested");
                event_loop.exit();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed() && event.physical_key == PhysicalKey::Code(KeyCode::Escape) {
                    event_loop.exit();
                }
            }
            WindowEvent::Resized(size) => {
                if size.width > 0 && size.height > 0 {
                    self.input.set_viewport(size.width, size.height);
                    if let Some(renderer) = &mut self.renderer {
                        renderer.resize(size.width, size.height);
                    }
                    if let Some(canvas) = &mut self.canvas {
                        canvas.resize(size.width, size.height);
                    }
                }
            }
            WindowEvent::RedrawRequested => self.redraw(),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

fn main() -> Result<(), Error> {
    logging::init();
    let args = Args::parse();
    log::info!("Tessera starting...");

    let config = match &args.config {
        Some(path) => {
            log::info!("Loading config from: {}", path.display());
            CanvasConfig::load(path)?
        }
        None => CanvasConfig::default(),
    };

    let media = media::load_manifest(&args.media)?;
    log::info!("Loaded {} media items from {}", media.len(), args.media.display());

    let event_loop = EventLoop::new()
        .map_err(|e| Error::Window(format!("Failed to create event loop: {}", e)))?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config, media, PhysicalSize::new(args.width, args.height));
    event_loop
        .run_app(&mut app)
        .map_err(|e| Error::Window(format!("Event loop error: {}", e)))?;

    Ok(())
}
