use criterion::{criterion_group, criterion_main, Criterion, black_box};

use std::time::{Duration, Instant};

use tessera::core::config::{CanvasConfig, ChunkConfig, FadeConfig};
use tessera::core::input::MovementKeys;
use tessera::core::Result;
use tessera::media::MediaItem;
use tessera::render::fade;
use tessera::streaming::{ChunkCoord, ChunkLayout, ImmediateScheduler};
use tessera::texture::{Decoded, DecodedImage, LoadRequest, LoadResult, TextureLoader};
use tessera::Canvas;

/// Completes every request on the next poll with a tiny solid image
#[derive(Default)]
struct InstantLoader {
    ready: Vec<LoadResult>,
}

impl TextureLoader for InstantLoader {
    fn request(&mut self, request: LoadRequest) -> Result<()> {
        self.ready.push(LoadResult {
            id: request.id,
            url: request.url,
            outcome: Ok(Decoded::still(DecodedImage::solid(4, 4, [200, 200, 200, 255]))),
        });
        Ok(())
    }

    fn poll_results(&mut self) -> Vec<LoadResult> {
        std::mem::take(&mut self.ready)
    }

    fn in_flight(&self) -> usize {
        self.ready.len()
    }
}

fn bench_layout_generate(c: &mut Criterion) {
    let layout = ChunkLayout::new(&ChunkConfig::default(), 32);
    let mut i = 0i32;

    c.bench_function("layout_generate", |b| {
        b.iter(|| {
            i = i.wrapping_add(1);
            layout.generate(black_box(ChunkCoord::new(i, -i, i / 3)))
        });
    });
}

fn bench_fade_target(c: &mut Criterion) {
    let config = FadeConfig::default();

    c.bench_function("fade_target_1000", |b| {
        b.iter(|| {
            let mut sum = 0.0f32;
            for n in 0..1000u32 {
                sum += fade::fade_target(black_box(n % 5), black_box(n as f32 * 0.3), &config);
            }
            sum
        });
    });
}

fn bench_canvas_frame(c: &mut Criterion) {
    let media: Vec<MediaItem> = (0..16)
        .map(|i| MediaItem::image(format!("bench/{}.png", i), 640.0, 480.0))
        .collect();
    let start = Instant::now();
    let mut canvas = Canvas::new(
        CanvasConfig::default(),
        media,
        Box::new(ImmediateScheduler::new()),
        Box::new(InstantLoader::default()),
        16.0 / 9.0,
        start,
    );
    canvas.run_deferred(start);

    let mut frame = 0u32;
    c.bench_function("canvas_frame", |b| {
        b.iter(|| {
            frame += 1;
            let now = start + Duration::from_millis(16) * frame;
            canvas.frame(black_box(MovementKeys::default()), now)
        });
    });
}

criterion_group!(benches, bench_layout_generate, bench_fade_target, bench_canvas_frame);
criterion_main!(benches);
