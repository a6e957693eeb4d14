//! CPU-side decoding of fetched media bytes
//!
//! Images decode to an RGBA8 mip chain, built here so the frame loop only
//! copies finished levels. Clips decode to a list of RGBA8 frames with
//! per-frame delays: MP4/H.264 through openh264, animated GIF and APNG
//! through `image`. Any other still format becomes a one-frame clip.

use std::io::Cursor;
use std::time::Duration;

use image::codecs::gif::GifDecoder;
use image::codecs::png::PngDecoder;
use image::{AnimationDecoder, ImageFormat, RgbaImage};
use openh264::formats::YUVSource;

use crate::core::error::Error;
use crate::core::types::Result;
use crate::media::MediaKind;

/// Shortest frame delay honoured when playing a clip
pub const MIN_FRAME_DELAY: Duration = Duration::from_millis(20);

/// Frames kept from a single MP4 clip. Decoded clips stay on the CPU for
/// their whole life, so longer clips are cut.
pub const MAX_CLIP_FRAMES: u32 = 300;

const START_CODE: [u8; 4] = [0, 0, 0, 1];

/// Tightly packed RGBA8 pixels
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    pub fn from_rgba(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self { width, height, pixels: image.into_raw() }
    }

    /// Single-color image
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = rgba.repeat((width * height) as usize);
        Self { width, height, pixels }
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }

    /// Half-size copy using a 2x2 box filter. Odd edges clamp.
    pub fn downsample(&self) -> DecodedImage {
        let width = (self.width / 2).max(1);
        let height = (self.height / 2).max(1);
        let mut pixels = Vec::with_capacity((width * height * 4) as usize);

        let texel = |x: u32, y: u32, c: usize| -> u32 {
            let x = x.min(self.width - 1);
            let y = y.min(self.height - 1);
            self.pixels[((y * self.width + x) * 4) as usize + c] as u32
        };

        for y in 0..height {
            for x in 0..width {
                let (sx, sy) = (x * 2, y * 2);
                for c in 0..4 {
                    let sum = texel(sx, sy, c) + texel(sx + 1, sy, c) + texel(sx, sy + 1, c) + texel(sx + 1, sy + 1, c);
                    pixels.push(((sum + 2) / 4) as u8);
                }
            }
        }

        DecodedImage { width, height, pixels }
    }

    /// This image followed by successively halved copies down to 1x1
    pub fn mip_chain(&self) -> Vec<DecodedImage> {
        let mut chain = vec![self.clone()];
        while let Some(last) = chain.last() {
            if last.width == 1 && last.height == 1 {
                break;
            }
            let next = last.downsample();
            chain.push(next);
        }
        chain
    }
}

/// Number of mip levels for a full chain down to 1x1
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClipFrame {
    pub image: DecodedImage,
    pub delay: Duration,
}

/// Decoded media, ready to become a texture
#[derive(Clone, Debug)]
pub enum Decoded {
    /// Mip levels, full size first
    Image(Vec<DecodedImage>),
    Clip(Vec<ClipFrame>),
}

impl Decoded {
    /// A still image with its full mip chain
    pub fn still(image: DecodedImage) -> Self {
        Decoded::Image(image.mip_chain())
    }

    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Decoded::Image(levels) => levels.first().map(|l| (l.width, l.height)).unwrap_or((0, 0)),
            Decoded::Clip(frames) => frames.first().map(|f| (f.image.width, f.image.height)).unwrap_or((0, 0)),
        }
    }
}

/// Decode fetched bytes according to the media kind
pub fn decode(kind: MediaKind, bytes: &[u8]) -> Result<Decoded> {
    match kind {
        MediaKind::Image => decode_image(bytes).map(Decoded::still),
        MediaKind::Video => decode_clip(bytes).map(Decoded::Clip),
    }
}

pub fn decode_image(bytes: &[u8]) -> Result<DecodedImage> {
    let image = image::load_from_memory(bytes)?;
    Ok(DecodedImage::from_rgba(image.to_rgba8()))
}

/// Decode every frame of a looping clip
pub fn decode_clip(bytes: &[u8]) -> Result<Vec<ClipFrame>> {
    if is_mp4(bytes) {
        return decode_mp4(bytes);
    }

    let format = image::guess_format(bytes)?;
    let frames = match format {
        ImageFormat::Gif => GifDecoder::new(Cursor::new(bytes))?.into_frames().collect_frames()?,
        ImageFormat::Png => {
            let decoder = PngDecoder::new(Cursor::new(bytes))?;
            if decoder.is_apng()? {
                decoder.apng()?.into_frames().collect_frames()?
            } else {
                return single_frame(bytes);
            }
        }
        _ => return single_frame(bytes),
    };

    if frames.is_empty() {
        return Err(Error::Decode("clip has no frames".to_string()));
    }

    Ok(frames
        .into_iter()
        .map(|frame| {
            let (numer, denom) = frame.delay().numer_denom_ms();
            let delay = Duration::from_secs_f64(numer as f64 / denom.max(1) as f64 / 1000.0);
            ClipFrame {
                image: DecodedImage::from_rgba(frame.into_buffer()),
                delay: delay.max(MIN_FRAME_DELAY),
            }
        })
        .collect())
}

fn single_frame(bytes: &[u8]) -> Result<Vec<ClipFrame>> {
    Ok(vec![ClipFrame { image: decode_image(bytes)?, delay: MIN_FRAME_DELAY }])
}

/// ISO base media files open with an `ftyp` box
pub fn is_mp4(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[4..8] == b"ftyp"
}

/// Decode the first H.264 track of an MP4 file into RGBA frames
pub fn decode_mp4(bytes: &[u8]) -> Result<Vec<ClipFrame>> {
    let mut reader = mp4::Mp4Reader::read_header(Cursor::new(bytes), bytes.len() as u64)?;

    let (track_id, timescale, mut parameter_sets) = {
        let track = reader
            .tracks()
            .values()
            .find(|track| matches!(track.media_type(), Ok(mp4::MediaType::H264)))
            .ok_or_else(|| Error::Decode("mp4 has no H.264 video track".to_string()))?;
        let mut sets = Vec::new();
        push_annex_b(&mut sets, track.sequence_parameter_set()?);
        push_annex_b(&mut sets, track.picture_parameter_set()?);
        (track.track_id(), track.timescale().max(1), sets)
    };

    let sample_count = reader.sample_count(track_id)?;
    if sample_count > MAX_CLIP_FRAMES {
        log::warn!("Clip has {} frames, keeping the first {}", sample_count, MAX_CLIP_FRAMES);
    }

    let mut decoder = openh264::decoder::Decoder::new()?;
    let mut frames = Vec::new();
    let mut packet = Vec::new();
    // Time of samples that produced no picture rolls into the next frame
    let mut carried = Duration::ZERO;

    for sample_id in 1..=sample_count.min(MAX_CLIP_FRAMES) {
        let Some(sample) = reader.read_sample(track_id, sample_id)? else {
            continue;
        };
        carried += Duration::from_secs_f64(sample.duration as f64 / timescale as f64);

        packet.clear();
        packet.extend_from_slice(&parameter_sets);
        if let Err(e) = avcc_to_annex_b(&sample.bytes, &mut packet) {
            log::warn!("Skipping H.264 sample {}: {}", sample_id, e);
            continue;
        }
        parameter_sets.clear();

        match decoder.decode(&packet) {
            Ok(Some(yuv)) => {
                frames.push(ClipFrame { image: yuv_to_rgba(&yuv), delay: carried.max(MIN_FRAME_DELAY) });
                carried = Duration::ZERO;
            }
            Ok(None) => {}
            Err(e) => log::warn!("Skipping undecodable H.264 sample {}: {}", sample_id, e),
        }
    }

    if frames.is_empty() {
        return Err(Error::Decode("mp4 clip produced no frames".to_string()));
    }
    Ok(frames)
}

fn push_annex_b(out: &mut Vec<u8>, nal: &[u8]) {
    out.extend_from_slice(&START_CODE);
    out.extend_from_slice(nal);
}

/// Rewrite 4-byte length-prefixed NAL units with start codes
fn avcc_to_annex_b(sample: &[u8], out: &mut Vec<u8>) -> Result<()> {
    let mut rest = sample;
    while !rest.is_empty() {
        let Some((prefix, tail)) = rest.split_first_chunk::<4>() else {
            return Err(Error::Decode("truncated NAL length".to_string()));
        };
        let len = u32::from_be_bytes(*prefix) as usize;
        if tail.len() < len {
            return Err(Error::Decode(format!("NAL of {} bytes overruns sample", len)));
        }
        let (nal, tail) = tail.split_at(len);
        push_annex_b(out, nal);
        rest = tail;
    }
    Ok(())
}

fn yuv_to_rgba(yuv: &openh264::decoder::DecodedYUV<'_>) -> DecodedImage {
    let (width, height) = yuv.dimensions();
    let mut pixels = vec![0; width * height * 4];
    yuv.write_rgba8(&mut pixels);
    DecodedImage { width: width as u32, height: height as u32, pixels }
}
