//! Test-pattern frame source.
//!
//! Produces moving colour bars in any `PixelFormat`, paced to a target frame
//! rate and backed by the same bounded buffer pool a sensor driver has. Used
//! when no camera is attached and throughout the tests.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::Rng;

use super::pool::BufferPool;
use crate::encode::{Encoder, SoftwareEncoder};
use crate::error::CaptureError;
use crate::frame::{Frame, FrameSource, PixelFormat, Timestamp};

/// Quality of the pre-encoded frames a `Jpeg` pattern source hands out.
const SENSOR_JPEG_QUALITY: u8 = 90;

/// Configuration for a synthetic source.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Frames per second; 0 delivers as fast as buffers allow.
    pub fps: u32,
    /// Number of frame buffers.
    pub fb_count: usize,
    pub acquire_timeout: Duration,
    /// Amplitude of per-pixel noise added to the pattern.
    pub noise: u8,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            format: PixelFormat::Jpeg,
            fps: 25,
            fb_count: 2,
            acquire_timeout: Duration::from_millis(5000),
            noise: 0,
        }
    }
}

/// Statistics for a synthetic source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntheticStats {
    pub frames_captured: u64,
    pub in_flight: usize,
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    pool: BufferPool,
    clock: Mutex<Pacing>,
    encoder: SoftwareEncoder,
}

struct Pacing {
    frame_count: u64,
    next_due: Option<Instant>,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        log::info!(
            "SyntheticSource: {}x{} {:?} at {} fps, {} buffers",
            config.width,
            config.height,
            config.format,
            config.fps,
            config.fb_count
        );
        Self {
            pool: BufferPool::new(config.fb_count),
            clock: Mutex::new(Pacing {
                frame_count: 0,
                next_due: None,
            }),
            encoder: SoftwareEncoder::new(),
            config,
        }
    }

    /// Stop handing out frames; blocked and future acquires fail with
    /// `CaptureError::Closed`.
    pub fn close(&self) {
        self.pool.close();
    }

    pub fn stats(&self) -> SyntheticStats {
        let frames_captured = self
            .clock
            .lock()
            .map(|pacing| pacing.frame_count)
            .unwrap_or(0);
        SyntheticStats {
            frames_captured,
            in_flight: self.pool.in_flight(),
        }
    }

    /// Reserve the next frame slot and sleep until it is due.
    fn next_slot(&self) -> Result<u64, CaptureError> {
        let (sequence, due) = {
            let mut pacing = self
                .clock
                .lock()
                .map_err(|_| CaptureError::Device("pacing lock poisoned".to_string()))?;
            pacing.frame_count += 1;
            let now = Instant::now();
            let due = match (pacing.next_due, self.frame_interval()) {
                (Some(due), Some(_)) if due > now => due,
                _ => now,
            };
            pacing.next_due = self.frame_interval().map(|interval| due + interval);
            (pacing.frame_count, due)
        };
        let now = Instant::now();
        if due > now {
            std::thread::sleep(due - now);
        }
        Ok(sequence)
    }

    fn frame_interval(&self) -> Option<Duration> {
        (self.config.fps > 0).then(|| Duration::from_secs(1) / self.config.fps)
    }

    fn render(&self, sequence: u64, buf: &mut Vec<u8>) -> Result<(), CaptureError> {
        let SyntheticConfig {
            width,
            height,
            format,
            noise,
            ..
        } = self.config;
        match format {
            PixelFormat::Jpeg => {
                let mut rgb = Vec::new();
                fill_pattern(
                    PixelFormat::Rgb888,
                    width,
                    height,
                    sequence,
                    noise,
                    &mut rgb,
                );
                let raw = Frame::new(
                    PixelFormat::Rgb888,
                    width,
                    height,
                    rgb,
                    Timestamp::now(),
                );
                let jpeg = self
                    .encoder
                    .to_jpeg(&raw, SENSOR_JPEG_QUALITY)
                    .map_err(|err| CaptureError::Device(format!("pattern encode: {}", err)))?;
                buf.clear();
                buf.extend_from_slice(&jpeg);
                Ok(())
            }
            _ => {
                fill_pattern(format, width, height, sequence, noise, buf);
                Ok(())
            }
        }
    }
}

impl FrameSource for SyntheticSource {
    fn acquire(&self) -> Result<Frame, CaptureError> {
        let mut buf = self.pool.checkout(self.config.acquire_timeout)?;
        let rendered = self
            .next_slot()
            .and_then(|sequence| self.render(sequence, &mut buf));
        if let Err(err) = rendered {
            self.pool.checkin(buf);
            return Err(err);
        }
        Ok(Frame::new(
            self.config.format,
            self.config.width,
            self.config.height,
            buf,
            Timestamp::now(),
        ))
    }

    fn release(&self, frame: Frame) {
        self.pool.checkin(frame.into_data());
    }
}

// ----------------------------------------------------------------------------
// Pattern generation
// ----------------------------------------------------------------------------

/// Vertical colour bars scrolling one column per frame.
fn bar_color(x: u32, width: u32, sequence: u64) -> [u8; 3] {
    const BARS: [[u8; 3]; 8] = [
        [255, 255, 255],
        [255, 255, 0],
        [0, 255, 255],
        [0, 255, 0],
        [255, 0, 255],
        [255, 0, 0],
        [0, 0, 255],
        [0, 0, 0],
    ];
    let width = u64::from(width.max(1));
    let column = (u64::from(x) + sequence) % width;
    BARS[(column * BARS.len() as u64 / width) as usize]
}

fn fill_pattern(
    format: PixelFormat,
    width: u32,
    height: u32,
    sequence: u64,
    noise: u8,
    buf: &mut Vec<u8>,
) {
    let mut rng = rand::thread_rng();
    let mut jitter = |value: u8| -> u8 {
        if noise == 0 {
            value
        } else {
            let delta = rng.gen_range(-i16::from(noise)..=i16::from(noise));
            (i16::from(value) + delta).clamp(0, 255) as u8
        }
    };

    buf.clear();
    match format {
        PixelFormat::Rgb888 | PixelFormat::Jpeg => {
            buf.reserve(width as usize * height as usize * 3);
            for _y in 0..height {
                for x in 0..width {
                    let [r, g, b] = bar_color(x, width, sequence);
                    buf.extend_from_slice(&[jitter(r), jitter(g), jitter(b)]);
                }
            }
        }
        PixelFormat::Rgb565 => {
            buf.reserve(width as usize * height as usize * 2);
            for _y in 0..height {
                for x in 0..width {
                    let [r, g, b] = bar_color(x, width, sequence);
                    let packed = (u16::from(jitter(r) >> 3) << 11)
                        | (u16::from(jitter(g) >> 2) << 5)
                        | u16::from(jitter(b) >> 3);
                    buf.extend_from_slice(&packed.to_be_bytes());
                }
            }
        }
        PixelFormat::Grayscale => {
            buf.reserve(width as usize * height as usize);
            for _y in 0..height {
                for x in 0..width {
                    buf.push(jitter(luma(bar_color(x, width, sequence))));
                }
            }
        }
        PixelFormat::Yuv422 => {
            buf.reserve(width as usize * height as usize * 2);
            for _y in 0..height {
                for x in (0..width).step_by(2) {
                    let left = bar_color(x, width, sequence);
                    let right = bar_color(x + 1, width, sequence);
                    let (u, v) = chroma(left);
                    buf.extend_from_slice(&[jitter(luma(left)), u, jitter(luma(right)), v]);
                }
            }
        }
    }
}

fn luma([r, g, b]: [u8; 3]) -> u8 {
    let y = 0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b);
    y.round().clamp(0.0, 255.0) as u8
}

fn chroma([r, g, b]: [u8; 3]) -> (u8, u8) {
    let (r, g, b) = (f32::from(r), f32::from(g), f32::from(b));
    let u = -0.169 * r - 0.331 * g + 0.5 * b + 128.0;
    let v = 0.5 * r - 0.419 * g - 0.081 * b + 128.0;
    (
        u.round().clamp(0.0, 255.0) as u8,
        v.round().clamp(0.0, 255.0) as u8,
    )
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
