//! Sensor frames and the acquire/release contract.
//!
//! - `Frame`: one capture. Not `Clone`; ownership moves from the source to the
//!   holder and back on release.
//! - `FrameSource`: the blocking acquire/release interface every capture
//!   backend implements.
//! - `FrameLease`: holder of an acquired frame that hands it back to its source
//!   exactly once, either through `release()` or on drop.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::CaptureError;

// ----------------------------------------------------------------------------
// PixelFormat
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Already compressed by the sensor; sent on the wire as-is.
    Jpeg,
    Rgb888,
    Rgb565,
    /// Packed YUYV 4:2:2.
    Yuv422,
    Grayscale,
}

impl PixelFormat {
    /// True when frames in this format need no conversion before transmission.
    pub fn is_wire_jpeg(self) -> bool {
        matches!(self, PixelFormat::Jpeg)
    }
}

impl FromStr for PixelFormat {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> anyhow::Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" | "mjpg" => Ok(PixelFormat::Jpeg),
            "rgb888" | "rgb24" => Ok(PixelFormat::Rgb888),
            "rgb565" => Ok(PixelFormat::Rgb565),
            "yuv422" | "yuyv" => Ok(PixelFormat::Yuv422),
            "grayscale" | "gray" => Ok(PixelFormat::Grayscale),
            other => Err(anyhow::anyhow!("unknown pixel format '{}'", other)),
        }
    }
}

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// Capture time with microsecond resolution.
///
/// Renders as `<secs>.<micros>` with the microseconds zero-padded to six
/// digits, which is the format of every `X-Timestamp` header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp {
    pub secs: i64,
    pub micros: u32,
}

impl Timestamp {
    pub fn new(secs: i64, micros: u32) -> Self {
        Self {
            secs: secs + i64::from(micros / 1_000_000),
            micros: micros % 1_000_000,
        }
    }

    pub fn now() -> Self {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(elapsed) => Self::new(elapsed.as_secs() as i64, elapsed.subsec_micros()),
            Err(_) => Self::default(),
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.secs, self.micros)
    }
}

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// One sensor capture.
///
/// Deliberately not `Clone`: a frame is held by exactly one component between
/// `FrameSource::acquire` and `FrameSource::release`.
pub struct Frame {
    format: PixelFormat,
    width: u32,
    height: u32,
    data: Vec<u8>,
    timestamp: Timestamp,
}

impl Frame {
    pub fn new(
        format: PixelFormat,
        width: u32,
        height: u32,
        data: Vec<u8>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            format,
            width,
            height,
            data,
            timestamp,
        }
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Give the buffer back, e.g. to return it to a pool.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("len", &self.data.len())
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// FrameSource
// ----------------------------------------------------------------------------

/// Producer of sensor frames, shared by every connection thread.
///
/// The underlying buffer pool is finite. Each successful `acquire` must be
/// matched by exactly one `release`; holders must not keep a frame after
/// releasing it. Prefer `FrameLease`, which enforces both.
pub trait FrameSource: Send + Sync {
    /// Block until a frame is available or capture fails.
    fn acquire(&self) -> Result<Frame, CaptureError>;

    /// Hand a frame back to the pool.
    fn release(&self, frame: Frame);
}

impl<S: FrameSource + ?Sized> FrameSource for std::sync::Arc<S> {
    fn acquire(&self) -> Result<Frame, CaptureError> {
        (**self).acquire()
    }

    fn release(&self, frame: Frame) {
        (**self).release(frame)
    }
}

// ----------------------------------------------------------------------------
// FrameLease
// ----------------------------------------------------------------------------

/// An acquired frame bound to the source it came from.
///
/// `release` consumes the lease, so a second release does not type-check.
/// A lease dropped on an error path or during unwinding releases the frame
/// itself.
pub struct FrameLease<'a, S: FrameSource + ?Sized> {
    source: &'a S,
    frame: Option<Frame>,
}

impl<'a, S: FrameSource + ?Sized> FrameLease<'a, S> {
    /// Acquire the next frame from `source`.
    pub fn acquire(source: &'a S) -> Result<Self, CaptureError> {
        let frame = source.acquire()?;
        Ok(Self {
            source,
            frame: Some(frame),
        })
    }

    pub fn frame(&self) -> &Frame {
        // Only `release` and `drop` take the frame, and both consume the lease.
        self.frame
            .as_ref()
            .expect("frame lease holds its frame until released")
    }

    /// Return the frame to its source.
    pub fn release(mut self) {
        if let Some(frame) = self.frame.take() {
            self.source.release(frame);
        }
    }
}

impl<S: FrameSource + ?Sized> Drop for FrameLease<'_, S> {
    fn drop(&mut self) {
        if let Some(frame) = self.frame.take() {
            self.source.release(frame);
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
