//! V4L2 frame source.
//!
//! Negotiates a capture format on a local device node (e.g. /dev/video0) and
//! copies each dequeued driver buffer into a pooled frame buffer. MJPG devices
//! deliver `Jpeg` frames that the handlers pass through untouched; YUYV, RGB3
//! and GREY map to the matching raw formats.

use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;

use super::pool::BufferPool;
use crate::error::CaptureError;
use crate::frame::{Frame, FrameSource, PixelFormat, Timestamp};

/// Number of buffers queued with the driver.
const DRIVER_BUFFERS: u32 = 4;

/// Configuration for a V4L2 source.
#[derive(Clone, Debug)]
pub struct V4l2Config {
    /// Device path (e.g., "/dev/video0")
    pub device: String,
    pub width: u32,
    pub height: u32,
    /// Requested pixel format; the driver may pick another.
    pub format: PixelFormat,
    pub fps: u32,
    /// Frames that may be held by handlers at once.
    pub fb_count: usize,
    pub acquire_timeout: Duration,
}

impl Default for V4l2Config {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            width: 640,
            height: 480,
            format: PixelFormat::Jpeg,
            fps: 25,
            fb_count: 2,
            acquire_timeout: Duration::from_millis(5000),
        }
    }
}

pub struct V4l2Source {
    device: String,
    pool: BufferPool,
    state: Mutex<DeviceV4l2State>,
    acquire_timeout: Duration,
    format: PixelFormat,
    width: u32,
    height: u32,
}

#[self_referencing]
struct DeviceV4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Source {
    /// Open the device, negotiate the format and start streaming.
    pub fn open(config: V4l2Config) -> Result<Self> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&config.device)
            .with_context(|| format!("open v4l2 device {}", config.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = config.width;
        format.height = config.height;
        format.fourcc = fourcc_for(config.format);

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Source: failed to set format on {}: {}",
                    config.device,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        let pixel_format = pixel_format_for(format.fourcc).ok_or_else(|| {
            anyhow!(
                "v4l2 device {} delivers unsupported fourcc {}",
                config.device,
                format.fourcc
            )
        })?;

        if config.fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(config.fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "V4l2Source: failed to set fps on {}: {}",
                    config.device,
                    err
                );
            }
        }

        let state = DeviceV4l2StateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, DRIVER_BUFFERS)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        log::info!(
            "V4l2Source: streaming {} ({}x{} {:?})",
            config.device,
            format.width,
            format.height,
            pixel_format
        );
        Ok(Self {
            device: config.device,
            pool: BufferPool::new(config.fb_count),
            state: Mutex::new(state),
            acquire_timeout: config.acquire_timeout,
            format: pixel_format,
            width: format.width,
            height: format.height,
        })
    }

    /// Format actually negotiated with the driver.
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn dequeue_into(&self, buf: &mut Vec<u8>) -> Result<Timestamp, CaptureError> {
        use v4l::io::traits::CaptureStream;

        let mut state = self
            .state
            .lock()
            .map_err(|_| CaptureError::Device("v4l2 state lock poisoned".to_string()))?;
        let (data, meta) = state
            .with_mut(|fields| fields.stream.next())
            .map_err(|err| CaptureError::Device(format!("{}: {}", self.device, err)))?;
        let used = data.len().min(meta.bytesused as usize);
        buf.clear();
        buf.extend_from_slice(&data[..used]);
        Ok(Timestamp::new(
            meta.timestamp.sec as i64,
            meta.timestamp.usec as u32,
        ))
    }
}

impl FrameSource for V4l2Source {
    fn acquire(&self) -> Result<Frame, CaptureError> {
        let mut buf = self.pool.checkout(self.acquire_timeout)?;
        match self.dequeue_into(&mut buf) {
            Ok(timestamp) => Ok(Frame::new(
                self.format,
                self.width,
                self.height,
                buf,
                timestamp,
            )),
            Err(err) => {
                self.pool.checkin(buf);
                Err(err)
            }
        }
    }

    fn release(&self, frame: Frame) {
        self.pool.checkin(frame.into_data());
    }
}

fn fourcc_for(format: PixelFormat) -> v4l::FourCC {
    match format {
        PixelFormat::Jpeg => v4l::FourCC::new(b"MJPG"),
        PixelFormat::Rgb888 => v4l::FourCC::new(b"RGB3"),
        PixelFormat::Rgb565 => v4l::FourCC::new(b"RGBR"),
        PixelFormat::Yuv422 => v4l::FourCC::new(b"YUYV"),
        PixelFormat::Grayscale => v4l::FourCC::new(b"GREY"),
    }
}

fn pixel_format_for(fourcc: v4l::FourCC) -> Option<PixelFormat> {
    match &fourcc.repr {
        b"MJPG" | b"JPEG" => Some(PixelFormat::Jpeg),
        b"RGB3" => Some(PixelFormat::Rgb888),
        b"RGBR" => Some(PixelFormat::Rgb565),
        b"YUYV" => Some(PixelFormat::Yuv422),
        b"GREY" => Some(PixelFormat::Grayscale),
        _ => None,
    }
}
