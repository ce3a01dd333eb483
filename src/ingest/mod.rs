//! Frame sources.
//!
//! - Synthetic test pattern (always available)
//! - USB/V4L2 devices (feature: ingest-v4l2)
//!
//! Every source hands out frames from a fixed pool of `fb_count` buffers.
//! A frame is owned by exactly one handler between `acquire` and `release`;
//! when the pool is empty, `acquire` waits up to the configured timeout.

mod pool;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use std::sync::Arc;

use anyhow::Result;

use crate::config::{SourceKind, SourceSettings};
use crate::frame::FrameSource;

pub use synthetic::{SyntheticConfig, SyntheticSource, SyntheticStats};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::{V4l2Config, V4l2Source};

/// Build the frame source described by `settings`.
pub fn open_source(settings: &SourceSettings) -> Result<Arc<dyn FrameSource>> {
    match settings.kind {
        SourceKind::Synthetic => Ok(Arc::new(SyntheticSource::new(SyntheticConfig {
            width: settings.width,
            height: settings.height,
            format: settings.format,
            fps: settings.fps,
            fb_count: settings.fb_count,
            acquire_timeout: settings.acquire_timeout,
            noise: 0,
        }))),
        SourceKind::V4l2 => open_v4l2(settings),
    }
}

#[cfg(feature = "ingest-v4l2")]
fn open_v4l2(settings: &SourceSettings) -> Result<Arc<dyn FrameSource>> {
    let source = V4l2Source::open(V4l2Config {
        device: settings.device.clone(),
        width: settings.width,
        height: settings.height,
        format: settings.format,
        fps: settings.fps,
        fb_count: settings.fb_count,
        acquire_timeout: settings.acquire_timeout,
    })?;
    Ok(Arc::new(source))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_v4l2(settings: &SourceSettings) -> Result<Arc<dyn FrameSource>> {
    Err(anyhow::anyhow!(
        "v4l2 source {} requires the ingest-v4l2 feature",
        settings.device
    ))
}
