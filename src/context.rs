use std::sync::Arc;

use crate::encode::{Encoder, SoftwareEncoder};
use crate::frame::FrameSource;

/// Default number of frame intervals averaged in stream diagnostics.
pub const DEFAULT_FILTER_WINDOW: usize = 20;

/// Default advisory value of the `X-Framerate` stream header.
pub const DEFAULT_FRAMERATE_HEADER: u32 = 60;

/// Everything a request handler needs, created once at startup and shared by
/// every connection thread.
#[derive(Clone)]
pub struct ServerContext {
    pub source: Arc<dyn FrameSource>,
    pub encoder: Arc<dyn Encoder>,
    /// Window size of the per-session frame interval filter.
    pub filter_window: usize,
    pub framerate_header: u32,
}

impl ServerContext {
    pub fn new(source: Arc<dyn FrameSource>) -> Self {
        Self {
            source,
            encoder: Arc::new(SoftwareEncoder::new()),
            filter_window: DEFAULT_FILTER_WINDOW,
            framerate_header: DEFAULT_FRAMERATE_HEADER,
        }
    }

    pub fn with_encoder(mut self, encoder: Arc<dyn Encoder>) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn with_filter_window(mut self, filter_window: usize) -> Self {
        self.filter_window = filter_window;
        self
    }

    pub fn with_framerate_header(mut self, framerate_header: u32) -> Self {
        self.framerate_header = framerate_header;
        self
    }
}
