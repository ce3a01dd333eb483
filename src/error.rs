//! Error kinds for the acquire, encode and transmit steps.
//!
//! None of these are retried by the handlers. A capture or encode failure that
//! happens before any response byte was written becomes a 500; anything after
//! that truncates the body and the connection is abandoned.

use thiserror::Error;

use crate::frame::PixelFormat;

/// The sensor produced no frame.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("frame acquire timed out after {0} ms")]
    Timeout(u64),
    #[error("frame source closed")]
    Closed,
    #[error("capture device error: {0}")]
    Device(String),
}

/// Format conversion failed.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("malformed {format:?} frame: expected {expected} bytes, got {actual}")]
    Malformed {
        format: PixelFormat,
        expected: usize,
        actual: usize,
    },
    #[error("codec error: {0}")]
    Codec(String),
    /// The output sink refused more data.
    #[error("encode aborted by output sink")]
    Aborted,
}

impl From<image::ImageError> for EncodeError {
    fn from(err: image::ImageError) -> Self {
        EncodeError::Codec(err.to_string())
    }
}

/// Why a capture request or a stream session ended unsuccessfully.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("camera capture failed: {0}")]
    Capture(#[from] CaptureError),
    #[error("frame conversion failed: {0}")]
    Encode(#[from] EncodeError),
    #[error("send failed: {0}")]
    Transport(#[from] TransportError),
}

/// A send on the HTTP response failed.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    /// Headers are already on the wire; the status can no longer change.
    #[error("response already committed")]
    Committed,
    /// The response was already finished with a terminal send.
    #[error("response already finished")]
    Closed,
}
