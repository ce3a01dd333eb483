//! Frame conversion to the formats served over HTTP.
//!
//! The `Encoder` trait is the seam between the handlers and whatever does the
//! pixel work. `SoftwareEncoder` is the in-process implementation built on the
//! `image` crate.
//!
//! `Payload` captures the two ownership shapes of bytes ready for the wire:
//! the frame's own buffer (passthrough) or a buffer produced by conversion.
//! Both are handed back through the single `Payload::release`.

mod codec;
mod normalize;

pub use codec::SoftwareEncoder;

use crate::error::EncodeError;
use crate::frame::{Frame, FrameLease, FrameSource};

/// JPEG quality used for every conversion the handlers perform.
pub const JPEG_QUALITY: u8 = 80;

/// Incremental output callback for `Encoder::to_jpeg_streaming`.
///
/// Called with the byte offset of `data` within the encoded image and the
/// data itself. Returns the number of bytes accepted; zero aborts the encode.
pub type ChunkSink<'s> = dyn FnMut(usize, &[u8]) -> usize + 's;

pub trait Encoder: Send + Sync {
    /// Encode the whole frame as JPEG into a new buffer.
    fn to_jpeg(&self, frame: &Frame, quality: u8) -> Result<Vec<u8>, EncodeError>;

    /// Encode as JPEG, pushing output to `sink` as it is produced.
    ///
    /// Returns the total number of bytes emitted. When `sink` returns zero the
    /// encoder stops without calling it again and returns
    /// `EncodeError::Aborted`.
    fn to_jpeg_streaming(
        &self,
        frame: &Frame,
        quality: u8,
        sink: &mut ChunkSink<'_>,
    ) -> Result<usize, EncodeError>;

    /// Encode the whole frame as a Windows bitmap.
    fn to_bmp(&self, frame: &Frame) -> Result<Vec<u8>, EncodeError>;

    /// Free a buffer previously returned by `to_jpeg` or `to_bmp`.
    fn recycle(&self, buf: Vec<u8>) {
        drop(buf);
    }
}

impl<E: Encoder + ?Sized> Encoder for std::sync::Arc<E> {
    fn to_jpeg(&self, frame: &Frame, quality: u8) -> Result<Vec<u8>, EncodeError> {
        (**self).to_jpeg(frame, quality)
    }

    fn to_jpeg_streaming(
        &self,
        frame: &Frame,
        quality: u8,
        sink: &mut ChunkSink<'_>,
    ) -> Result<usize, EncodeError> {
        (**self).to_jpeg_streaming(frame, quality, sink)
    }

    fn to_bmp(&self, frame: &Frame) -> Result<Vec<u8>, EncodeError> {
        (**self).to_bmp(frame)
    }

    fn recycle(&self, buf: Vec<u8>) {
        (**self).recycle(buf)
    }
}

// ----------------------------------------------------------------------------
// Payload
// ----------------------------------------------------------------------------

/// JPEG bytes ready for transmission.
pub enum Payload<'a, S: FrameSource + ?Sized> {
    /// The sensor already produced JPEG; these are the frame's own bytes.
    Borrowed(FrameLease<'a, S>),
    /// A buffer produced by conversion. The source frame is already released.
    Owned(Vec<u8>),
}

impl<'a, S: FrameSource + ?Sized> Payload<'a, S> {
    /// Turn a freshly acquired frame into a wire payload.
    ///
    /// JPEG frames pass through untouched. Anything else is converted and the
    /// frame is released as soon as the encoder returns, whatever the outcome.
    pub fn from_lease<E: Encoder + ?Sized>(
        lease: FrameLease<'a, S>,
        encoder: &E,
        quality: u8,
    ) -> Result<Self, EncodeError> {
        if lease.frame().format().is_wire_jpeg() {
            return Ok(Payload::Borrowed(lease));
        }
        let converted = encoder.to_jpeg(lease.frame(), quality);
        lease.release();
        converted.map(Payload::Owned)
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            Payload::Borrowed(lease) => lease.frame().data(),
            Payload::Owned(buf) => buf,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }

    pub fn is_borrowed(&self) -> bool {
        matches!(self, Payload::Borrowed(_))
    }

    /// The one release action for either shape.
    pub fn release<E: Encoder + ?Sized>(self, encoder: &E) {
        match self {
            Payload::Borrowed(lease) => lease.release(),
            Payload::Owned(buf) => encoder.recycle(buf),
        }
    }
}
