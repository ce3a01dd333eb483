use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::ImageEncoder as _;
use std::io::{self, BufWriter, Write};

use super::normalize::normalize;
use super::{ChunkSink, Encoder};
use crate::error::EncodeError;
use crate::frame::Frame;

/// Size of the pieces handed to a streaming sink.
const JPEG_CHUNK_BYTES: usize = 4096;

/// In-process encoder backed by the `image` crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct SoftwareEncoder;

impl SoftwareEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl Encoder for SoftwareEncoder {
    fn to_jpeg(&self, frame: &Frame, quality: u8) -> Result<Vec<u8>, EncodeError> {
        let src = normalize(frame)?;
        let mut out = Vec::with_capacity(src.pixels.len() / 8 + 1024);
        JpegEncoder::new_with_quality(&mut out, quality).write_image(
            &src.pixels,
            src.width,
            src.height,
            src.color,
        )?;
        Ok(out)
    }

    fn to_jpeg_streaming(
        &self,
        frame: &Frame,
        quality: u8,
        sink: &mut ChunkSink<'_>,
    ) -> Result<usize, EncodeError> {
        let src = normalize(frame)?;
        let mut writer = BufWriter::with_capacity(
            JPEG_CHUNK_BYTES,
            SinkWriter {
                sink,
                offset: 0,
                aborted: false,
            },
        );
        let encoded = JpegEncoder::new_with_quality(&mut writer, quality).write_image(
            &src.pixels,
            src.width,
            src.height,
            src.color,
        );
        if writer.get_ref().aborted {
            return Err(EncodeError::Aborted);
        }
        encoded?;
        let inner = writer.into_inner().map_err(|_| EncodeError::Aborted)?;
        Ok(inner.offset)
    }

    fn to_bmp(&self, frame: &Frame) -> Result<Vec<u8>, EncodeError> {
        let src = normalize(frame)?;
        let mut out = Vec::with_capacity(src.pixels.len() + 1078);
        BmpEncoder::new(&mut out).write_image(&src.pixels, src.width, src.height, src.color)?;
        Ok(out)
    }
}

/// Adapts a `ChunkSink` to `io::Write`.
///
/// After the sink refuses data every further write fails without reaching
/// it, including the flush `BufWriter` attempts on drop.
struct SinkWriter<'a, 's> {
    sink: &'a mut ChunkSink<'s>,
    offset: usize,
    aborted: bool,
}

impl Write for SinkWriter<'_, '_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.aborted {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink aborted"));
        }
        if buf.is_empty() {
            return Ok(0);
        }
        let written = (self.sink)(self.offset, buf);
        if written == 0 {
            self.aborted = true;
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink aborted"));
        }
        let written = written.min(buf.len());
        self.offset += written;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.aborted {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink aborted"));
        }
        Ok(())
    }
}
