//! MJPEG over HTTP: the `/stream` multipart loop.
//!
//! Every delivered frame is one complete part:
//!
//! ```text
//! \r\n--<BOUNDARY>\r\n
//! Content-Type: image/jpeg\r\nContent-Length: <N>\r\nX-Timestamp: <sec>.<usec6>\r\n\r\n
//! <N bytes of JPEG>
//! ```
//!
//! The loop has no frame limit, timeout or cancellation signal. It ends on the
//! first acquire, encode or send failure; a client going away shows up as a
//! send failure on the next part.

use std::time::Instant;

use crate::capture::respond_server_error;
use crate::context::ServerContext;
use crate::encode::{Payload, JPEG_QUALITY};
use crate::error::RequestError;
use crate::filter::{FrameTiming, MovingAverageFilter};
use crate::frame::{FrameLease, FrameSource, Timestamp};
use crate::transport::Transport;

/// Multipart boundary token shared by the content type and every delimiter.
pub const PART_BOUNDARY: &str = "123456789000000000000987654321";

pub const STREAM_CONTENT_TYPE: &str =
    "multipart/x-mixed-replace;boundary=123456789000000000000987654321";

const STREAM_BOUNDARY: &str = "\r\n--123456789000000000000987654321\r\n";

/// Per-part header block, terminated by the blank line.
pub fn part_header(len: usize, timestamp: Timestamp) -> String {
    format!(
        "Content-Type: image/jpeg\r\nContent-Length: {}\r\nX-Timestamp: {}\r\n\r\n",
        len, timestamp
    )
}

/// How a stream session ended.
#[derive(Debug)]
pub struct StreamSummary {
    /// Parts delivered completely.
    pub frames: u64,
    pub reason: RequestError,
}

/// One client's MJPEG stream.
pub struct StreamSession<'a> {
    ctx: &'a ServerContext,
    filter: MovingAverageFilter,
    last_frame: Instant,
    frames: u64,
}

impl<'a> StreamSession<'a> {
    /// Start a session; the first frame interval is measured from here.
    pub fn new(ctx: &'a ServerContext) -> Self {
        Self {
            ctx,
            filter: MovingAverageFilter::new(ctx.filter_window),
            last_frame: Instant::now(),
            frames: 0,
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Stage the stream headers and deliver frames until something fails.
    ///
    /// A failure before the first byte went out is answered with a 500.
    /// Later failures leave the body truncated; the caller drops the
    /// connection.
    pub fn run<T: Transport + ?Sized>(mut self, transport: &mut T) -> StreamSummary {
        transport.set_response_type(STREAM_CONTENT_TYPE);
        transport.set_header("Access-Control-Allow-Origin", "*");
        transport.set_header("X-Framerate", &self.ctx.framerate_header.to_string());

        loop {
            if let Err(reason) = self.step(transport) {
                if !transport.is_committed() {
                    respond_server_error(transport);
                }
                return StreamSummary {
                    frames: self.frames,
                    reason,
                };
            }
        }
    }

    /// Acquire, convert if needed, send one part and release.
    pub fn step<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
    ) -> Result<FrameTiming, RequestError> {
        let ctx = self.ctx;
        let source: &dyn FrameSource = ctx.source.as_ref();
        let encoder = ctx.encoder.as_ref();

        let lease = FrameLease::acquire(source).map_err(|err| {
            log::error!("camera capture failed: {}", err);
            err
        })?;
        let timestamp = lease.frame().timestamp();
        let payload = Payload::from_lease(lease, encoder, JPEG_QUALITY).map_err(|err| {
            log::error!("JPEG compression failed: {}", err);
            err
        })?;

        let sent = send_part(transport, &payload, timestamp);
        let bytes = payload.len();
        payload.release(encoder);
        if let Err(err) = sent {
            log::error!("send frame failed: {}", err);
            return Err(err.into());
        }

        let now = Instant::now();
        let interval_ms = now
            .duration_since(self.last_frame)
            .as_millis()
            .min(u128::from(u32::MAX)) as u32;
        self.last_frame = now;
        self.frames += 1;

        let timing = FrameTiming::observe(&mut self.filter, bytes, interval_ms);
        log::info!("{}", timing);
        Ok(timing)
    }
}

fn send_part<T: Transport + ?Sized, S: FrameSource + ?Sized>(
    transport: &mut T,
    payload: &Payload<'_, S>,
    timestamp: Timestamp,
) -> Result<(), crate::error::TransportError> {
    transport.send_chunk(STREAM_BOUNDARY.as_bytes())?;
    transport.send_chunk(part_header(payload.len(), timestamp).as_bytes())?;
    transport.send_chunk(payload.bytes())
}
