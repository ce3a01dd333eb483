//! Single-shot capture handlers: `/capture` (JPEG) and `/bmp`.

use std::time::{Duration, Instant};

use crate::context::ServerContext;
use crate::encode::JPEG_QUALITY;
use crate::error::{RequestError, TransportError};
use crate::frame::{Frame, FrameLease};
use crate::transport::Transport;

/// What a successful capture sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureReport {
    /// Image bytes delivered, excluding HTTP framing.
    pub bytes: usize,
    /// True when the sensor's own JPEG was sent without conversion.
    pub passthrough: bool,
    pub elapsed: Duration,
}

/// Capture one frame and send it as JPEG.
///
/// Sensor JPEG goes out as-is with a known length. Other formats are encoded
/// at `JPEG_QUALITY` straight into a chunked body, so the headers are already
/// committed by the time an encode error could surface; in that case the
/// body is cut short. The frame is released once encoding finished, before
/// the outcome is reported.
pub fn capture_jpeg<T: Transport + ?Sized>(
    ctx: &ServerContext,
    transport: &mut T,
) -> Result<CaptureReport, RequestError> {
    let started = Instant::now();
    let lease = match FrameLease::acquire(ctx.source.as_ref()) {
        Ok(lease) => lease,
        Err(err) => {
            log::error!("camera capture failed: {}", err);
            respond_server_error(transport);
            return Err(err.into());
        }
    };

    transport.set_response_type("image/jpeg");
    set_image_headers(transport, lease.frame(), "capture.jpg");

    let passthrough = lease.frame().format().is_wire_jpeg();
    let outcome = if passthrough {
        let frame = lease.frame();
        transport
            .send_exact(frame.data())
            .map(|()| frame.len())
            .map_err(RequestError::from)
    } else {
        stream_encoded_jpeg(ctx, lease.frame(), transport)
    };
    lease.release();

    let bytes = outcome?;
    let elapsed = started.elapsed();
    log::info!("JPG: {}B {}ms", bytes, elapsed.as_millis());
    Ok(CaptureReport {
        bytes,
        passthrough,
        elapsed,
    })
}

fn stream_encoded_jpeg<T: Transport + ?Sized>(
    ctx: &ServerContext,
    frame: &Frame,
    transport: &mut T,
) -> Result<usize, RequestError> {
    let mut send_failure: Option<TransportError> = None;
    let mut sink = |_: usize, data: &[u8]| match transport.send_chunk(data) {
        Ok(()) => data.len(),
        Err(err) => {
            send_failure = Some(err);
            0
        }
    };
    let encoded = ctx
        .encoder
        .to_jpeg_streaming(frame, JPEG_QUALITY, &mut sink);

    if let Some(err) = send_failure {
        log::warn!("JPEG chunk send failed: {}", err);
        return Err(err.into());
    }
    match encoded {
        Ok(bytes) => {
            transport.send_chunk_end()?;
            Ok(bytes)
        }
        Err(err) => {
            log::error!("JPEG compression failed: {}", err);
            if transport.is_committed() {
                // Terminate what was sent; the client still sees a short image.
                if let Err(end_err) = transport.send_chunk_end() {
                    log::debug!("could not terminate JPEG body: {}", end_err);
                }
            } else {
                respond_server_error(transport);
            }
            Err(err.into())
        }
    }
}

/// Capture one frame and send it as a Windows bitmap.
///
/// The frame goes back to the source as soon as the conversion returns.
/// The converted buffer is recycled after the send attempt either way.
pub fn capture_bmp<T: Transport + ?Sized>(
    ctx: &ServerContext,
    transport: &mut T,
) -> Result<CaptureReport, RequestError> {
    let started = Instant::now();
    let lease = match FrameLease::acquire(ctx.source.as_ref()) {
        Ok(lease) => lease,
        Err(err) => {
            log::error!("camera capture failed: {}", err);
            respond_server_error(transport);
            return Err(err.into());
        }
    };

    transport.set_response_type("image/x-windows-bmp");
    set_image_headers(transport, lease.frame(), "capture.bmp");

    let converted = ctx.encoder.to_bmp(lease.frame());
    lease.release();
    let bmp = match converted {
        Ok(bmp) => bmp,
        Err(err) => {
            log::error!("BMP conversion failed: {}", err);
            respond_server_error(transport);
            return Err(err.into());
        }
    };

    let sent = transport.send_exact(&bmp);
    let bytes = bmp.len();
    ctx.encoder.recycle(bmp);
    sent?;

    let elapsed = started.elapsed();
    log::info!("BMP: {}ms, {}B", elapsed.as_millis(), bytes);
    Ok(CaptureReport {
        bytes,
        passthrough: false,
        elapsed,
    })
}

fn set_image_headers<T: Transport + ?Sized>(transport: &mut T, frame: &Frame, filename: &str) {
    transport.set_header(
        "Content-Disposition",
        &format!("inline; filename={}", filename),
    );
    transport.set_header("Access-Control-Allow-Origin", "*");
    transport.set_header("X-Timestamp", &frame.timestamp().to_string());
}

pub(crate) fn respond_server_error<T: Transport + ?Sized>(transport: &mut T) {
    if let Err(err) = transport.send_error(500) {
        log::debug!("could not send 500 response: {}", err);
    }
}
