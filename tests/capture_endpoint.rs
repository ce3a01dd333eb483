mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use camera_httpd::{
    capture_bmp, capture_jpeg, CaptureError, Encoder, HttpTransport, RequestError, ServerContext,
    SoftwareEncoder, JPEG_QUALITY,
};
use common::{
    jpeg_frame, raw_frame, EncoderMode, Event, FakeEncoder, RecordingTransport, ScriptedSource,
};

fn context(source: &Arc<ScriptedSource>, encoder: &Arc<FakeEncoder>) -> ServerContext {
    ServerContext::new(source.clone()).with_encoder(encoder.clone())
}

#[test]
fn raw_capture_streams_the_encoder_output() {
    let source = Arc::new(ScriptedSource::new([raw_frame(12)]));
    let encoder = Arc::new(FakeEncoder::working());
    let ctx = context(&source, &encoder);
    let mut transport = RecordingTransport::new();

    let report = capture_jpeg(&ctx, &mut transport).unwrap();

    assert_eq!(transport.status(), Some(200));
    assert_eq!(transport.content_type(), Some("image/jpeg"));
    assert_eq!(transport.body(), encoder.output);
    assert!(transport.ended());
    assert_eq!(report.bytes, encoder.output.len());
    assert!(!report.passthrough);
    assert_eq!(encoder.stream_calls.load(Ordering::SeqCst), 1);
    assert_eq!(source.released(), 1);
}

#[test]
fn capture_sets_download_and_timestamp_headers() {
    let source = Arc::new(ScriptedSource::new([raw_frame(12)]));
    let encoder = Arc::new(FakeEncoder::working());
    let ctx = context(&source, &encoder);
    let mut transport = RecordingTransport::new();

    capture_jpeg(&ctx, &mut transport).unwrap();

    assert_eq!(
        transport.header("Content-Disposition"),
        Some("inline; filename=capture.jpg")
    );
    assert_eq!(transport.header("Access-Control-Allow-Origin"), Some("*"));
    assert_eq!(transport.header("X-Timestamp"), Some("12.000034"));
}

#[test]
fn jpeg_capture_is_passed_through_byte_for_byte() {
    let frame = jpeg_frame(321, 4);
    let expected = frame.data().to_vec();
    let source = Arc::new(ScriptedSource::new([frame]));
    let encoder = Arc::new(FakeEncoder::working());
    let ctx = context(&source, &encoder);
    let mut transport = RecordingTransport::new();

    let report = capture_jpeg(&ctx, &mut transport).unwrap();

    assert!(report.passthrough);
    assert_eq!(transport.events.last(), Some(&Event::Exact(expected)));
    assert_eq!(encoder.calls(), 0);
    assert_eq!(source.released(), 1);
}

#[test]
fn capture_failure_is_a_server_error() {
    let source = Arc::new(ScriptedSource::default());
    source.push(Err(CaptureError::Timeout(5000)));
    let encoder = Arc::new(FakeEncoder::working());
    let ctx = context(&source, &encoder);
    let mut transport = RecordingTransport::new();

    let err = capture_jpeg(&ctx, &mut transport).unwrap_err();

    assert!(matches!(
        err,
        RequestError::Capture(CaptureError::Timeout(5000))
    ));
    assert_eq!(transport.status(), Some(500));
    assert_eq!(source.released(), 0);
}

#[test]
fn encode_failure_before_output_is_a_server_error() {
    let source = Arc::new(ScriptedSource::new([raw_frame(1)]));
    let encoder = Arc::new(FakeEncoder::failing());
    let ctx = context(&source, &encoder);
    let mut transport = RecordingTransport::new();

    assert!(capture_jpeg(&ctx, &mut transport).is_err());
    assert_eq!(transport.status(), Some(500));
    assert_eq!(source.released(), 1);
}

#[test]
fn encode_failure_after_output_terminates_the_body() {
    let source = Arc::new(ScriptedSource::new([raw_frame(1)]));
    let encoder = Arc::new(FakeEncoder::new(EncoderMode::FailAfterFirstChunk));
    let ctx = context(&source, &encoder);
    let mut transport = RecordingTransport::new();

    let err = capture_jpeg(&ctx, &mut transport).unwrap_err();

    assert!(matches!(err, RequestError::Encode(_)));
    assert_eq!(transport.status(), Some(200));
    assert_eq!(transport.chunks().len(), 1);
    assert!(transport.ended());
    assert_eq!(source.released(), 1);
}

#[test]
fn failed_terminator_still_reports_the_encode_error() {
    let source = Arc::new(ScriptedSource::new([raw_frame(1)]));
    let encoder = Arc::new(FakeEncoder::new(EncoderMode::FailAfterFirstChunk));
    let ctx = context(&source, &encoder);
    // Send 1 is the only chunk, send 2 the terminator.
    let mut transport = RecordingTransport::failing_at(2);

    let err = capture_jpeg(&ctx, &mut transport).unwrap_err();

    assert!(matches!(err, RequestError::Encode(_)));
    assert_eq!(transport.chunks().len(), 1);
    assert!(!transport.ended());
    assert_eq!(source.released(), 1);
}

#[test]
fn client_going_away_aborts_the_encode() {
    let source = Arc::new(ScriptedSource::new([raw_frame(1)]));
    let encoder = Arc::new(FakeEncoder::working());
    let ctx = context(&source, &encoder);
    let mut transport = RecordingTransport::failing_at(2);

    let err = capture_jpeg(&ctx, &mut transport).unwrap_err();

    assert!(matches!(err, RequestError::Transport(_)));
    assert_eq!(transport.chunks().len(), 1);
    assert!(!transport.ended());
    assert_eq!(source.released(), 1);
}

#[test]
fn bmp_failure_is_a_server_error_and_releases_once() {
    let source = Arc::new(ScriptedSource::new([raw_frame(1)]));
    let encoder = Arc::new(FakeEncoder::failing());
    let ctx = context(&source, &encoder);
    let mut transport = RecordingTransport::new();

    let err = capture_bmp(&ctx, &mut transport).unwrap_err();

    assert!(matches!(err, RequestError::Encode(_)));
    assert_eq!(transport.status(), Some(500));
    assert!(transport.body().is_empty());
    assert_eq!(source.acquired(), 1);
    assert_eq!(source.released(), 1);
    assert_eq!(encoder.allocs(), 0);
}

#[test]
fn bmp_capture_sends_and_recycles_the_bitmap() {
    let source = Arc::new(ScriptedSource::new([jpeg_frame(64, 9)]));
    let encoder = Arc::new(FakeEncoder::working());
    let ctx = context(&source, &encoder);
    let mut transport = RecordingTransport::new();

    let report = capture_bmp(&ctx, &mut transport).unwrap();

    assert_eq!(transport.content_type(), Some("image/x-windows-bmp"));
    assert_eq!(
        transport.header("Content-Disposition"),
        Some("inline; filename=capture.bmp")
    );
    let body = transport.body();
    assert!(body.starts_with(b"BM"));
    assert_eq!(report.bytes, body.len());
    assert_eq!(encoder.allocs(), 1);
    assert_eq!(encoder.recycles(), 1);
    assert_eq!(source.released(), 1);
}

#[test]
fn bmp_send_failure_still_recycles() {
    let source = Arc::new(ScriptedSource::new([raw_frame(1)]));
    let encoder = Arc::new(FakeEncoder::working());
    let ctx = context(&source, &encoder);
    let mut transport = RecordingTransport::failing_at(1);

    assert!(matches!(
        capture_bmp(&ctx, &mut transport),
        Err(RequestError::Transport(_))
    ));
    assert_eq!(encoder.recycles(), 1);
    assert_eq!(source.released(), 1);
}

#[test]
fn software_encoded_capture_over_http_is_a_valid_chunked_jpeg() {
    let source = Arc::new(ScriptedSource::new([raw_frame(3)]));
    let ctx = ServerContext::new(source.clone());
    let mut transport = HttpTransport::new(Vec::new());

    capture_jpeg(&ctx, &mut transport).unwrap();

    let wire = transport.into_inner();
    let split = wire
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("header block");
    let head = String::from_utf8_lossy(&wire[..split]);
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(head.contains("Content-Type: image/jpeg\r\n"));
    assert!(head.contains("Transfer-Encoding: chunked\r\n"));
    assert!(head.contains("X-Timestamp: 3.000034\r\n"));

    let body = decode_chunked(&wire[split + 4..]);
    let expected = SoftwareEncoder::new()
        .to_jpeg(&raw_frame(3), JPEG_QUALITY)
        .unwrap();
    assert_eq!(body, expected);
    assert_eq!(source.released(), 1);
}

fn decode_chunked(mut data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    loop {
        let line_end = data.windows(2).position(|w| w == b"\r\n").unwrap();
        let size_line = std::str::from_utf8(&data[..line_end]).unwrap();
        let size = usize::from_str_radix(size_line, 16).unwrap();
        data = &data[line_end + 2..];
        if size == 0 {
            assert_eq!(data, b"\r\n");
            return body;
        }
        body.extend_from_slice(&data[..size]);
        assert_eq!(&data[size..size + 2], b"\r\n");
        data = &data[size + 2..];
    }
}
