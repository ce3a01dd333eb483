//! Scripted collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use camera_httpd::encode::ChunkSink;
use camera_httpd::{
    CaptureError, EncodeError, Encoder, Frame, FrameSource, PixelFormat, Timestamp, Transport,
    TransportError,
};

/// First data byte that makes `FakeEncoder` fail on that frame.
pub const POISON: u8 = 0xEE;

pub fn jpeg_frame(len: usize, secs: i64) -> Frame {
    let mut data = vec![0xAB; len];
    if len >= 4 {
        data[..2].copy_from_slice(&[0xFF, 0xD8]);
        data[len - 2..].copy_from_slice(&[0xFF, 0xD9]);
    }
    Frame::new(PixelFormat::Jpeg, 8, 8, data, Timestamp::new(secs, 0))
}

pub fn raw_frame(secs: i64) -> Frame {
    Frame::new(
        PixelFormat::Rgb888,
        4,
        2,
        vec![0x10; 4 * 2 * 3],
        Timestamp::new(secs, 34),
    )
}

pub fn poisoned_frame(secs: i64) -> Frame {
    let mut data = vec![0x10; 4 * 2 * 3];
    data[0] = POISON;
    Frame::new(PixelFormat::Rgb888, 4, 2, data, Timestamp::new(secs, 0))
}

// ----------------------------------------------------------------------------
// ScriptedSource
// ----------------------------------------------------------------------------

/// Hands out a fixed list of frames, then fails every acquire.
#[derive(Default)]
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<Frame, CaptureError>>>,
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
    pub failed: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(frames: impl IntoIterator<Item = Frame>) -> Self {
        let source = Self::default();
        for frame in frames {
            source.push(Ok(frame));
        }
        source
    }

    pub fn push(&self, item: Result<Frame, CaptureError>) {
        self.script.lock().unwrap().push_back(item);
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl FrameSource for ScriptedSource {
    fn acquire(&self) -> Result<Frame, CaptureError> {
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(CaptureError::Closed));
        match &next {
            Ok(_) => self.acquired.fetch_add(1, Ordering::SeqCst),
            Err(_) => self.failed.fetch_add(1, Ordering::SeqCst),
        };
        next
    }

    fn release(&self, _frame: Frame) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

// ----------------------------------------------------------------------------
// FakeEncoder
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EncoderMode {
    Working,
    Failing,
    /// Streaming encodes emit one chunk, then fail.
    FailAfterFirstChunk,
}

/// Returns canned output and counts every call and buffer.
pub struct FakeEncoder {
    pub output: Vec<u8>,
    pub mode: EncoderMode,
    pub jpeg_calls: AtomicUsize,
    pub stream_calls: AtomicUsize,
    pub bmp_calls: AtomicUsize,
    pub allocs: AtomicUsize,
    pub recycles: AtomicUsize,
}

pub const STREAM_CHUNK: usize = 16;

impl FakeEncoder {
    pub fn new(mode: EncoderMode) -> Self {
        let output: Vec<u8> = (0..100u8).collect();
        Self {
            output,
            mode,
            jpeg_calls: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
            bmp_calls: AtomicUsize::new(0),
            allocs: AtomicUsize::new(0),
            recycles: AtomicUsize::new(0),
        }
    }

    pub fn working() -> Self {
        Self::new(EncoderMode::Working)
    }

    pub fn failing() -> Self {
        Self::new(EncoderMode::Failing)
    }

    pub fn calls(&self) -> usize {
        self.jpeg_calls.load(Ordering::SeqCst)
            + self.stream_calls.load(Ordering::SeqCst)
            + self.bmp_calls.load(Ordering::SeqCst)
    }

    pub fn allocs(&self) -> usize {
        self.allocs.load(Ordering::SeqCst)
    }

    pub fn recycles(&self) -> usize {
        self.recycles.load(Ordering::SeqCst)
    }

    fn fails_on(&self, frame: &Frame) -> bool {
        self.mode == EncoderMode::Failing || frame.data().first() == Some(&POISON)
    }

    fn whole(&self, frame: &Frame) -> Result<Vec<u8>, EncodeError> {
        if self.fails_on(frame) {
            return Err(EncodeError::Codec("scripted failure".to_string()));
        }
        self.allocs.fetch_add(1, Ordering::SeqCst);
        Ok(self.output.clone())
    }
}

impl Encoder for FakeEncoder {
    fn to_jpeg(&self, frame: &Frame, _quality: u8) -> Result<Vec<u8>, EncodeError> {
        self.jpeg_calls.fetch_add(1, Ordering::SeqCst);
        self.whole(frame)
    }

    fn to_jpeg_streaming(
        &self,
        frame: &Frame,
        _quality: u8,
        sink: &mut ChunkSink<'_>,
    ) -> Result<usize, EncodeError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        if self.fails_on(frame) {
            return Err(EncodeError::Codec("scripted failure".to_string()));
        }
        let mut offset = 0;
        for chunk in self.output.chunks(STREAM_CHUNK) {
            if sink(offset, chunk) == 0 {
                return Err(EncodeError::Aborted);
            }
            offset += chunk.len();
            if self.mode == EncoderMode::FailAfterFirstChunk {
                return Err(EncodeError::Codec(
                    "scripted mid-stream failure".to_string(),
                ));
            }
        }
        Ok(offset)
    }

    fn to_bmp(&self, frame: &Frame) -> Result<Vec<u8>, EncodeError> {
        self.bmp_calls.fetch_add(1, Ordering::SeqCst);
        let mut bmp = self.whole(frame)?;
        bmp[..2].copy_from_slice(b"BM");
        Ok(bmp)
    }

    fn recycle(&self, _buf: Vec<u8>) {
        self.recycles.fetch_add(1, Ordering::SeqCst);
    }
}

// ----------------------------------------------------------------------------
// RecordingTransport
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    ResponseType(String),
    Header(String, String),
    Exact(Vec<u8>),
    Chunk(Vec<u8>),
    ChunkEnd,
    Error(u16),
}

/// Records every call; optionally fails the n-th body send (1-based).
#[derive(Default)]
pub struct RecordingTransport {
    pub events: Vec<Event>,
    pub fail_at: Option<usize>,
    sends: usize,
    committed: bool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_at(send: usize) -> Self {
        Self {
            fail_at: Some(send),
            ..Self::default()
        }
    }

    /// Status the client would have seen.
    pub fn status(&self) -> Option<u16> {
        for event in &self.events {
            match event {
                Event::Error(status) => return Some(*status),
                Event::Exact(_) | Event::Chunk(_) | Event::ChunkEnd => return Some(200),
                _ => {}
            }
        }
        None
    }

    pub fn content_type(&self) -> Option<&str> {
        self.events.iter().rev().find_map(|event| match event {
            Event::ResponseType(mime) => Some(mime.as_str()),
            _ => None,
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.events.iter().find_map(|event| match event {
            Event::Header(key, value) if key.eq_ignore_ascii_case(name) => Some(value.as_str()),
            _ => None,
        })
    }

    pub fn chunks(&self) -> Vec<&[u8]> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::Chunk(data) => Some(data.as_slice()),
                _ => None,
            })
            .collect()
    }

    /// Body bytes in send order.
    pub fn body(&self) -> Vec<u8> {
        let mut body = Vec::new();
        for event in &self.events {
            match event {
                Event::Exact(data) | Event::Chunk(data) => body.extend_from_slice(data),
                _ => {}
            }
        }
        body
    }

    pub fn ended(&self) -> bool {
        self.events.contains(&Event::ChunkEnd)
    }

    fn attempt(&mut self) -> Result<(), TransportError> {
        self.sends += 1;
        self.committed = true;
        if self.fail_at == Some(self.sends) {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "scripted send failure",
            )));
        }
        Ok(())
    }
}

impl Transport for RecordingTransport {
    fn set_response_type(&mut self, mime: &str) {
        self.events.push(Event::ResponseType(mime.to_string()));
    }

    fn set_header(&mut self, name: &str, value: &str) {
        self.events
            .push(Event::Header(name.to_string(), value.to_string()));
    }

    fn send_exact(&mut self, body: &[u8]) -> Result<(), TransportError> {
        if self.committed {
            return Err(TransportError::Committed);
        }
        self.attempt()?;
        self.events.push(Event::Exact(body.to_vec()));
        Ok(())
    }

    fn send_chunk(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.attempt()?;
        if !data.is_empty() {
            self.events.push(Event::Chunk(data.to_vec()));
        }
        Ok(())
    }

    fn send_chunk_end(&mut self) -> Result<(), TransportError> {
        self.attempt()?;
        self.events.push(Event::ChunkEnd);
        Ok(())
    }

    fn send_error(&mut self, status: u16) -> Result<(), TransportError> {
        if self.committed {
            return Err(TransportError::Committed);
        }
        self.committed = true;
        self.events.push(Event::Error(status));
        Ok(())
    }

    fn is_committed(&self) -> bool {
        self.committed
    }
}
