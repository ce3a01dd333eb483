//! Camera HTTP media endpoint.
//!
//! Serves frames from a camera over plain HTTP/1.1:
//!
//! - `/stream`: endless MJPEG (`multipart/x-mixed-replace`) over a chunked body
//! - `/capture`: one JPEG, passed through when the sensor already produced JPEG
//! - `/bmp`: one Windows bitmap
//!
//! # Frame ownership
//!
//! Frames come from a fixed pool owned by the `FrameSource`. A handler holds
//! a frame through a `FrameLease`, which gives it back on `release` or when
//! dropped, so no exit path can starve the pool. Converted images are
//! `Payload::Owned` buffers handed back to the `Encoder`.
//!
//! # Module Structure
//!
//! - `frame`: frames, pixel formats, timestamps, the source trait and leases
//! - `encode`: JPEG/BMP conversion and the borrowed-or-owned `Payload`
//! - `transport`: the response abstraction and its HTTP/1.1 implementation
//! - `capture` / `stream`: the request handlers
//! - `filter`: moving-average frame interval diagnostics
//! - `ingest`: synthetic and V4L2 frame sources
//! - `server`: the listener and router
//! - `config`: file and environment configuration

pub mod capture;
pub mod config;
pub mod context;
pub mod encode;
pub mod error;
pub mod filter;
pub mod frame;
pub mod ingest;
pub mod server;
pub mod stream;
pub mod transport;

pub use capture::{capture_bmp, capture_jpeg, CaptureReport};
pub use context::ServerContext;
pub use encode::{ChunkSink, Encoder, Payload, SoftwareEncoder, JPEG_QUALITY};
pub use error::{CaptureError, EncodeError, RequestError, TransportError};
pub use filter::{FrameTiming, MovingAverageFilter};
pub use frame::{Frame, FrameLease, FrameSource, PixelFormat, Timestamp};
pub use stream::{part_header, StreamSession, StreamSummary, PART_BOUNDARY, STREAM_CONTENT_TYPE};
pub use transport::{HttpTransport, Transport};
