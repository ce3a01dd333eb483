//! Blocking HTTP listener that routes requests to the capture and stream
//! handlers.
//!
//! One thread per accepted connection. Every response is sent with
//! `Connection: close`; keep-alive is not supported.

use anyhow::{anyhow, Result};
use std::io::Read;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::capture::{capture_bmp, capture_jpeg};
use crate::context::ServerContext;
use crate::stream::StreamSession;
use crate::transport::{HttpTransport, Transport};

const MAX_REQUEST_BYTES: usize = 8192;
const ACCEPT_POLL: Duration = Duration::from_millis(50);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    /// How long a client may take to send its request head.
    pub read_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            read_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug)]
pub struct ServerHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// Stop accepting connections. Requests already being served run to
    /// completion; a stream ends when its client disconnects.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("camera server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct CameraServer {
    cfg: ServerConfig,
    ctx: ServerContext,
}

impl CameraServer {
    pub fn new(cfg: ServerConfig, ctx: ServerContext) -> Self {
        Self { cfg, ctx }
    }

    pub fn spawn(self) -> Result<ServerHandle> {
        let listener = TcpListener::bind(self.cfg.addr)
            .map_err(|e| anyhow!("failed to bind {}: {}", self.cfg.addr, e))?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;
        log::info!("camera server listening on http://{}", addr);

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let join = std::thread::spawn(move || {
            if let Err(err) = run_server(listener, self.cfg, self.ctx, shutdown_thread) {
                log::error!("camera server stopped: {}", err);
            }
        });

        Ok(ServerHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_server(
    listener: TcpListener,
    cfg: ServerConfig,
    ctx: ServerContext,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                log::debug!("connection from {}", peer);
                let ctx = ctx.clone();
                let read_timeout = cfg.read_timeout;
                let spawned = std::thread::Builder::new()
                    .name(format!("http-{}", peer))
                    .spawn(move || {
                        if let Err(err) = handle_connection(stream, &ctx, read_timeout) {
                            log::warn!("request from {} failed: {}", peer, err);
                        }
                    });
                if let Err(err) = spawned {
                    log::error!("could not spawn connection thread: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL);
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(
    mut stream: TcpStream,
    ctx: &ServerContext,
    read_timeout: Duration,
) -> Result<()> {
    // Accepted sockets may inherit the listener's non-blocking mode.
    stream.set_nonblocking(false)?;
    let request = read_request(&mut stream, read_timeout);
    let mut transport = HttpTransport::new(stream);
    let request = match request {
        Ok(request) => request,
        Err(RequestHeadError::TooLarge) => {
            transport.send_error(413)?;
            return Err(anyhow!("request too large"));
        }
        Err(RequestHeadError::Malformed(reason)) => {
            transport.send_error(400)?;
            return Err(anyhow!("malformed request: {}", reason));
        }
        Err(RequestHeadError::Io(err)) => return Err(err.into()),
    };

    if request.method != "GET" {
        transport.send_error(405)?;
        return Ok(());
    }
    match request.path.as_str() {
        "/stream" => {
            let summary = StreamSession::new(ctx).run(&mut transport);
            log::info!(
                "stream closed after {} frames, {} bytes: {}",
                summary.frames,
                transport.bytes_sent(),
                summary.reason
            );
        }
        "/capture" => {
            capture_jpeg(ctx, &mut transport)?;
        }
        "/bmp" => {
            capture_bmp(ctx, &mut transport)?;
        }
        "/health" => {
            transport.set_response_type("application/json");
            transport.send_exact(br#"{"status":"ok"}"#)?;
        }
        _ => {
            transport.send_error(404)?;
        }
    }
    Ok(())
}

#[derive(Debug)]
enum RequestHeadError {
    TooLarge,
    Malformed(&'static str),
    Io(std::io::Error),
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
}

fn read_request(
    stream: &mut TcpStream,
    timeout: Duration,
) -> Result<HttpRequest, RequestHeadError> {
    stream
        .set_read_timeout(Some(timeout))
        .map_err(RequestHeadError::Io)?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    loop {
        let n = stream.read(&mut buf).map_err(RequestHeadError::Io)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(RequestHeadError::TooLarge);
        }
        if data.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    parse_request_line(&data)
}

fn parse_request_line(data: &[u8]) -> Result<HttpRequest, RequestHeadError> {
    let text = String::from_utf8_lossy(data);
    let request_line = text
        .split("\r\n")
        .next()
        .filter(|line| !line.is_empty())
        .ok_or(RequestHeadError::Malformed("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts
        .next()
        .ok_or(RequestHeadError::Malformed("missing method"))?;
    let raw_path = parts
        .next()
        .ok_or(RequestHeadError::Malformed("missing path"))?;
    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
    })
}
