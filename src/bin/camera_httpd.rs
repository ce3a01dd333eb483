//! camera_httpd - serves camera frames over HTTP
//!
//! Routes:
//! - `/stream`  MJPEG multipart stream
//! - `/capture` single JPEG
//! - `/bmp`     single Windows bitmap
//! - `/health`  liveness probe

use anyhow::{anyhow, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::mpsc;

use camera_httpd::config::CameraConfig;
use camera_httpd::ingest::open_source;
use camera_httpd::server::{CameraServer, ServerConfig};
use camera_httpd::ServerContext;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON or TOML config file.
    #[arg(long, env = "CAMERA_HTTPD_CONFIG")]
    config: Option<PathBuf>,
    /// Listen address, overriding the config file and CAMERA_HTTPD_ADDR.
    #[arg(long)]
    addr: Option<SocketAddr>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = CameraConfig::load_from(args.config.as_deref())?;
    if let Some(addr) = args.addr {
        config.addr = addr;
    }

    let source = open_source(&config.source)?;
    let ctx = ServerContext::new(source)
        .with_filter_window(config.stream.filter_window)
        .with_framerate_header(config.stream.framerate_header);

    let server_config = ServerConfig {
        addr: config.addr,
        ..ServerConfig::default()
    };
    let handle = CameraServer::new(server_config, ctx).spawn()?;
    log::info!(
        "camera_httpd running: {:?} source, {}x{} {:?}, stream at http://{}/stream",
        config.source.kind,
        config.source.width,
        config.source.height,
        config.source.format,
        handle.addr
    );

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    log::info!("camera_httpd waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping server...");
    handle.stop()?;

    Ok(())
}
