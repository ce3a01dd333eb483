use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::context::{DEFAULT_FILTER_WINDOW, DEFAULT_FRAMERATE_HEADER};
use crate::frame::PixelFormat;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DEVICE: &str = "/dev/video0";
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_FPS: u32 = 25;
const DEFAULT_FB_COUNT: usize = 2;
const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 5000;
const MAX_FB_COUNT: usize = 16;
const MAX_FILTER_WINDOW: usize = 1024;

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    addr: Option<String>,
    stream: Option<StreamConfigFile>,
    source: Option<SourceConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamConfigFile {
    framerate_header: Option<u32>,
    filter_window: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    kind: Option<SourceKind>,
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    format: Option<PixelFormat>,
    fps: Option<u32>,
    fb_count: Option<usize>,
    acquire_timeout_ms: Option<u64>,
}

/// Where frames come from.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Generated test pattern.
    Synthetic,
    /// Local V4L2 device (feature `ingest-v4l2`).
    V4l2,
}

impl std::str::FromStr for SourceKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "synthetic" | "stub" => Ok(SourceKind::Synthetic),
            "v4l2" => Ok(SourceKind::V4l2),
            other => Err(anyhow!("unknown source kind {:?}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CameraConfig {
    pub addr: SocketAddr,
    pub stream: StreamSettings,
    pub source: SourceSettings,
}

#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Advisory `X-Framerate` value sent with every stream.
    pub framerate_header: u32,
    /// Window of the per-session frame interval filter; 0 disables averaging.
    pub filter_window: usize,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub kind: SourceKind,
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub fps: u32,
    pub fb_count: usize,
    pub acquire_timeout: Duration,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self::with_addr(CameraConfigFile::default(), default_addr())
    }
}

impl CameraConfig {
    /// Load from the file named by `CAMERA_HTTPD_CONFIG` (if set), then apply
    /// environment overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CAMERA_HTTPD_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Same as `load` with an explicit config path in place of
    /// `CAMERA_HTTPD_CONFIG`.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(mut file: CameraConfigFile) -> Result<Self> {
        let addr = match file.addr.take() {
            Some(addr) => parse_addr(&addr)?,
            None => default_addr(),
        };
        Ok(Self::with_addr(file, addr))
    }

    fn with_addr(file: CameraConfigFile, addr: SocketAddr) -> Self {
        let stream = file.stream.unwrap_or_default();
        let source = file.source.unwrap_or_default();
        Self {
            addr,
            stream: StreamSettings {
                framerate_header: stream.framerate_header.unwrap_or(DEFAULT_FRAMERATE_HEADER),
                filter_window: stream.filter_window.unwrap_or(DEFAULT_FILTER_WINDOW),
            },
            source: SourceSettings {
                kind: source.kind.unwrap_or(SourceKind::Synthetic),
                device: source.device.unwrap_or_else(|| DEFAULT_DEVICE.to_string()),
                width: source.width.unwrap_or(DEFAULT_WIDTH),
                height: source.height.unwrap_or(DEFAULT_HEIGHT),
                format: source.format.unwrap_or(PixelFormat::Jpeg),
                fps: source.fps.unwrap_or(DEFAULT_FPS),
                fb_count: source.fb_count.unwrap_or(DEFAULT_FB_COUNT),
                acquire_timeout: Duration::from_millis(
                    source
                        .acquire_timeout_ms
                        .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_MS),
                ),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(addr) = env_value("CAMERA_HTTPD_ADDR") {
            self.addr = parse_addr(&addr)?;
        }
        if let Some(kind) = env_value("CAMERA_HTTPD_SOURCE") {
            self.source.kind = kind
                .parse()
                .map_err(|err| anyhow!("CAMERA_HTTPD_SOURCE: {}", err))?;
        }
        if let Some(device) = env_value("CAMERA_HTTPD_DEVICE") {
            self.source.device = device;
        }
        if let Some(format) = env_value("CAMERA_HTTPD_FORMAT") {
            self.source.format = format
                .parse()
                .map_err(|err| anyhow!("CAMERA_HTTPD_FORMAT: {}", err))?;
        }
        if let Some(count) = env_value("CAMERA_HTTPD_FB_COUNT") {
            self.source.fb_count = count
                .parse()
                .map_err(|_| anyhow!("CAMERA_HTTPD_FB_COUNT must be a positive integer"))?;
        }
        if let Some(window) = env_value("CAMERA_HTTPD_FILTER_WINDOW") {
            self.stream.filter_window = window
                .parse()
                .map_err(|_| anyhow!("CAMERA_HTTPD_FILTER_WINDOW must be an integer"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let source = &self.source;
        if source.width == 0 || source.height == 0 {
            return Err(anyhow!(
                "source resolution must be non-zero, got {}x{}",
                source.width,
                source.height
            ));
        }
        if source.format == PixelFormat::Yuv422 && source.width % 2 != 0 {
            return Err(anyhow!(
                "yuv422 frames need an even width, got {}",
                source.width
            ));
        }
        if source.fb_count == 0 || source.fb_count > MAX_FB_COUNT {
            return Err(anyhow!(
                "fb_count must be between 1 and {}, got {}",
                MAX_FB_COUNT,
                source.fb_count
            ));
        }
        if source.acquire_timeout.is_zero() {
            return Err(anyhow!("acquire_timeout_ms must be greater than zero"));
        }
        if source.kind == SourceKind::V4l2 && source.device.trim().is_empty() {
            return Err(anyhow!("v4l2 source needs a device path"));
        }
        if self.stream.filter_window > MAX_FILTER_WINDOW {
            return Err(anyhow!(
                "filter_window must be at most {}, got {}",
                MAX_FILTER_WINDOW,
                self.stream.filter_window
            ));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<CameraConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn default_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT))
}

fn parse_addr(value: &str) -> Result<SocketAddr> {
    value
        .trim()
        .parse()
        .map_err(|e| anyhow!("invalid listen address {:?}: {}", value, e))
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
