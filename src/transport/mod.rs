//! # Transport Layer
//!
//! Opens the duplex byte stream to the device and frames it into lines.
//!
//! ## Endpoints
//! - `serial:/dev/ttyACM0` (or a bare `/dev/...` path): tty in raw mode at the
//!   configured baud rate (unix only)
//! - `tcp:host:port`: a serial-over-TCP bridge or a device emulator
//! - `unix:/path/to/socket`: local emulator over a Unix domain socket
//!
//! Every endpoint yields the same [`LineTransport`], so the bridge loop never
//! knows which link it runs on.

#[cfg(unix)]
pub mod serial;

use crate::config::TransportConfig;
use crate::core::line_codec::LineCodec;
use crate::error::{constants, BridgeError, Result};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{info, instrument};

/// Where the device is attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Serial(PathBuf),
    Tcp(String),
    Unix(PathBuf),
}

impl FromStr for Endpoint {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let endpoint = if let Some(path) = s.strip_prefix("serial:") {
            Endpoint::Serial(PathBuf::from(path))
        } else if let Some(addr) = s.strip_prefix("tcp:") {
            Endpoint::Tcp(addr.to_string())
        } else if let Some(path) = s.strip_prefix("unix:") {
            Endpoint::Unix(PathBuf::from(path))
        } else if s.starts_with("/dev/") {
            Endpoint::Serial(PathBuf::from(s))
        } else {
            return Err(BridgeError::ConfigError(format!(
                "{}: '{s}' (expected serial:, tcp: or unix:)",
                constants::ERR_UNKNOWN_ENDPOINT
            )));
        };

        let empty = match &endpoint {
            Endpoint::Serial(path) | Endpoint::Unix(path) => path.as_os_str().is_empty(),
            Endpoint::Tcp(addr) => addr.is_empty(),
        };
        if empty {
            return Err(BridgeError::ConfigError(format!(
                "endpoint '{s}' has no target"
            )));
        }
        Ok(endpoint)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Serial(path) => write!(f, "serial:{}", path.display()),
            Endpoint::Tcp(addr) => write!(f, "tcp:{addr}"),
            Endpoint::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// Any duplex byte stream the bridge can run over
pub trait LinkStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> LinkStream for T {}

/// Line-framed device link
pub type LineTransport = Framed<Box<dyn LinkStream>, LineCodec>;

/// Open the configured endpoint and wrap it in a [`LineCodec`].
#[instrument(skip(config), fields(endpoint = %config.endpoint))]
pub async fn connect(config: &TransportConfig) -> Result<LineTransport> {
    let endpoint: Endpoint = config.endpoint.parse()?;
    let stream = open(&endpoint, config.baud_rate).await?;
    info!(endpoint = %endpoint, "Device link open");
    Ok(Framed::new(
        stream,
        LineCodec::with_max_length(config.max_line_length),
    ))
}

async fn open(endpoint: &Endpoint, baud_rate: u32) -> Result<Box<dyn LinkStream>> {
    match endpoint {
        Endpoint::Tcp(addr) => {
            let stream = TcpStream::connect(addr.as_str()).await.map_err(|e| {
                BridgeError::TransportError(format!("failed to connect to {addr}: {e}"))
            })?;
            stream.set_nodelay(true)?;
            Ok(Box::new(stream))
        }
        #[cfg(unix)]
        Endpoint::Unix(path) => {
            let stream = tokio::net::UnixStream::connect(path).await.map_err(|e| {
                BridgeError::TransportError(format!(
                    "failed to connect to {}: {e}",
                    path.display()
                ))
            })?;
            Ok(Box::new(stream))
        }
        #[cfg(unix)]
        Endpoint::Serial(path) => Ok(Box::new(serial::open(path, baud_rate)?)),
        #[cfg(not(unix))]
        other => {
            let _ = baud_rate;
            Err(BridgeError::TransportError(format!(
                "{other} is not supported on this platform"
            )))
        }
    }
}
