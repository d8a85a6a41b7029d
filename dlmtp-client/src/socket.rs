//! Socket specifications and connection establishment.
//!
//! DSPAM names its listening socket as `unix:<path>` for a local socket or
//! `inet:<port>@<host>` for TCP.

use std::{
    fmt::{self, Display},
    io,
    path::PathBuf,
    pin::Pin,
    str::FromStr,
    task::{Context, Poll},
    time::Duration,
};

use tokio::{
    io::{AsyncRead, AsyncWrite, ReadBuf},
    net::{TcpStream, UnixStream},
};
use tracing::debug;

use crate::{
    error::{ClientError, Result},
    transport::LineTransport,
};

/// Socket used when none is configured.
pub const DEFAULT_SOCKET: &str = "inet:24@localhost";

/// Where the daemon is listening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketSpec {
    /// A local socket at the given path.
    Unix(PathBuf),
    /// A TCP listener.
    Inet { host: String, port: u16 },
}

impl FromStr for SocketSpec {
    type Err = ClientError;

    fn from_str(spec: &str) -> Result<Self> {
        let Some((scheme, address)) = spec.split_once(':') else {
            return Err(ClientError::invalid_spec(spec, "missing scheme separator ':'"));
        };

        match scheme {
            "unix" => {
                if address.is_empty() {
                    return Err(ClientError::invalid_spec(spec, "empty socket path"));
                }
                Ok(Self::Unix(PathBuf::from(address)))
            }
            "inet" => {
                let Some((port, host)) = address.split_once('@') else {
                    return Err(ClientError::invalid_spec(
                        spec,
                        "expected an address of the form <port>@<host>",
                    ));
                };

                let port = port
                    .parse::<u16>()
                    .map_err(|e| ClientError::invalid_spec(spec, format!("invalid port: {e}")))?;

                if host.is_empty() {
                    return Err(ClientError::invalid_spec(spec, "empty host"));
                }

                Ok(Self::Inet {
                    host: host.to_string(),
                    port,
                })
            }
            other => Err(ClientError::invalid_spec(
                spec,
                format!("unknown scheme '{other}'"),
            )),
        }
    }
}

impl Display for SocketSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
            Self::Inet { host, port } => write!(f, "inet:{port}@{host}"),
        }
    }
}

impl SocketSpec {
    /// Opens a connection to the daemon.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Connect` if the target cannot be reached, or
    /// `ClientError::Timeout` if `timeout` elapses first.
    pub async fn connect(&self, timeout: Option<Duration>) -> Result<LineTransport<Stream>> {
        debug!("Connecting to {self}");

        let attempt = async {
            match self {
                Self::Unix(path) => UnixStream::connect(path).await.map(Stream::Unix),
                Self::Inet { host, port } => TcpStream::connect((host.as_str(), *port))
                    .await
                    .map(Stream::Tcp),
            }
        };

        let result = match timeout {
            Some(limit) => tokio::time::timeout(limit, attempt)
                .await
                .map_err(|_| ClientError::Timeout(limit))?,
            None => attempt.await,
        };

        let stream = result.map_err(|source| ClientError::Connect {
            target: self.to_string(),
            source,
        })?;

        Ok(LineTransport::new(stream).with_timeout(timeout))
    }
}

/// Parses `spec` and connects to it.
///
/// # Errors
///
/// Returns `ClientError::InvalidSocketSpec` before any network activity if
/// `spec` is malformed, otherwise anything [`SocketSpec::connect`] returns.
pub async fn connect(spec: &str, timeout: Option<Duration>) -> Result<LineTransport<Stream>> {
    spec.parse::<SocketSpec>()?.connect(timeout).await
}

/// A connected daemon socket of either family.
#[derive(Debug)]
pub enum Stream {
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl AsyncRead for Stream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Unix(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tcp(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}
