//! Error types for the DLMTP client.

use std::{io, time::Duration};

use thiserror::Error;

/// Broad classification of a [`ClientError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The socket specification could not be understood. Nothing was attempted.
    Configuration,
    /// The socket specification was valid but the target could not be reached.
    Connection,
    /// The underlying stream failed, closed, or timed out.
    Transport,
    /// The daemon sent something that does not fit the protocol at this stage.
    Protocol,
    /// The daemon answered with a well-formed, non-success reply.
    Command,
    /// The caller asked for something the session cannot do. Nothing was sent.
    Usage,
}

/// Errors that can occur when talking to a DSPAM daemon.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The socket specification is malformed.
    #[error("Invalid socket specification '{spec}': {reason}")]
    InvalidSocketSpec { spec: String, reason: String },

    /// Connecting to a well-formed target failed.
    #[error("Unable to connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: io::Error,
    },

    /// IO error occurred during network operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Connection was closed by the daemon.
    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    /// A command was issued without a live connection.
    #[error("Not connected")]
    NotConnected,

    /// A read or write did not complete in time.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The daemon's reply did not have the expected shape.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// UTF-8 decoding error.
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// The daemon rejected a command.
    #[error("DLMTP error: {code} - {message}")]
    Command { code: u16, message: String },

    /// The arguments given to a command are not valid for this session.
    #[error("Invalid usage: {0}")]
    Usage(String),
}

impl ClientError {
    /// Returns the broad class of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidSocketSpec { .. } => ErrorKind::Configuration,
            Self::Connect { .. } => ErrorKind::Connection,
            Self::Io(_) | Self::ConnectionClosed | Self::NotConnected | Self::Timeout(_) => {
                ErrorKind::Transport
            }
            Self::Protocol(_) | Self::Utf8(_) => ErrorKind::Protocol,
            Self::Command { .. } => ErrorKind::Command,
            Self::Usage(_) => ErrorKind::Usage,
        }
    }

    /// Returns `true` if the daemon answered with a temporary failure (4xx).
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        matches!(self, Self::Command { code, .. } if *code >= 400 && *code < 500)
    }

    pub(crate) fn invalid_spec(spec: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSocketSpec {
            spec: spec.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn usage(reason: impl Into<String>) -> Self {
        Self::Usage(reason.into())
    }
}

/// Specialized `Result` type for DLMTP client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
