//! Client configuration.
//!
//! Configuration is normally read from a RON file:
//!
//! ```ron
//! (
//!     socket: "unix:/var/run/dspam/dspam.sock",
//!     ident: Some("mx1.example.com"),
//!     password: Some("secret"),
//!     timeout_secs: 30,
//! )
//! ```

use std::{
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{logging::REDACTED, socket::DEFAULT_SOCKET};

/// Environment variable naming a configuration file.
pub const CONFIG_ENV: &str = "DLMTP_CONFIG";

/// Places searched for a configuration file when [`CONFIG_ENV`] is unset.
pub const DEFAULT_CONFIG_PATHS: [&str; 2] = ["./dlmtp.config.ron", "/etc/dlmtp/dlmtp.config.ron"];

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config from {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },

    #[error("DLMTP_CONFIG points to non-existent file: {0}")]
    NotFound(PathBuf),
}

/// Settings for a single DLMTP session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Socket specification of the daemon, e.g. `unix:/var/run/dspam.sock`.
    #[serde(default = "defaults::socket")]
    pub socket: String,

    /// Identity announced in `LHLO`.
    #[serde(default)]
    pub ident: Option<String>,

    /// Password DSPAM expects alongside `ident` for trusted DLMTP clients.
    #[serde(default)]
    pub password: Option<String>,

    /// Limit on each read, write and connect, in seconds. `0` disables it.
    ///
    /// Default: 10 seconds
    #[serde(default = "defaults::timeout_secs")]
    pub timeout_secs: u64,
}

mod defaults {
    pub fn socket() -> String {
        super::DEFAULT_SOCKET.to_string()
    }

    pub const fn timeout_secs() -> u64 {
        10
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            socket: defaults::socket(),
            ident: None,
            password: None,
            timeout_secs: defaults::timeout_secs(),
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("socket", &self.socket)
            .field("ident", &self.ident)
            .field("password", &self.password.as_ref().map(|_| REDACTED))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ClientConfig {
    /// Create a configuration with every field at its default.
    #[must_use]
    pub fn builder() -> Self {
        Self::default()
    }

    /// Set the daemon's socket specification
    #[must_use]
    pub fn with_socket(mut self, socket: impl Into<String>) -> Self {
        self.socket = socket.into();
        self
    }

    /// Set the identity announced in `LHLO`
    #[must_use]
    pub fn with_ident(mut self, ident: impl Into<String>) -> Self {
        self.ident = Some(ident.into());
        self
    }

    /// Set the password paired with the identity
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the per-operation timeout, `None` for no limit
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout_secs = timeout.map_or(0, |t| t.as_secs().max(1));
        self
    }

    /// The per-operation timeout, if any.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        if self.timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.timeout_secs))
        }
    }

    /// Reads a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid RON.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        ron::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads the configuration file found by [`find_config_file`], or the
    /// defaults if there is none.
    ///
    /// # Errors
    ///
    /// Returns an error if a file was found but could not be loaded.
    pub fn load() -> Result<Self, ConfigError> {
        match find_config_file()? {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }
}

/// Finds the configuration file using the following precedence:
/// 1. `DLMTP_CONFIG` environment variable
/// 2. ./dlmtp.config.ron (current working directory)
/// 3. /etc/dlmtp/dlmtp.config.ron (system-wide config)
///
/// # Errors
///
/// Returns `ConfigError::NotFound` if `DLMTP_CONFIG` names a missing file.
pub fn find_config_file() -> Result<Option<PathBuf>, ConfigError> {
    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(Some(path));
        }
        return Err(ConfigError::NotFound(path));
    }

    Ok(DEFAULT_CONFIG_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|path| path.exists()))
}
