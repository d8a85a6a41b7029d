//! Client for DLMTP, the LMTP dialect spoken by the DSPAM classification
//! daemon.
//!
//! A [`DspamClient`] drives a single session: connect, negotiate with
//! `LHLO`, then submit envelopes with `MAIL FROM`, `RCPT TO` and `DATA`.
//!
//! ```no_run
//! use dlmtp_client::{ClientConfig, DspamClient};
//!
//! # async fn example() -> Result<(), dlmtp_client::ClientError> {
//! let config = ClientConfig::builder()
//!     .with_socket("unix:/var/run/dspam/dspam.sock")
//!     .with_ident("mx1.example.com")
//!     .with_password("secret");
//!
//! let mut client = DspamClient::new(config);
//! client.connect().await?;
//! client.lhlo().await?;
//!
//! let mode = client.dlmtp().then_some("--deliver=summary");
//! client.mail_from(None, mode).await?;
//! client.rcpt_to("user@example.com").await?;
//! for reply in client.data("Subject: Hello\r\n\r\nWorld\r\n").await? {
//!     println!("{reply}");
//! }
//! client.quit().await?;
//! # Ok(())
//! # }
//! ```

#[cfg(not(unix))]
compile_error!("Only unix platforms are currently supported");

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod response;
pub mod socket;
pub mod transport;

pub use tracing;

pub use client::{DspamClient, Handshake};
pub use config::{ClientConfig, ConfigError};
pub use error::{ClientError, ErrorKind, Result};
pub use response::{Response, ResponseLine};
pub use socket::SocketSpec;
pub use transport::LineTransport;
