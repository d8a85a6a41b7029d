//! Line framing over a raw byte stream.
//!
//! Outgoing text is normalised so that it always ends in exactly one CRLF,
//! and incoming bytes are collected in a buffer until a full line is
//! available. Reading and peeking share the same line-locating path, so a
//! peeked line is always the one the next read returns.

use std::{borrow::Cow, time::Duration};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use tracing::trace;

use crate::{
    error::{ClientError, Result},
    wire,
};

/// Amount of spare capacity reserved before each read from the stream.
const BUFFER_SIZE: usize = 8192;

/// Longest line accepted from the daemon before giving up on it.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Ensures `text` ends with CRLF.
///
/// A trailing CRLF is left alone and a lone trailing LF becomes CRLF.
/// Anything else, including a trailing bare CR, gets CRLF appended.
#[must_use]
pub fn terminate(text: &str) -> Cow<'_, str> {
    if text.ends_with("\r\n") {
        Cow::Borrowed(text)
    } else if let Some(stripped) = text.strip_suffix('\n') {
        Cow::Owned(format!("{stripped}\r\n"))
    } else {
        Cow::Owned(format!("{text}\r\n"))
    }
}

/// Runs a stream operation, bounded by `timeout` if there is one.
async fn bounded<T>(
    timeout: Option<Duration>,
    operation: impl Future<Output = std::io::Result<T>>,
) -> Result<T> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, operation)
            .await
            .map_err(|_| ClientError::Timeout(limit))?
            .map_err(ClientError::from),
        None => Ok(operation.await?),
    }
}

/// A line-oriented view of a byte stream.
#[derive(Debug)]
pub struct LineTransport<S> {
    stream: Option<S>,
    buffer: Vec<u8>,
    /// Leading bytes of `buffer` already known not to contain a line feed
    scanned: usize,
    eof: bool,
    timeout: Option<Duration>,
}

impl<S> LineTransport<S> {
    /// Wraps an already connected stream.
    pub const fn new(stream: S) -> Self {
        Self {
            stream: Some(stream),
            buffer: Vec::new(),
            scanned: 0,
            eof: false,
            timeout: None,
        }
    }

    /// Bounds every individual read and write by `timeout`.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns `true` until the transport has been shut down.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Bytes received but not yet consumed as lines.
    #[must_use]
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> LineTransport<S> {
    /// Writes `text` as a single CRLF terminated line.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport is closed or the write fails.
    pub async fn send(&mut self, text: &str) -> Result<()> {
        self.send_redacted(text, text).await
    }

    /// Writes `text` like [`Self::send`], tracing `logged` in its place.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport is closed or the write fails.
    pub async fn send_redacted(&mut self, text: &str, logged: &str) -> Result<()> {
        let timeout = self.timeout;
        let stream = self.stream.as_mut().ok_or(ClientError::NotConnected)?;
        let line = terminate(text);

        wire!(send, "{}", logged.trim_end_matches(['\r', '\n']));

        bounded(timeout, async {
            stream.write_all(line.as_bytes()).await?;
            stream.flush().await
        })
        .await
    }

    /// Consumes and returns the next line, without its terminator.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionClosed` once the daemon has hung up and nothing is
    /// left to read, or a protocol error if the line is not valid UTF-8.
    pub async fn read_line(&mut self) -> Result<String> {
        let (end, consumed) = self.locate_line().await?;
        let line = std::str::from_utf8(&self.buffer[..end]).map(str::to_string);

        self.buffer.drain(..consumed);
        self.scanned = 0;

        let line = line?;
        wire!(recv, "{line}");

        Ok(line)
    }

    /// Returns the next line without consuming it.
    ///
    /// # Errors
    ///
    /// Fails in the same situations as [`Self::read_line`].
    pub async fn peek_line(&mut self) -> Result<String> {
        let (end, _) = self.locate_line().await?;
        Ok(std::str::from_utf8(&self.buffer[..end])?.to_string())
    }

    /// Shuts the stream down and discards anything still buffered.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream fails to shut down cleanly.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.buffer.clear();
        self.scanned = 0;

        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await?;
        }

        Ok(())
    }

    /// Finds the next line in the buffer, reading more from the stream until
    /// there is one.
    ///
    /// Returns the length of the line's content and the number of bytes it
    /// occupies including the terminator.
    async fn locate_line(&mut self) -> Result<(usize, usize)> {
        loop {
            if let Some(offset) = self.buffer[self.scanned..]
                .iter()
                .position(|&b| b == b'\n')
            {
                let newline = self.scanned + offset;
                let end = if newline > 0 && self.buffer[newline - 1] == b'\r' {
                    newline - 1
                } else {
                    newline
                };
                return Ok((end, newline + 1));
            }

            self.scanned = self.buffer.len();

            if self.eof {
                // Whatever is left over after the peer hung up is the final line
                return match self.buffer.as_slice() {
                    [] => Err(ClientError::ConnectionClosed),
                    [.., b'\r'] => Ok((self.buffer.len() - 1, self.buffer.len())),
                    _ => Ok((self.buffer.len(), self.buffer.len())),
                };
            }

            if self.buffer.len() > MAX_LINE_LENGTH {
                return Err(ClientError::Protocol(format!(
                    "Line exceeds {MAX_LINE_LENGTH} bytes"
                )));
            }

            let timeout = self.timeout;
            let stream = self.stream.as_mut().ok_or(ClientError::NotConnected)?;
            self.buffer.reserve(BUFFER_SIZE);

            if bounded(timeout, stream.read_buf(&mut self.buffer)).await? == 0 {
                trace!("Daemon closed the connection");
                self.eof = true;
            }
        }
    }
}
