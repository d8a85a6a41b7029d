//! DLMTP response parsing and representation.

use super::error::{ClientError, Result};

/// Represents a single line in a DLMTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseLine {
    /// The three digit status code (e.g., 220, 250, 451).
    pub code: u16,
    /// Whether this is the last line in a multi-line response.
    pub is_last: bool,
    /// The message text following the status code.
    pub message: String,
}

/// Represents a complete DLMTP response, which may be multi-line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// The status code shared by every line of the response.
    pub code: u16,
    /// All message lines in the response.
    pub lines: Vec<String>,
}

impl Response {
    /// Creates a new `Response`.
    #[must_use]
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// Returns the complete message as a single string with lines joined by newlines.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join("\n")
    }

    /// Returns `true` if this response indicates success (2xx code).
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code / 100 == 2
    }

    /// Returns `true` if the daemon is waiting for more input (3xx code).
    #[must_use]
    pub const fn is_intermediate(&self) -> bool {
        self.code / 100 == 3
    }

    /// Returns `true` if this response indicates a temporary error (4xx code).
    #[must_use]
    pub const fn is_temporary_error(&self) -> bool {
        self.code / 100 == 4
    }

    /// Returns `true` if this response indicates a permanent error (5xx code).
    #[must_use]
    pub const fn is_permanent_error(&self) -> bool {
        self.code / 100 == 5
    }

    /// Returns `true` if one of the lines is exactly `token`.
    #[must_use]
    pub fn has_line(&self, token: &str) -> bool {
        self.lines.iter().any(|line| line == token)
    }

    /// Turns a non-success response into a [`ClientError::Command`].
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Command` unless the code is 2xx.
    pub fn into_result(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(self.into_error())
        }
    }

    pub(crate) fn into_error(self) -> ClientError {
        ClientError::Command {
            code: self.code,
            message: self.message(),
        }
    }

    /// Parses a single response line.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Protocol` if the line doesn't match `<code>[ -]<text>`.
    pub fn parse_line(line: &str) -> Result<ResponseLine> {
        let bytes = line.as_bytes();
        if bytes.len() < 3 {
            return Err(ClientError::Protocol(format!(
                "Response line too short: '{line}'"
            )));
        }

        if !bytes[..3].iter().all(u8::is_ascii_digit) {
            return Err(ClientError::Protocol(format!(
                "Invalid status code in '{line}'"
            )));
        }

        let code = u16::from(bytes[0] - b'0') * 100
            + u16::from(bytes[1] - b'0') * 10
            + u16::from(bytes[2] - b'0');

        // A space marks the last line, a dash a continuation
        let is_last = match bytes.get(3) {
            None | Some(b' ') => true,
            Some(b'-') => false,
            Some(c) => {
                return Err(ClientError::Protocol(format!(
                    "Invalid separator character: '{}'",
                    char::from(*c)
                )));
            }
        };

        let message = line.get(4..).unwrap_or_default().to_string();

        Ok(ResponseLine {
            code,
            is_last,
            message,
        })
    }
}

impl From<ResponseLine> for Response {
    fn from(line: ResponseLine) -> Self {
        Self::new(line.code, vec![line.message])
    }
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let last = self.lines.len().saturating_sub(1);
        for (idx, line) in self.lines.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            let sep = if idx == last { ' ' } else { '-' };
            write!(f, "{}{sep}{line}", self.code)?;
        }
        Ok(())
    }
}
