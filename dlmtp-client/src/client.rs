//! A DLMTP session with a DSPAM daemon.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, instrument, warn};

use crate::{
    config::ClientConfig,
    error::{ClientError, ErrorKind, Result},
    logging::REDACTED,
    response::Response,
    socket::{self, Stream},
    transport::LineTransport,
};

/// Capability advertised in `LHLO` by daemons that accept process-mode
/// arguments on `MAIL FROM`.
pub const PROCESS_MODE_CAPABILITY: &str = "DSPAMPROCESSMODE";

/// Identity announced in `LHLO` when none is configured.
pub const DEFAULT_IDENT: &str = "localhost";

/// Where the session is in its `LHLO` exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Handshake {
    /// `LHLO` has not been sent yet.
    #[default]
    Unauthenticated,
    /// The daemon accepted `LHLO`.
    Negotiated {
        /// Whether `DSPAMPROCESSMODE` was advertised.
        dlmtp: bool,
    },
    /// The daemon's reply to `LHLO` was not a greeting.
    Failed,
}

/// A client for one session with a DSPAM daemon.
///
/// The session runs strictly in order: connect, `LHLO`, then any number of
/// transactions.
#[derive(Debug)]
pub struct DspamClient<S = Stream> {
    config: ClientConfig,
    transport: Option<LineTransport<S>>,
    handshake: Handshake,
    /// Recipients the daemon accepted in the current transaction
    accepted: usize,
}

impl DspamClient<Stream> {
    /// Creates an unconnected client.
    #[must_use]
    pub const fn new(config: ClientConfig) -> Self {
        Self {
            config,
            transport: None,
            handshake: Handshake::Unauthenticated,
            accepted: 0,
        }
    }

    /// Connects to the configured socket and reads the daemon's greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket specification is invalid, the daemon
    /// cannot be reached, or it does not greet with `220`.
    #[instrument(level = "debug", skip(self), fields(socket = %self.config.socket))]
    pub async fn connect(&mut self) -> Result<Response> {
        if self.is_connected() {
            return Err(ClientError::usage("Already connected"));
        }

        let transport = socket::connect(&self.config.socket, self.config.timeout()).await?;
        self.transport = Some(transport);

        match self.read_greeting().await {
            Ok(greeting) => Ok(greeting),
            Err(err) => {
                self.transport = None;
                Err(err)
            }
        }
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> DspamClient<S> {
    /// Creates a client over an already connected stream.
    ///
    /// The daemon's greeting is left unread, see [`Self::read_greeting`].
    pub fn with_stream(config: ClientConfig, stream: S) -> Self {
        let transport = LineTransport::new(stream).with_timeout(config.timeout());

        Self {
            config,
            transport: Some(transport),
            handshake: Handshake::Unauthenticated,
            accepted: 0,
        }
    }

    /// The configuration this session was created with.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns `true` while the session holds a live connection.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.transport
            .as_ref()
            .is_some_and(LineTransport::is_connected)
    }

    /// The state of the `LHLO` exchange.
    #[must_use]
    pub const fn handshake(&self) -> Handshake {
        self.handshake
    }

    /// Returns `true` if the daemon advertised `DSPAMPROCESSMODE`.
    #[must_use]
    pub const fn dlmtp(&self) -> bool {
        matches!(self.handshake, Handshake::Negotiated { dlmtp: true })
    }

    /// Reads the `220` greeting the daemon sends once a connection opens.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if the greeting has any other code.
    pub async fn read_greeting(&mut self) -> Result<Response> {
        let greeting = self.read_response().await?;

        if greeting.code != 220 {
            return Err(ClientError::Protocol(format!(
                "Unexpected greeting from daemon: {greeting}"
            )));
        }

        Ok(greeting)
    }

    /// Announces the client and records whether the daemon speaks DLMTP.
    ///
    /// # Errors
    ///
    /// Returns a usage error if `LHLO` was already attempted, and a protocol
    /// error if the daemon does not answer with a `250` capability list.
    #[instrument(level = "debug", skip(self))]
    pub async fn lhlo(&mut self) -> Result<Response> {
        if self.handshake != Handshake::Unauthenticated {
            return Err(ClientError::usage("LHLO has already been attempted"));
        }

        let ident = self.config.ident.as_deref().unwrap_or(DEFAULT_IDENT);
        let command = format!("LHLO {ident}");
        let transport = self.transport()?;
        transport.send(&command).await?;

        let first = match transport.peek_line().await {
            Ok(first) => first,
            Err(err) if err.kind() == ErrorKind::Protocol => {
                // Reading drops an undecodable line from the buffer
                let _ = transport.read_line().await;
                self.handshake = Handshake::Failed;
                return Err(err);
            }
            Err(err) => return Err(err),
        };
        if !Response::parse_line(&first).is_ok_and(|line| line.code == 250) {
            let consumed = transport.read_line().await;
            self.handshake = Handshake::Failed;
            consumed?;
            return Err(ClientError::Protocol(format!(
                "Unexpected response to LHLO: '{first}'"
            )));
        }

        let response = match self.read_response().await {
            Ok(response) => response,
            Err(err) => {
                self.handshake = Handshake::Failed;
                return Err(err);
            }
        };

        let dlmtp = response.has_line(PROCESS_MODE_CAPABILITY);
        self.handshake = Handshake::Negotiated { dlmtp };
        debug!(dlmtp, "LHLO negotiated");

        Ok(response)
    }

    /// Opens a transaction with `MAIL FROM`.
    ///
    /// The envelope sender is `sender` when given. Otherwise, if both an
    /// ident and a password are configured, it is `password@ident`, which
    /// DSPAM treats as trusted client credentials. Failing both it is the
    /// null sender `<>`.
    ///
    /// `process_mode` is passed as `DSPAMPROCESSMODE="..."` and can only be
    /// used on its own, after the daemon advertised support for it.
    ///
    /// Exactly one reply line is read. A password used as the sender is
    /// redacted in the wire trace.
    ///
    /// # Errors
    ///
    /// Returns a usage error for an invalid argument combination, without
    /// sending anything, or a command error if the daemon rejects it.
    #[instrument(level = "debug", skip(self))]
    pub async fn mail_from(
        &mut self,
        sender: Option<&str>,
        process_mode: Option<&str>,
    ) -> Result<Response> {
        if sender.is_some() && process_mode.is_some() {
            return Err(ClientError::usage(
                "A sender and process mode arguments cannot be combined",
            ));
        }

        if process_mode.is_some() && !self.dlmtp() {
            return Err(ClientError::usage(
                "Process mode arguments need a daemon that advertised DSPAMPROCESSMODE",
            ));
        }

        let (address, logged) = self.envelope_sender(sender);
        let parameter = process_mode
            .map(|args| format!(" DSPAMPROCESSMODE=\"{args}\""))
            .unwrap_or_default();

        let transport = self.transport()?;
        transport
            .send_redacted(
                &format!("MAIL FROM:<{address}>{parameter}"),
                &format!("MAIL FROM:<{logged}>{parameter}"),
            )
            .await?;
        let line = Response::parse_line(&transport.read_line().await?)?;

        let response = Response::from(line).into_result()?;
        self.accepted = 0;

        Ok(response)
    }

    /// Adds a recipient to the current transaction.
    ///
    /// # Errors
    ///
    /// Returns a command error if the daemon rejects the recipient.
    #[instrument(level = "debug", skip(self))]
    pub async fn rcpt_to(&mut self, recipient: &str) -> Result<Response> {
        let response = self
            .command(&format!("RCPT TO:<{recipient}>"))
            .await?
            .into_result()?;
        self.accepted += 1;

        Ok(response)
    }

    /// Sends the message and returns the daemon's reply for each accepted
    /// recipient, in the order they were accepted.
    ///
    /// Replies are returned whatever their code; each one reports the
    /// outcome for a single recipient.
    ///
    /// # Errors
    ///
    /// Returns a usage error if no recipient has been accepted, and a
    /// command error if the daemon refuses `DATA` itself.
    #[instrument(level = "debug", skip_all, fields(size = message.len()))]
    pub async fn data(&mut self, message: &str) -> Result<Vec<Response>> {
        if self.accepted == 0 {
            return Err(ClientError::usage("DATA needs at least one accepted recipient"));
        }

        let response = self.command("DATA").await?;
        if !response.is_intermediate() {
            return Err(response.into_error());
        }

        let transport = self.transport()?;
        for line in message.lines() {
            if line.starts_with('.') {
                transport.send(&format!(".{line}")).await?;
            } else {
                transport.send(line).await?;
            }
        }
        transport.send(".").await?;

        let expected = std::mem::take(&mut self.accepted);
        let mut replies = Vec::with_capacity(expected);
        for _ in 0..expected {
            let reply = self.read_response().await?;
            if !reply.is_success() {
                warn!(code = reply.code, "Delivery refused for a recipient");
            }
            replies.push(reply);
        }

        Ok(replies)
    }

    /// Aborts the current transaction.
    ///
    /// # Errors
    ///
    /// Returns a command error if the daemon rejects `RSET`.
    pub async fn rset(&mut self) -> Result<Response> {
        let response = self.command("RSET").await?.into_result()?;
        self.accepted = 0;

        Ok(response)
    }

    /// Ends the session and closes the connection.
    ///
    /// The connection is closed even if the daemon's reply is an error.
    ///
    /// # Errors
    ///
    /// Returns an error if `QUIT` could not be sent or answered.
    pub async fn quit(&mut self) -> Result<Response> {
        let response = self.command("QUIT").await;

        if let Some(mut transport) = self.transport.take() {
            if let Err(err) = transport.shutdown().await {
                debug!("Error closing connection: {err}");
            }
        }
        self.accepted = 0;

        response
    }

    /// Picks the envelope sender for `MAIL FROM`, along with the form of it
    /// that is safe to log.
    fn envelope_sender(&self, sender: Option<&str>) -> (String, String) {
        if let Some(sender) = sender {
            return (sender.to_string(), sender.to_string());
        }

        if let (Some(ident), Some(password)) = (&self.config.ident, &self.config.password) {
            return (format!("{password}@{ident}"), format!("{REDACTED}@{ident}"));
        }

        (String::new(), String::new())
    }

    /// Sends a command and reads its reply, whatever the code.
    async fn command(&mut self, command: &str) -> Result<Response> {
        self.transport()?.send(command).await?;
        self.read_response().await
    }

    /// Reads one complete, possibly multi-line, response.
    async fn read_response(&mut self) -> Result<Response> {
        let transport = self.transport()?;
        let mut lines = Vec::new();
        let mut code = None;

        loop {
            let line = Response::parse_line(&transport.read_line().await?)?;

            match code {
                Some(expected) if expected != line.code => {
                    return Err(ClientError::Protocol(format!(
                        "Status code mismatch in multi-line response: expected {expected}, got {}",
                        line.code
                    )));
                }
                Some(_) => {}
                None => code = Some(line.code),
            }

            lines.push(line.message);

            if line.is_last {
                return Ok(Response::new(line.code, lines));
            }
        }
    }

    fn transport(&mut self) -> Result<&mut LineTransport<S>> {
        self.transport
            .as_mut()
            .filter(|transport| transport.is_connected())
            .ok_or(ClientError::NotConnected)
    }
}
