//! Mock DSPAM daemon for exercising the client over a real unix socket
//!
//! The daemon answers every command from a fixed script and records what it
//! received, so tests can assert on the exact conversation.

use std::{fmt::Write, path::PathBuf, sync::Arc};

use tempfile::TempDir;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{UnixListener, UnixStream},
    sync::RwLock,
    task::JoinHandle,
};

/// Command received by the mock daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DlmtpCommand {
    Lhlo(String),
    /// Everything after `MAIL FROM:`
    MailFrom(String),
    /// Everything after `RCPT TO:`
    RcptTo(String),
    Data,
    /// Message lines received after DATA, terminator excluded
    MessageContent(Vec<String>),
    Rset,
    Quit,
    Other(String),
}

/// A single reply line
#[derive(Debug, Clone)]
pub struct Reply {
    pub code: u16,
    pub message: String,
}

impl Reply {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        format!("{} {}\r\n", self.code, self.message).into_bytes()
    }
}

#[derive(Clone)]
struct MockDaemonConfig {
    greeting: Reply,
    capabilities: Vec<String>,
    mail_from: Reply,
    rcpt_to: Reply,
    data: Reply,
    data_end: Reply,
    quit: Reply,
}

impl Default for MockDaemonConfig {
    fn default() -> Self {
        Self {
            greeting: Reply::new(220, "DSPAM LMTP 3.10.2 Ready"),
            capabilities: vec![
                "localhost.localdomain".to_string(),
                "PIPELINING".to_string(),
                "ENHANCEDSTATUSCODES".to_string(),
                "DSPAMPROCESSMODE".to_string(),
                "8BITMIME".to_string(),
                "SIZE".to_string(),
            ],
            mail_from: Reply::new(250, "2.1.0 OK"),
            rcpt_to: Reply::new(250, "2.1.5 OK"),
            data: Reply::new(354, "Enter mail, end with \".\" on a line by itself"),
            data_end: Reply::new(250, "2.6.0 Message accepted for delivery: INNOCENT"),
            quit: Reply::new(221, "2.0.0 Bye"),
        }
    }
}

impl MockDaemonConfig {
    fn lhlo_bytes(&self) -> Vec<u8> {
        let mut response = String::new();
        let last = self.capabilities.len().saturating_sub(1);

        for (i, cap) in self.capabilities.iter().enumerate() {
            let sep = if i == last { ' ' } else { '-' };
            let _ = write!(&mut response, "250{sep}{cap}\r\n");
        }

        response.into_bytes()
    }
}

/// Mock daemon listening on a unix socket in a temporary directory
pub struct MockDaemon {
    _dir: TempDir,
    path: PathBuf,
    commands: Arc<RwLock<Vec<DlmtpCommand>>>,
    handle: JoinHandle<()>,
}

impl MockDaemon {
    #[must_use]
    pub fn builder() -> MockDaemonBuilder {
        MockDaemonBuilder::default()
    }

    /// Socket specification clients should connect to
    #[must_use]
    pub fn socket(&self) -> String {
        format!("unix:{}", self.path.display())
    }

    /// All commands received so far
    pub async fn commands(&self) -> Vec<DlmtpCommand> {
        self.commands.read().await.clone()
    }

    async fn handle_client(
        stream: UnixStream,
        config: Arc<MockDaemonConfig>,
        commands: Arc<RwLock<Vec<DlmtpCommand>>>,
    ) -> std::io::Result<()> {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        let mut accepted = 0;

        writer.write_all(&config.greeting.to_bytes()).await?;

        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                return Ok(());
            }

            let cmd_line = line.trim_end_matches(['\r', '\n']);
            let (verb, args) = cmd_line.split_once(' ').unwrap_or((cmd_line, ""));

            let (response, command) = match verb.to_uppercase().as_str() {
                "LHLO" => (config.lhlo_bytes(), DlmtpCommand::Lhlo(args.to_string())),
                "MAIL" => {
                    accepted = 0;
                    let from = args.strip_prefix("FROM:").unwrap_or(args).to_string();
                    (config.mail_from.to_bytes(), DlmtpCommand::MailFrom(from))
                }
                "RCPT" => {
                    if config.rcpt_to.code / 100 == 2 {
                        accepted += 1;
                    }
                    let to = args.strip_prefix("TO:").unwrap_or(args).to_string();
                    (config.rcpt_to.to_bytes(), DlmtpCommand::RcptTo(to))
                }
                "DATA" => (config.data.to_bytes(), DlmtpCommand::Data),
                "RSET" => {
                    accepted = 0;
                    (Reply::new(250, "2.0.0 OK").to_bytes(), DlmtpCommand::Rset)
                }
                "QUIT" => {
                    commands.write().await.push(DlmtpCommand::Quit);
                    writer.write_all(&config.quit.to_bytes()).await?;
                    return Ok(());
                }
                _ => (
                    Reply::new(500, "5.5.1 Unknown command").to_bytes(),
                    DlmtpCommand::Other(cmd_line.to_string()),
                ),
            };

            commands.write().await.push(command.clone());
            writer.write_all(&response).await?;

            if command == DlmtpCommand::Data && config.data.code == 354 {
                let mut content = Vec::new();
                loop {
                    line.clear();
                    if reader.read_line(&mut line).await? == 0 {
                        return Ok(());
                    }
                    let data_line = line.trim_end_matches(['\r', '\n']);
                    if data_line == "." {
                        break;
                    }
                    content.push(data_line.to_string());
                }
                commands
                    .write()
                    .await
                    .push(DlmtpCommand::MessageContent(content));

                for _ in 0..std::mem::take(&mut accepted) {
                    writer.write_all(&config.data_end.to_bytes()).await?;
                }
            }
        }
    }
}

impl Drop for MockDaemon {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Builder for [`MockDaemon`]
#[derive(Default)]
pub struct MockDaemonBuilder {
    config: MockDaemonConfig,
}

impl MockDaemonBuilder {
    #[must_use]
    pub fn with_greeting(mut self, code: u16, message: &str) -> Self {
        self.config.greeting = Reply::new(code, message);
        self
    }

    #[must_use]
    pub fn with_capabilities(mut self, capabilities: &[&str]) -> Self {
        self.config.capabilities = capabilities.iter().map(ToString::to_string).collect();
        self
    }

    #[must_use]
    pub fn with_mail_from_response(mut self, code: u16, message: &str) -> Self {
        self.config.mail_from = Reply::new(code, message);
        self
    }

    #[must_use]
    pub fn with_rcpt_to_response(mut self, code: u16, message: &str) -> Self {
        self.config.rcpt_to = Reply::new(code, message);
        self
    }

    #[must_use]
    pub fn with_data_end_response(mut self, code: u16, message: &str) -> Self {
        self.config.data_end = Reply::new(code, message);
        self
    }

    /// Binds the socket and starts accepting connections
    pub fn build(self) -> std::io::Result<MockDaemon> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("dspam.sock");
        let listener = UnixListener::bind(&path)?;

        let config = Arc::new(self.config);
        let commands = Arc::new(RwLock::new(Vec::new()));

        let handle = {
            let commands = Arc::clone(&commands);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let config = Arc::clone(&config);
                    let commands = Arc::clone(&commands);
                    tokio::spawn(async move {
                        if let Err(err) = MockDaemon::handle_client(stream, config, commands).await {
                            eprintln!("Mock daemon connection failed: {err}");
                        }
                    });
                }
            })
        };

        Ok(MockDaemon {
            _dir: dir,
            path,
            commands,
            handle,
        })
    }
}
