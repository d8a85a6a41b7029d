//! Command-line client for a DSPAM daemon
//!
//! Connects over DLMTP, announces itself and either reports the daemon's
//! capabilities or submits a message for classification and prints the
//! daemon's reply for each recipient.

#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

use std::{path::PathBuf, time::Duration};

use anyhow::Context;
use clap::{Parser, Subcommand};
use dlmtp_client::{ClientConfig, DspamClient, logging};
use tokio::io::AsyncReadExt;

/// Submit messages to a DSPAM daemon over DLMTP
#[derive(Parser, Debug)]
#[command(name = "dlmtp")]
#[command(about = "Talk to a DSPAM daemon over DLMTP", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (RON). Defaults to `DLMTP_CONFIG`, then
    /// ./dlmtp.config.ron, then /etc/dlmtp/dlmtp.config.ron
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Daemon socket, `unix:<path>` or `inet:<port>@<host>`
    #[arg(short, long)]
    socket: Option<String>,

    /// Identity announced in LHLO
    #[arg(short, long)]
    ident: Option<String>,

    /// Password paired with the identity
    #[arg(short, long, env = "DLMTP_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Per-operation timeout in seconds, 0 for none
    #[arg(short, long)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the capabilities the daemon advertises
    Capabilities,
    /// Submit a message and print the daemon's reply for each recipient
    Deliver {
        /// Recipient, may be repeated
        #[arg(short, long = "recipient", required = true)]
        recipients: Vec<String>,

        /// Envelope sender, defaults to the configured credentials
        #[arg(long, conflicts_with = "process_mode")]
        sender: Option<String>,

        /// Arguments passed to the daemon as DSPAMPROCESSMODE
        #[arg(long)]
        process_mode: Option<String>,

        /// Message file, read from stdin when omitted
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

impl Cli {
    /// Loads the configuration file and applies the command-line overrides
    fn client_config(&self) -> anyhow::Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::from_file(path)?,
            None => ClientConfig::load()?,
        };

        if let Some(socket) = &self.socket {
            config = config.with_socket(socket);
        }
        if let Some(ident) = &self.ident {
            config = config.with_ident(ident);
        }
        if let Some(password) = &self.password {
            config = config.with_password(password);
        }
        if let Some(secs) = self.timeout {
            config = config.with_timeout((secs > 0).then_some(Duration::from_secs(secs)));
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let cli = Cli::parse();
    let config = cli.client_config()?;
    tracing::debug!(?config, "Loaded configuration");

    let mut client = DspamClient::new(config);
    let greeting = client.connect().await?;
    tracing::info!("Connected: {}", greeting.message());

    let result = run(&mut client, cli.command).await;

    if client.is_connected()
        && let Err(err) = client.quit().await
    {
        tracing::warn!("Failed to end session cleanly: {err}");
    }

    result
}

async fn run(client: &mut DspamClient, command: Commands) -> anyhow::Result<()> {
    let capabilities = client.lhlo().await?;

    match command {
        Commands::Capabilities => {
            for line in &capabilities.lines {
                println!("{line}");
            }
            println!();
            println!(
                "DLMTP process mode: {}",
                if client.dlmtp() { "supported" } else { "not supported" }
            );
        }
        Commands::Deliver {
            recipients,
            sender,
            process_mode,
            file,
        } => {
            let message = match file {
                Some(path) => tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("Failed to read message from {}", path.display()))?,
                None => {
                    let mut message = String::new();
                    tokio::io::stdin()
                        .read_to_string(&mut message)
                        .await
                        .context("Failed to read message from stdin")?;
                    message
                }
            };

            client
                .mail_from(sender.as_deref(), process_mode.as_deref())
                .await?;
            for recipient in &recipients {
                client.rcpt_to(recipient).await?;
            }

            let replies = client.data(&message).await?;
            for (recipient, reply) in recipients.iter().zip(&replies) {
                println!("{recipient}: {reply}");
            }
        }
    }

    Ok(())
}
