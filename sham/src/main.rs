//! Entry point for `sham`.
//!
//! Parses CLI arguments and dispatches into either **server** or **client** mode.
//! All actual protocol work is delegated to library modules; `main.rs` owns only
//! process setup (logging, argument parsing, console output).

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::BufReader;

use sham::chat::{run_chat, ChatEnd};
use sham::event_log::EventLog;
use sham::socket::Socket;
use sham::transfer::{receive_file, send_file};
use sham::{Config, Connection};

/// Reliable, ordered byte stream over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Accept one connection and receive a file (or chat).
    Server {
        /// UDP port to listen on.
        port: u16,
        /// Local address to bind.
        #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
        bind: IpAddr,
        /// Interactive chat instead of a file transfer.
        #[arg(long)]
        chat: bool,
        /// Probability in [0, 1] of discarding each inbound data segment.
        #[arg(long, default_value_t = 0.0)]
        loss_rate: f64,
        /// Where the received bytes are written.
        #[arg(short, long, default_value = "received_file")]
        output: PathBuf,
        /// Event log path, written when RUDP_LOG=1.
        #[arg(long, default_value = "server_log.txt")]
        log_file: PathBuf,
    },
    /// Connect to a server and send a file (or chat).
    Client {
        /// Server IP address.
        server_ip: IpAddr,
        /// Server UDP port.
        server_port: u16,
        /// File to send.
        #[arg(required_unless_present = "chat", conflicts_with = "chat")]
        input: Option<PathBuf>,
        /// Interactive chat instead of a file transfer.
        #[arg(long)]
        chat: bool,
        /// Event log path, written when RUDP_LOG=1.
        #[arg(long, default_value = "client_log.txt")]
        log_file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Server {
            port,
            bind,
            chat,
            loss_rate,
            output,
            log_file,
        } => {
            let config = Config::default().with_loss_rate(loss_rate);
            config.validate().context("invalid --loss-rate")?;
            let events = EventLog::from_env(&log_file);
            if events.is_enabled() {
                log::info!("recording protocol events to {}", log_file.display());
            }
            let socket = Socket::bind(SocketAddr::new(bind, port))
                .await
                .with_context(|| format!("cannot bind UDP port {port}"))?;
            println!("Server listening on port {port}");

            if chat {
                let mut conn = Connection::accept(socket, config, events)
                    .await
                    .context("handshake failed")?;
                println!("Connection established");
                chat_session(&mut conn).await?;
            } else {
                let report = receive_file(socket, &output, config, events)
                    .await
                    .context("file transfer failed")?;
                if let Some(digest) = report.digest {
                    println!("MD5: {digest}");
                }
            }
        }
        Mode::Client {
            server_ip,
            server_port,
            input,
            chat,
            log_file,
        } => {
            let server = SocketAddr::new(server_ip, server_port);
            let config = Config::default();
            let events = EventLog::from_env(&log_file);
            if events.is_enabled() {
                log::info!("recording protocol events to {}", log_file.display());
            }
            let unspecified: SocketAddr = match server_ip {
                IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
                IpAddr::V6(_) => (std::net::Ipv6Addr::UNSPECIFIED, 0).into(),
            };
            let socket = Socket::bind(unspecified)
                .await
                .context("cannot bind local UDP socket")?;
            log::info!("client bound to {}, connecting to {server}", socket.local_addr);

            match input {
                Some(path) if !chat => {
                    let size = tokio::fs::metadata(&path)
                        .await
                        .with_context(|| format!("cannot read {}", path.display()))?
                        .len();
                    println!("Sending file: {} ({size} bytes)", path.display());
                    send_file(socket, server, &path, config, events)
                        .await
                        .context("file transfer failed")?;
                    println!("File sent successfully");
                }
                _ => {
                    let mut conn = Connection::connect(socket, server, config, events)
                        .await
                        .context("handshake failed")?;
                    println!("Connection established");
                    chat_session(&mut conn).await?;
                }
            }
        }
    }

    Ok(())
}

async fn chat_session(conn: &mut Connection) -> Result<()> {
    println!("Chat mode started. Type /quit to exit.");
    let stdin = BufReader::new(tokio::io::stdin());
    let end = run_chat(conn, stdin, tokio::io::stdout())
        .await
        .context("chat session failed")?;
    if end == ChatEnd::PeerClosed {
        println!("Peer closed the connection");
    }
    Ok(())
}
