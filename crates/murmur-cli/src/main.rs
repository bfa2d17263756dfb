//! Murmur CLI
//!
//! Terminal chat over the gossip relay network. Every line typed is sent
//! to the active channel; `/msg <public-key> <text>` sends a private
//! message.
//!
//! ## Usage
//!
//! ```bash
//! # Start the first node of a network
//! murmur
//!
//! # Join through a known peer on a named channel
//! murmur --peer <endpoint-id> --channel rust
//!
//! # Listen on extra channels and spend more time on proof-of-work
//! murmur --join ops --join random --pow-time 10 --pow-target 4
//!
//! # Verbose logging (or set RUST_LOG)
//! murmur -vv
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use iroh::EndpointId;
use murmur_core::config::{DEFAULT_CHANNEL, DEFAULT_MIN_POW, DEFAULT_POW_TARGET, DEFAULT_TTL};
use murmur_core::{ChatConfig, ChatNode, ChatUi, GossipTransport, PublicKey, SenderId, Topic};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Lines buffered between stdin and the command loop
const COMMAND_QUEUE_CAPACITY: usize = 32;

#[derive(Parser)]
#[command(name = "murmur")]
#[command(version = "0.1.0")]
#[command(about = "Topic-addressed encrypted chat over a gossip relay network")]
#[command(
    long_about = "Murmur sends every line you type to a channel derived from its name. \
Anyone who knows the name can read it. Use `/msg <public-key> <text>` to send a \
message only the holder of that key can open."
)]
struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Channel that plain lines are sent to
    #[arg(short, long, default_value = DEFAULT_CHANNEL)]
    channel: String,

    /// Additional channels to listen on (repeatable)
    #[arg(short, long = "join", value_name = "CHANNEL")]
    join: Vec<String>,

    /// Private message topic, 4 bytes hex (e.g. 0x11223344)
    #[arg(long)]
    topic: Option<Topic>,

    /// Seconds each message stays alive on the network
    #[arg(long, default_value_t = DEFAULT_TTL)]
    ttl: u32,

    /// Seconds to spend on proof-of-work per message
    #[arg(long, value_name = "SECS", value_parser = parse_seconds)]
    pow_time: Option<Duration>,

    /// Proof-of-work target for outgoing messages
    #[arg(long, default_value_t = DEFAULT_POW_TARGET)]
    pow_target: f64,

    /// Minimum proof-of-work accepted from peers
    #[arg(long, default_value_t = DEFAULT_MIN_POW)]
    min_pow: f64,

    /// Bootstrap peer endpoint id (repeatable)
    #[arg(short, long = "peer", value_name = "ENDPOINT_ID")]
    peer: Vec<EndpointId>,
}

impl Cli {
    fn config(&self) -> ChatConfig {
        let defaults = ChatConfig::default();
        ChatConfig {
            channel_name: self.channel.clone(),
            topic: self.topic.unwrap_or(defaults.topic),
            ttl: self.ttl,
            pow_time: self.pow_time.unwrap_or(defaults.pow_time),
            pow_target: self.pow_target,
            min_pow: self.min_pow,
            join: self.join.clone(),
        }
    }
}

/// Parse a positive number of seconds, fractions allowed
fn parse_seconds(s: &str) -> Result<Duration, String> {
    let secs: f64 = s
        .parse()
        .map_err(|_| format!("'{}' is not a number of seconds", s))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(format!("'{}' must be a positive number of seconds", s));
    }
    Ok(Duration::from_secs_f64(secs))
}

fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    // Logs go to stderr so they never interleave with the chat on stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Line-oriented terminal rendering
struct TerminalUi;

impl ChatUi for TerminalUi {
    fn set_user_public_key(&self, public_key: &PublicKey) {
        println!("Your public key: {}", public_key);
        println!("Share it so others can reach you with /msg");
        println!();
    }

    fn add_message(&self, sender: &SenderId, text: &str) {
        println!("[{}] {}: {}", Local::now().format("%H:%M:%S"), sender, text);
    }

    fn add_error(&self, message: &str) {
        eprintln!("[{}] error: {}", Local::now().format("%H:%M:%S"), message);
    }
}

/// Forward stdin lines until EOF or Ctrl-C
fn spawn_stdin_reader(tx: mpsc::Sender<String>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    debug!("Interrupted");
                    break;
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if tx.send(line).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        eprintln!("Failed to read stdin: {}", e);
                        break;
                    }
                },
            }
        }
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = cli.config();
    config.validate().context("Invalid configuration")?;

    let transport = GossipTransport::bind(cli.peer.clone())
        .await
        .context("Failed to start network transport")?;
    println!("Endpoint: {}", transport.endpoint_id());
    println!("Others can join with: murmur --peer {}", transport.endpoint_id());

    let node = ChatNode::start(config, transport, Arc::new(TerminalUi))
        .await
        .context("Failed to start chat session")?;
    let transport = node.router().transport().clone();

    println!(
        "Chatting on #{} (type /msg <public-key> <text> for private messages)",
        node.router().session().active_channel()
    );
    info!(public_key = %node.public_key().short(), "Ready");

    let (tx, rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
    let reader = spawn_stdin_reader(tx);

    let stats = node.run(rx).await;
    reader.abort();
    info!(?stats, "Session ended");

    transport
        .shutdown()
        .await
        .context("Failed to shut down transport")?;
    Ok(())
}
