//! Movantchat CLI entry point.
//!
//! Line-based chat client: one line per action, `/exit` (case-insensitive)
//! or Ctrl-C leaves. Inbound messages print as `[topic] text`; messages
//! that fail to decrypt print an error notice and the session continues.
//!
//! # Usage
//!
//! ```bash
//! # Against a broker
//! movantchat --broker 127.0.0.1 --port 1883
//!
//! # Self-contained, with an in-process broker (single client)
//! movantchat --local
//! ```

use clap::Parser;
use movantchat_client::{Chat, ChatEvent, local::LocalBroker, transport};
use movantchat_core::{
    BrokerConfig, DEFAULT_KEEPALIVE, DEFAULT_PORT, RoomRegistry, SystemEnv, random_client_id,
};
use movantchat_crypto::derive;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin, stdin};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Movantchat encrypted chat client
#[derive(Parser, Debug)]
#[command(name = "movantchat")]
#[command(about = "Encrypted group chat over a pub/sub broker")]
#[command(version)]
struct Args {
    /// Broker hostname or address
    #[arg(long, default_value = "127.0.0.1")]
    broker: String,

    /// Broker port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Display name; prompted for if not given
    #[arg(short, long)]
    username: Option<String>,

    /// Chat room to join; prompted for if not given
    #[arg(short, long)]
    room: Option<String>,

    /// Room passphrase; prompted for if not given
    #[arg(short, long)]
    passphrase: Option<String>,

    /// Run against an in-process broker instead of a network one
    #[arg(long)]
    local: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let mut lines = BufReader::new(stdin()).lines();

    let username = match args.username {
        Some(username) => username,
        None => prompt(&mut lines, "Enter your username:").await?,
    };

    let room = match args.room {
        Some(room) => room,
        None => prompt(&mut lines, "Enter the chat room ('python'):").await?,
    };

    // Unknown room is fatal before any connection is attempted
    let registry = RoomRegistry::default();
    let topic = match registry.lookup(&room) {
        Ok(topic) => topic.to_owned(),
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        },
    };

    let passphrase = match args.passphrase {
        Some(passphrase) => passphrase,
        None => prompt(&mut lines, "Enter a passphrase for encryption:").await?,
    };

    let key = derive(&passphrase);
    let env = SystemEnv::new();

    let config = BrokerConfig {
        host: args.broker,
        port: args.port,
        keepalive: DEFAULT_KEEPALIVE,
        client_id: random_client_id(&env),
    };

    let local_broker;
    let link = if args.local {
        local_broker = LocalBroker::new();
        local_broker.connect()
    } else {
        transport::connect(&config).await?
    };

    let mut chat = Chat::start(username.clone(), topic, key, &config, link, env).await?;

    println!("Welcome to the chat, {username}! Type your messages below.");

    loop {
        let step = tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) if line.eq_ignore_ascii_case("/exit") => LoopStep::Exit,
                Some(line) => LoopStep::SendLine(line),
                // stdin closed
                None => LoopStep::Exit,
            },

            event = chat.next_event() => match event {
                Some(ChatEvent::Message { topic, text }) => {
                    println!("\n[{topic}] {text}");
                    LoopStep::Continue
                },
                Some(ChatEvent::DecryptFailed { topic, reason }) => {
                    eprintln!("Error decrypting message on [{topic}]: {reason}");
                    LoopStep::Continue
                },
                Some(ChatEvent::Disconnected { reason }) => {
                    eprintln!("Connection lost: {reason}");
                    LoopStep::Exit
                },
                None => LoopStep::Exit,
            },

            _ = tokio::signal::ctrl_c() => {
                println!("\nExiting chat...");
                LoopStep::Exit
            },
        };

        match step {
            LoopStep::SendLine(line) => {
                // Publish failures are non-fatal; report and keep going
                if let Err(e) = chat.send(&line).await {
                    eprintln!("Error sending message: {e}");
                }
            },
            LoopStep::Exit => {
                chat.close().await;
                break;
            },
            LoopStep::Continue => {},
        }
    }

    Ok(())
}

/// What the foreground loop should do after one select round.
enum LoopStep {
    /// Seal and publish this line.
    SendLine(String),
    /// Close the session and leave.
    Exit,
    /// Nothing further this round.
    Continue,
}

/// Print a prompt line and read one trimmed line of input.
async fn prompt(
    lines: &mut Lines<BufReader<Stdin>>,
    text: &str,
) -> Result<String, Box<dyn std::error::Error>> {
    println!("{text}");

    match lines.next_line().await? {
        Some(line) => Ok(line.trim().to_owned()),
        None => Err("stdin closed before input was provided".into()),
    }
}
