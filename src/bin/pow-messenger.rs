//! Command-line client.
//!
//! Identity is loaded from `~/.powchat/identity.json` (or `--identity`) and
//! generated automatically on first run.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use pow_messenger::{ClientConfig, FollowOutcome, InboxItem, MessengerClient};
use tracing_subscriber::EnvFilter;

/// Encrypted, proof-of-work stamped messaging over Nostr relays
#[derive(Parser)]
#[command(name = "pow-messenger")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Relay to use instead of the seed list
    #[arg(short, long, global = true)]
    relay: Option<String>,

    /// Identity file path
    #[arg(short, long, global = true)]
    identity: Option<PathBuf>,

    /// Path to a `.env` file with POWCHAT_* settings
    #[arg(long, global = true)]
    env: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show identity information
    Info,

    /// Send an encrypted direct message
    Send {
        /// Recipient public key (hex or npub)
        recipient: String,

        /// Message text
        message: String,
    },

    /// Publish a public note
    Note {
        /// Note text
        text: String,
    },

    /// Print incoming messages and notes until interrupted
    Listen,

    /// Add a key to the contact list
    Follow {
        /// Public key (hex or npub)
        pubkey: String,
    },

    /// Remove a key from the contact list
    Unfollow {
        /// Public key (hex or npub)
        pubkey: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut config = ClientConfig::from_env(cli.env.as_deref())?;
    if let Some(path) = cli.identity {
        config.identity_path = Some(path);
    }

    let (client, created) = MessengerClient::open(config)?;
    if created {
        println!("Generated a new identity");
    }

    // If no command specified, show identity
    let command = cli.command.unwrap_or(Commands::Info);

    if let Commands::Info = command {
        println!("Public key: {}", client.public_key_string());
        println!("npub:       {}", client.npub()?);
        return Ok(());
    }

    match cli.relay.as_deref() {
        Some(url) => client.connect(url).await?,
        None => {
            let url = client.connect_to_default().await?;
            println!("Connected to {}", url);
        }
    }

    let result = run(&client, command).await;
    client.close().await?;
    result
}

async fn run(client: &MessengerClient, command: Commands) -> Result<()> {
    match command {
        Commands::Info => {}
        Commands::Send { recipient, message } => {
            let event = client.send_encrypted_message(&recipient, &message).await?;
            println!("Sent {} ({} bits of work)", event.id, event.pow_difficulty());
        }
        Commands::Note { text } => {
            let event = client.publish_text_note(&text, Vec::new()).await?;
            println!("Published {}", event.id);
        }
        Commands::Listen => listen(client).await?,
        Commands::Follow { pubkey } => match client.follow(&pubkey).await? {
            FollowOutcome::AlreadyFollowing => println!("Already following {}", pubkey),
            _ => println!("Now following {}", pubkey),
        },
        Commands::Unfollow { pubkey } => match client.unfollow(&pubkey).await? {
            FollowOutcome::NotFollowing => println!("Not following {}", pubkey),
            _ => println!("Unfollowed {}", pubkey),
        },
    }
    Ok(())
}

async fn listen(client: &MessengerClient) -> Result<()> {
    let mut inbox = client.start_listening().await?;
    println!("Listening. Press Ctrl+C to exit.");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            item = inbox.recv() => match item {
                Some(InboxItem::Direct { partner, message }) => {
                    let who = if message.is_mine { "you" } else { partner.as_str() };
                    println!("[dm {}] {}", short(who), message.content);
                }
                Some(InboxItem::DecryptFailed { sender, error, .. }) => {
                    println!("[dm {}] <undecryptable: {}>", short(&sender), error);
                }
                Some(InboxItem::Note(item)) => {
                    let author = item
                        .author_name
                        .clone()
                        .unwrap_or_else(|| short(&item.event.pubkey).to_string());
                    match &item.reposted {
                        Some(original) => println!("[{} reposted] {}", author, original.content),
                        None => println!("[{}] {}", author, item.event.content),
                    }
                }
                None => break,
            },
        }
    }

    Ok(())
}

fn short(pubkey: &str) -> &str {
    pubkey.get(..12).unwrap_or(pubkey)
}
