use anyhow::Result;
use pow_messenger::keys::parse_public_key;
use pow_messenger::{ClientConfig, DirectMessage, InboxItem, MessengerClient};
use std::env;
use std::io::{self, Write};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <peer_pubkey> [relay_url]", args[0]);
        eprintln!(
            "Example: {} npub1zutzeysacnf9rru6zqwmxd54mud0k44tst6l70ja5mhv8jjumytsd2x7nu",
            args[0]
        );
        std::process::exit(1);
    }

    let peer = &args[1];

    let config = ClientConfig::from_env(None)?;
    let (client, _) = MessengerClient::open(config)?;
    println!("Your public key: {}", client.public_key_string());

    match args.get(2) {
        Some(url) => client.connect(url).await?,
        None => {
            client.connect_to_default().await?;
        }
    }

    println!("Loading history...");
    let report = client.sync_direct_messages(200).await?;
    if report.failed > 0 {
        println!("{} messages could not be decrypted", report.failed);
    }

    // Clear the screen
    print!("\x1B[2J\x1B[1;1H");

    println!("=== Conversation with {} ===", peer);
    println!("Type your message and press Enter to send. Press Ctrl+C to exit.\n");

    // Display last 10 messages
    let history = client.chat_messages(peer)?;
    for msg in history.iter().rev().take(10).rev() {
        display_message(msg);
    }

    println!("\n{:-<80}", "");

    // Create a channel for communication between tasks
    let (tx, mut rx) = mpsc::channel::<String>(100);

    // Spawn input handler
    tokio::task::spawn_blocking(move || {
        let stdin = io::stdin();
        loop {
            let mut input = String::new();
            match stdin.read_line(&mut input) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if tx.blocking_send(input).is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut inbox = client.start_listening().await?;
    let peer_hex = hex::encode(parse_public_key(peer)?.serialize());

    print!("> ");
    io::stdout().flush()?;

    loop {
        tokio::select! {
            // Handle user input
            Some(input) = rx.recv() => {
                let input = input.trim();

                if input.is_empty() {
                    print!("> ");
                    io::stdout().flush()?;
                    continue;
                }

                // Send message
                match client.send_encrypted_message(peer, input).await {
                    Ok(event) => {
                        print!("\x1B[1A\x1B[K"); // Move up and clear line
                        if let Some(msg) = client
                            .chat_messages(peer)?
                            .into_iter()
                            .find(|m| m.id == event.id)
                        {
                            display_message(&msg);
                        }
                    }
                    Err(e) => {
                        eprintln!("\nError sending message: {}", e);
                    }
                }

                print!("> ");
                io::stdout().flush()?;
            }

            // New messages from the relay
            item = inbox.recv() => {
                match item {
                    Some(InboxItem::Direct { partner, message }) => {
                        // Our own sends come back as echoes; they are already shown
                        if partner == peer_hex && !message.is_mine {
                            print!("\r\x1B[K"); // Clear current line
                            display_message(&message);
                            print!("> ");
                            io::stdout().flush().ok();
                        }
                    }
                    Some(InboxItem::DecryptFailed { sender, error, .. }) => {
                        if sender == peer_hex {
                            eprintln!("\r\x1B[KCould not decrypt a message: {}", error);
                        }
                    }
                    Some(InboxItem::Note(_)) => {}
                    None => break,
                }
            }
        }
    }

    client.close().await?;
    Ok(())
}

fn display_message(msg: &DirectMessage) {
    let timestamp = chrono::DateTime::from_timestamp(msg.created_at as i64, 0)
        .map(|dt| dt.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "??:??:??".to_string());

    if msg.is_mine {
        println!("[{}] You: {}", timestamp, msg.content);
    } else {
        let sender_short = if msg.sender.len() > 16 {
            format!("{}...", &msg.sender[..16])
        } else {
            msg.sender.clone()
        };
        println!("[{}] {}: {}", timestamp, sender_short, msg.content);
    }
}
