use anyhow::Result;
use pow_messenger::{ClientConfig, MessengerClient};
use std::env;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <recipient_pubkey> <message> [relay_url]", args[0]);
        eprintln!(
            "Example: {} npub1zutzeysacnf9rru6zqwmxd54mud0k44tst6l70ja5mhv8jjumytsd2x7nu \"Hello there!\" wss://nos.lol",
            args[0]
        );
        std::process::exit(1);
    }

    let recipient = &args[1];
    let message_content = &args[2];

    let config = ClientConfig::from_env(None)?;
    let (client, _) = MessengerClient::open(config)?;
    println!("Your public key: {}", client.public_key_string());

    match args.get(3) {
        Some(url) => client.connect(url).await?,
        None => {
            let url = client.connect_to_default().await?;
            println!("Connected to {}", url);
        }
    }

    println!(
        "\nMining and sending message to {} (difficulty {})...",
        recipient,
        client.config().difficulty.private
    );

    let event = client.send_encrypted_message(recipient, message_content).await?;
    println!("✓ Message sent successfully!");
    println!("Event ID: {}", event.id);
    println!("Proof of work: {} bits", event.pow_difficulty());
    println!("Content: {}", message_content);
    println!(
        "Timestamp: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );

    client.close().await?;
    Ok(())
}
