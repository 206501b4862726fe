use anyhow::Result;
use pow_messenger::{ClientConfig, MessengerClient};
use std::env;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let relay = args.get(1).map(String::as_str);

    println!("Loading identity...");
    let config = ClientConfig::from_env(None)?;
    let (client, created) = MessengerClient::open(config)?;
    if created {
        println!("Generated a new identity");
    }

    // Get own public key
    println!("\nMy public key: {}", client.public_key_string());
    println!("My npub: {}", client.npub()?);

    println!("\nConnecting...");
    match relay {
        Some(url) => client.connect(url).await?,
        None => {
            let url = client.connect_to_default().await?;
            println!("Connected to {}", url);
        }
    }

    // Get own profile information
    match client.own_profile().await? {
        Some(profile) => {
            println!("\nMy Profile:");
            if let Some(name) = profile.name {
                println!("  Name: {}", name);
            }
            if let Some(about) = profile.about {
                println!("  About: {}", about);
            }
            if let Some(picture) = profile.picture {
                println!("  Picture: {}", picture);
            }
            if let Some(website) = profile.website {
                println!("  Website: {}", website);
            }
        }
        None => {
            println!("\nNo profile found for this key");
        }
    }

    // Get followed users
    let followed_users = client.followed_users(&client.public_key_string()).await?;
    println!("\nFollowed Users: {}", followed_users.len());

    for user in followed_users {
        println!("\n  Pubkey: {}", user.pubkey);
        if let Some(name) = user.name {
            println!("  Name: {}", name);
        }
    }

    client.close().await?;
    Ok(())
}
