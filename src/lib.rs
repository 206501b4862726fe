//! # PoW Messenger
//!
//! A Rust library for encrypted, proof-of-work stamped messaging over Nostr
//! relays.
//!
//! ## Features
//!
//! - NIP-44 v2 encrypted direct messages
//! - Proof-of-work nonce mining (NIP-13) with cooperative cancellation
//! - Schnorr signing and verification of events (NIP-01)
//! - Recovery from a mnemonic phrase (NIP-06)
//! - Inbox pipeline with profile, conversation and like caches
//! - Contact lists, reactions, reposts, threads and profile queries
//!
//! ## Example
//!
//! ```no_run
//! use pow_messenger::{InboxItem, MessengerClient};
//!
//! # async fn example() -> pow_messenger::Result<()> {
//! // Create client from a recovery phrase
//! let client = MessengerClient::from_recovery_phrase(
//!     "leader monkey parrot ring guide accident before fence cannon height naive bean",
//!     None,
//!     None,
//! )?;
//!
//! // Connect to the first reachable seed relay
//! client.connect_to_default().await?;
//!
//! // Send a message
//! client
//!     .send_encrypted_message("npub1zutzeysacnf9rru6zqwmxd54mud0k44tst6l70ja5mhv8jjumytsd2x7nu", "Hello, world!")
//!     .await?;
//!
//! // Receive messages
//! let mut inbox = client.start_listening().await?;
//! while let Some(item) = inbox.recv().await {
//!     if let InboxItem::Direct { message, .. } = item {
//!         println!("{}", message.content);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod event;
pub mod filter;
pub mod identity;
pub mod inbox;
pub mod keys;
pub mod message;
pub mod pow;
pub mod relay;
pub mod tag;

pub use cache::SessionCaches;
pub use client::{FollowedUser, MessengerClient};
pub use config::ClientConfig;
pub use crypto::ConversationKey;
pub use error::{CryptoError, Error, Result};
pub use event::Event;
pub use filter::Filter;
pub use identity::{Identity, IdentityStore};
pub use inbox::Inbox;
pub use keys::Keys;
pub use message::{
    ConversationSummary, DirectMessage, FeedItem, FollowOutcome, InboxItem, LikeOutcome,
    PostStats, Profile, SyncReport, ThreadEvent,
};
pub use pow::{DifficultyTable, MessageClass, MineOutcome, MiningReport};
pub use relay::{MemoryRelay, Relay, Subscription, SubscriptionEvent, WebSocketRelay};
pub use tag::Tag;

pub use bip39::Language;
