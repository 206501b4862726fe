//! Relay collaborator.
//!
//! The session talks to relays through the [`Relay`] trait: publish with a
//! deadline, open a streaming subscription, or run a one-shot query that ends
//! at end-of-stored-events. [`WebSocketRelay`] speaks NIP-01 over a
//! WebSocket; [`MemoryRelay`] is an in-process relay with the same contract.

mod memory;
mod message;
mod ws;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::event::Event;
use crate::filter::Filter;

pub use memory::MemoryRelay;
pub use message::{ClientMessage, RelayMessage};
pub use ws::WebSocketRelay;

/// Public relays tried in order by `connect_to_default`
pub const SEED_RELAYS: &[&str] = &[
    "wss://relay.damus.io",
    "wss://nos.lol",
    "wss://relay.nostr.band",
    "wss://nostr.wine",
    "wss://relay.snort.social",
];

/// Items delivered on a subscription stream
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    Event(Event),
    /// Everything stored has been sent; further events are live
    EndOfStoredEvents,
    /// The relay ended the subscription
    Closed(String),
}

/// A live subscription. Dropping it sends `CLOSE` to the relay.
pub struct Subscription {
    id: String,
    receiver: mpsc::UnboundedReceiver<SubscriptionEvent>,
    on_close: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(
        id: String,
        receiver: mpsc::UnboundedReceiver<SubscriptionEvent>,
        on_close: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            id,
            receiver,
            on_close: Some(Box::new(on_close)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Next item, or `None` once the connection or subscription is gone
    pub async fn recv(&mut self) -> Option<SubscriptionEvent> {
        self.receiver.recv().await
    }

    /// Next event, skipping the end-of-stored marker
    pub async fn next_event(&mut self) -> Option<Event> {
        loop {
            match self.recv().await? {
                SubscriptionEvent::Event(event) => return Some(event),
                SubscriptionEvent::EndOfStoredEvents => continue,
                SubscriptionEvent::Closed(_) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(on_close) = self.on_close.take() {
            on_close();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Fresh random subscription id
pub fn subscription_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Connection to one relay
#[async_trait]
pub trait Relay: Send + Sync {
    fn url(&self) -> &str;

    /// Send an event and wait for the relay's `OK`.
    ///
    /// A timeout means the outcome is unknown. Retrying is safe: relays
    /// deduplicate by event id.
    async fn publish(&self, event: &Event, timeout: Duration) -> Result<()>;

    async fn subscribe(&self, filters: Vec<Filter>) -> Result<Subscription>;

    /// Collect stored events until `EOSE`. Hitting the deadline first
    /// returns whatever arrived so far; a relay refusing the query with
    /// `CLOSED` is an error.
    async fn query_sync(&self, filter: Filter, timeout: Duration) -> Result<Vec<Event>> {
        let mut subscription = self.subscribe(vec![filter]).await?;
        let mut events = Vec::new();

        let collect = async {
            while let Some(item) = subscription.recv().await {
                match item {
                    SubscriptionEvent::Event(event) => events.push(event),
                    SubscriptionEvent::EndOfStoredEvents => break,
                    SubscriptionEvent::Closed(reason) => {
                        debug!(relay = self.url(), %reason, "query closed by relay");
                        return Err(Error::Subscription(reason));
                    }
                }
            }
            Ok(())
        };
        match tokio::time::timeout(timeout, collect).await {
            Ok(result) => result?,
            Err(_) => debug!(relay = self.url(), ?timeout, "query deadline reached before EOSE"),
        }

        Ok(events)
    }

    async fn close(&self) -> Result<()>;
}
