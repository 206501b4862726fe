//! Inbox pipeline.
//!
//! A standing subscription feeds a background task that verifies each event,
//! updates the session caches and forwards what the consumer cares about
//! over a bounded channel. Cancelling the session token stops the task and
//! closes the channel.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::SessionCaches;
use crate::crypto;
use crate::error::CryptoError;
use crate::event::{kind, Event};
use crate::keys::{parse_public_key, Keys};
use crate::message::{DirectMessage, FeedItem, InboxItem, Profile};
use crate::relay::{Subscription, SubscriptionEvent};

/// Turns verified relay events into cache updates and inbox items
#[derive(Debug, Clone)]
pub struct InboxDispatcher {
    keys: Keys,
    caches: Arc<SessionCaches>,
}

impl InboxDispatcher {
    pub fn new(keys: Keys, caches: Arc<SessionCaches>) -> Self {
        Self { keys, caches }
    }

    /// Handle one event from the stream.
    ///
    /// Events failing signature verification are dropped. Profiles only
    /// update the cache; notes, reposts and direct messages produce an item.
    pub fn dispatch(&self, event: Event) -> Option<InboxItem> {
        if !event.is_valid() {
            warn!(id = %event.id, pubkey = %event.pubkey, "dropping event with invalid signature");
            return None;
        }

        match event.kind {
            kind::METADATA => {
                match Profile::from_event(&event) {
                    Some(profile) => {
                        self.caches
                            .profiles
                            .upsert(&event.pubkey, event.created_at, profile);
                    }
                    None => debug!(pubkey = %event.pubkey, "unparseable profile content"),
                }
                None
            }
            kind::TEXT_NOTE | kind::REPOST => {
                let author = self.caches.profiles.get(&event.pubkey);
                Some(InboxItem::Note(FeedItem::new(event, author.as_ref())))
            }
            kind::ENCRYPTED_DIRECT_MESSAGE => Some(self.open_direct_message(event)),
            other => {
                debug!(kind = other, id = %event.id, "ignoring event kind");
                None
            }
        }
    }

    /// Decrypt a kind-4 event and file it under its conversation partner.
    ///
    /// For messages we sent, the partner is the first `p` tag; otherwise it
    /// is the author. The caller is expected to have verified the event.
    pub fn open_direct_message(&self, event: Event) -> InboxItem {
        let me = self.keys.public_key_hex();
        let is_mine = event.pubkey == me;
        let partner = if is_mine {
            event.pubkey_tags().next().map(str::to_string)
        } else {
            Some(event.pubkey.clone())
        };

        let Some(partner) = partner else {
            warn!(id = %event.id, "direct message without recipient");
            return InboxItem::DecryptFailed {
                event_id: event.id,
                sender: event.pubkey,
                error: CryptoError::InvalidPayload("missing recipient tag".into()),
            };
        };

        match self.decrypt_from(&partner, &event.content) {
            Ok(content) => {
                let message = DirectMessage {
                    id: event.id,
                    sender: event.pubkey,
                    content,
                    created_at: event.created_at,
                    is_mine,
                };
                self.caches.conversations.insert(&partner, message.clone());
                InboxItem::Direct { partner, message }
            }
            Err(error) => {
                warn!(id = %event.id, sender = %event.pubkey, %error, "failed to decrypt direct message");
                InboxItem::DecryptFailed {
                    event_id: event.id,
                    sender: event.pubkey,
                    error,
                }
            }
        }
    }

    fn decrypt_from(&self, partner: &str, payload: &str) -> Result<String, CryptoError> {
        let partner_key = parse_public_key(partner)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let key = crypto::derive_shared_key(self.keys.secret_key(), &partner_key);
        crypto::decrypt(payload, &key)
    }
}

/// Receiving end of a running inbox
#[derive(Debug)]
pub struct Inbox {
    receiver: mpsc::Receiver<InboxItem>,
}

impl Inbox {
    /// Start the pipeline on `subscription`. The task ends when `cancel`
    /// fires, the subscription ends, or the `Inbox` is dropped.
    pub fn spawn(
        subscription: Subscription,
        dispatcher: InboxDispatcher,
        capacity: usize,
        cancel: CancellationToken,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        tokio::spawn(run(subscription, dispatcher, sender, cancel));
        Self { receiver }
    }

    /// Next item; `None` once the pipeline has stopped
    pub async fn recv(&mut self) -> Option<InboxItem> {
        self.receiver.recv().await
    }
}

async fn run(
    mut subscription: Subscription,
    dispatcher: InboxDispatcher,
    sender: mpsc::Sender<InboxItem>,
    cancel: CancellationToken,
) {
    debug!(subscription = subscription.id(), "inbox started");

    loop {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            item = subscription.recv() => item,
        };

        let event = match item {
            Some(SubscriptionEvent::Event(event)) => event,
            Some(SubscriptionEvent::EndOfStoredEvents) => {
                debug!(subscription = subscription.id(), "inbox caught up");
                continue;
            }
            Some(SubscriptionEvent::Closed(reason)) => {
                warn!(subscription = subscription.id(), %reason, "relay closed inbox subscription");
                break;
            }
            None => break,
        };

        let Some(delivery) = dispatcher.dispatch(event) else {
            continue;
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = sender.send(delivery) => {
                if sent.is_err() {
                    debug!("inbox receiver dropped");
                    break;
                }
            }
        }
    }

    debug!(subscription = subscription.id(), "inbox stopped");
}
