use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use super::{subscription_id, Relay, Subscription, SubscriptionEvent};
use crate::error::{Error, Result};
use crate::event::Event;
use crate::filter::Filter;

struct Subscriber {
    filters: Vec<Filter>,
    sender: mpsc::UnboundedSender<SubscriptionEvent>,
}

#[derive(Default)]
struct State {
    events: Vec<Event>,
    seen: HashSet<String>,
    subscribers: HashMap<String, Subscriber>,
    rejection: Option<String>,
    ack_delay: Duration,
    closed: bool,
}

impl State {
    fn store(&mut self, event: Event) {
        if !self.seen.insert(event.id.clone()) {
            return;
        }

        self.subscribers.retain(|_, subscriber| {
            if subscriber.filters.iter().any(|f| f.matches(&event)) {
                subscriber
                    .sender
                    .send(SubscriptionEvent::Event(event.clone()))
                    .is_ok()
            } else {
                !subscriber.sender.is_closed()
            }
        });
        self.events.push(event);
    }

    /// Stored matches, newest first, honouring each filter's limit.
    /// Equal timestamps go to the later arrival.
    fn query(&self, filters: &[Filter]) -> Vec<Event> {
        let mut ids = HashSet::new();
        let mut matched = Vec::new();

        for filter in filters {
            let mut hits: Vec<&Event> = self
                .events
                .iter()
                .rev()
                .filter(|e| filter.matches(e))
                .collect();
            hits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            if let Some(limit) = filter.limit {
                hits.truncate(limit);
            }
            for event in hits {
                if ids.insert(event.id.as_str()) {
                    matched.push(event.clone());
                }
            }
        }

        matched
    }
}

/// In-process relay: verifies signatures, deduplicates by id, answers
/// filters and fans new events out to live subscriptions.
#[derive(Clone)]
pub struct MemoryRelay {
    url: String,
    state: Arc<Mutex<State>>,
}

impl Default for MemoryRelay {
    fn default() -> Self {
        Self::new("memory://relay")
    }
}

impl MemoryRelay {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Store an event without any checks, as a misbehaving relay would
    pub fn inject(&self, event: Event) {
        self.state.lock().store(event);
    }

    /// Snapshot of everything stored, in arrival order
    pub fn events(&self) -> Vec<Event> {
        self.state.lock().events.clone()
    }

    /// Make every later publish fail with `OK false` and this message
    pub fn set_rejection(&self, message: Option<String>) {
        self.state.lock().rejection = message;
    }

    /// Delay the `OK` for stored events
    pub fn set_ack_delay(&self, delay: Duration) {
        self.state.lock().ack_delay = delay;
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    fn accept(&self, event: &Event) -> Result<Duration> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(Error::NotConnected);
        }
        if let Some(message) = &state.rejection {
            return Err(Error::Publish(message.clone()));
        }
        if !event.is_valid() {
            return Err(Error::Publish("invalid: bad id or signature".to_string()));
        }

        state.store(event.clone());
        Ok(state.ack_delay)
    }
}

#[async_trait]
impl Relay for MemoryRelay {
    fn url(&self) -> &str {
        &self.url
    }

    async fn publish(&self, event: &Event, timeout: Duration) -> Result<()> {
        let acknowledged = async {
            let delay = self.accept(event)?;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok::<(), Error>(())
        };

        tokio::time::timeout(timeout, acknowledged)
            .await
            .map_err(|_| Error::Timeout(format!("no OK from {} after {:?}", self.url, timeout)))?
    }

    async fn subscribe(&self, filters: Vec<Filter>) -> Result<Subscription> {
        let id = subscription_id();
        let (sender, receiver) = mpsc::unbounded_channel();

        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(Error::NotConnected);
            }
            for event in state.query(&filters) {
                let _ = sender.send(SubscriptionEvent::Event(event));
            }
            let _ = sender.send(SubscriptionEvent::EndOfStoredEvents);
            state
                .subscribers
                .insert(id.clone(), Subscriber { filters, sender });
        }
        debug!(relay = %self.url, subscription = %id, "subscribed");

        let state = Arc::clone(&self.state);
        let closing = id.clone();
        Ok(Subscription::new(id, receiver, move || {
            state.lock().subscribers.remove(&closing);
        }))
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.closed = true;
        for (_, subscriber) in state.subscribers.drain() {
            let _ = subscriber
                .sender
                .send(SubscriptionEvent::Closed("relay closed".to_string()));
        }
        Ok(())
    }
}
