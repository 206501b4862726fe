use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::message::{ClientMessage, RelayMessage};
use super::{subscription_id, Relay, Subscription, SubscriptionEvent};
use crate::error::{Error, Result};
use crate::event::Event;
use crate::filter::Filter;

/// Pending publishes: event id -> (accepted, message)
type PendingOks = Arc<Mutex<HashMap<String, oneshot::Sender<(bool, String)>>>>;
/// Open subscriptions: subscription id -> stream
type Routes = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<SubscriptionEvent>>>>;

/// NIP-01 relay connection over a WebSocket.
///
/// A writer task drains an outgoing queue into the socket; a reader task
/// routes `OK` frames to waiting publishes and `EVENT`/`EOSE`/`CLOSED`
/// frames to subscriptions.
pub struct WebSocketRelay {
    url: String,
    outgoing: mpsc::UnboundedSender<Message>,
    pending: PendingOks,
    routes: Routes,
    connected: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

impl WebSocketRelay {
    /// Open the connection, giving up after `connect_timeout`
    pub async fn connect(url: &str, connect_timeout: Duration) -> Result<Self> {
        let parsed = Url::parse(url)
            .map_err(|e| Error::Connection(format!("invalid relay url {}: {}", url, e)))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(Error::Connection(format!(
                "relay url must use ws:// or wss://, got {}",
                url
            )));
        }

        info!("Connecting to relay: {}", url);
        let stream = match tokio::time::timeout(connect_timeout, connect_async(url)).await {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => return Err(Error::Connection(format!("{}: {}", url, e))),
            Err(_) => {
                return Err(Error::Timeout(format!(
                    "connecting to {} after {:?}",
                    url, connect_timeout
                )))
            }
        };
        info!("Connected to relay: {}", url);

        let (mut sink, mut source) = stream.split();
        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();
        let pending: PendingOks = Arc::default();
        let routes: Routes = Arc::default();
        let connected = Arc::new(AtomicBool::new(true));
        let shutdown = CancellationToken::new();

        // Writer
        {
            let connected = Arc::clone(&connected);
            let shutdown = shutdown.clone();
            let url = url.to_string();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            let _ = sink.send(Message::Close(None)).await;
                            break;
                        }
                        next = outgoing_rx.recv() => {
                            let Some(message) = next else { break };
                            if let Err(e) = sink.send(message).await {
                                warn!("WebSocket write to {} failed: {}", url, e);
                                break;
                            }
                        }
                    }
                }
                connected.store(false, Ordering::SeqCst);
                let _ = sink.close().await;
            });
        }

        // Reader
        {
            let connected = Arc::clone(&connected);
            let shutdown = shutdown.clone();
            let pending = Arc::clone(&pending);
            let routes = Arc::clone(&routes);
            let url = url.to_string();
            tokio::spawn(async move {
                loop {
                    let frame = tokio::select! {
                        _ = shutdown.cancelled() => break,
                        frame = source.next() => frame,
                    };
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            route_frame(&url, text.as_str(), &pending, &routes)
                        }
                        Some(Ok(Message::Close(_))) => {
                            info!("Relay {} closed connection", url);
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!("WebSocket error from {}: {}", url, e);
                            break;
                        }
                        None => break,
                    }
                }

                connected.store(false, Ordering::SeqCst);
                // Dropping the senders ends every subscription stream and
                // fails every publish still waiting for OK
                routes.lock().clear();
                pending.lock().clear();
            });
        }

        Ok(Self {
            url: url.to_string(),
            outgoing,
            pending,
            routes,
            connected,
            shutdown,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn send(&self, message: &ClientMessage) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        let text = message.to_json()?;
        self.outgoing
            .send(Message::Text(text.into()))
            .map_err(|_| Error::NotConnected)
    }
}

fn route_frame(url: &str, text: &str, pending: &PendingOks, routes: &Routes) {
    let message = match RelayMessage::from_json(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("Dropping malformed message from {}: {}", url, e);
            return;
        }
    };

    match message {
        RelayMessage::Event {
            subscription_id,
            event,
        } => {
            let mut routes = routes.lock();
            if let Some(route) = routes.get(&subscription_id) {
                if route.send(SubscriptionEvent::Event(*event)).is_err() {
                    debug!("Subscription {} channel closed, removing", subscription_id);
                    routes.remove(&subscription_id);
                }
            }
        }
        RelayMessage::Ok {
            event_id,
            accepted,
            message,
        } => {
            if let Some(waiter) = pending.lock().remove(&event_id) {
                let _ = waiter.send((accepted, message));
            }
        }
        RelayMessage::EndOfStoredEvents(subscription_id) => {
            if let Some(route) = routes.lock().get(&subscription_id) {
                let _ = route.send(SubscriptionEvent::EndOfStoredEvents);
            }
        }
        RelayMessage::Closed {
            subscription_id,
            message,
        } => {
            if let Some(route) = routes.lock().remove(&subscription_id) {
                let _ = route.send(SubscriptionEvent::Closed(message));
            }
        }
        RelayMessage::Notice(notice) => info!("Notice from {}: {}", url, notice),
    }
}

#[async_trait]
impl Relay for WebSocketRelay {
    fn url(&self) -> &str {
        &self.url
    }

    async fn publish(&self, event: &Event, timeout: Duration) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(event.id.clone(), tx);

        if let Err(e) = self.send(&ClientMessage::Event(event.clone())) {
            self.pending.lock().remove(&event.id);
            return Err(e);
        }
        debug!("Published event {} to {}", event.id, self.url);

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok((true, _))) => Ok(()),
            Ok(Ok((false, message))) => Err(Error::Publish(message)),
            Ok(Err(_)) => Err(Error::Connection(format!(
                "connection to {} closed before OK",
                self.url
            ))),
            Err(_) => {
                self.pending.lock().remove(&event.id);
                Err(Error::Timeout(format!(
                    "no OK from {} after {:?}",
                    self.url, timeout
                )))
            }
        }
    }

    async fn subscribe(&self, filters: Vec<Filter>) -> Result<Subscription> {
        let id = subscription_id();
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes.lock().insert(id.clone(), tx);

        let request = ClientMessage::Req {
            subscription_id: id.clone(),
            filters,
        };
        if let Err(e) = self.send(&request) {
            self.routes.lock().remove(&id);
            return Err(e);
        }
        debug!("Opened subscription {} on {}", id, self.url);

        let routes = Arc::clone(&self.routes);
        let outgoing = self.outgoing.clone();
        let closing = id.clone();
        Ok(Subscription::new(id, rx, move || {
            if routes.lock().remove(&closing).is_some() {
                if let Ok(text) = ClientMessage::Close(closing).to_json() {
                    let _ = outgoing.send(Message::Text(text.into()));
                }
            }
        }))
    }

    async fn close(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.shutdown.cancel();
        self.routes.lock().clear();
        self.pending.lock().clear();
        info!("Disconnected from relay: {}", self.url);
        Ok(())
    }
}

impl Drop for WebSocketRelay {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
