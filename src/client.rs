use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use bip39::Language;
use futures::future::join_all;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::SessionCaches;
use crate::config::ClientConfig;
use crate::crypto;
use crate::error::{Error, Result};
use crate::event::{kind, Event};
use crate::filter::Filter;
use crate::identity::{Identity, IdentityStore};
use crate::inbox::{Inbox, InboxDispatcher};
use crate::keys::{parse_public_key, Keys};
use crate::message::{
    has_media, is_reply, ConversationSummary, DirectMessage, FeedItem, FollowOutcome, InboxItem,
    LikeOutcome, PostStats, Profile, SyncReport, ThreadEvent,
};
use crate::pow::{self, MineOutcome};
use crate::relay::{Relay, WebSocketRelay};
use crate::tag::{Tag, PUBKEY_TAG};

const FOLLOWERS_LIMIT: usize = 100;
const THREAD_LIMIT: usize = 100;

/// A user together with whatever profile the relay returned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowedUser {
    pub pubkey: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

/// Main client for proof-of-work messaging
///
/// Owns one identity, at most one relay connection and the session caches.
/// Every publishing action runs through the same pipeline: build, mine when
/// the action calls for it, sign, publish.
pub struct MessengerClient {
    keys: Keys,
    config: ClientConfig,
    relay: RwLock<Option<Arc<dyn Relay>>>,
    caches: Arc<SessionCaches>,
    cancel: CancellationToken,
}

impl MessengerClient {
    /// Create a new client from a keypair with default settings
    pub fn new(keys: Keys) -> Self {
        Self::with_config(keys, ClientConfig::default())
    }

    pub fn with_config(keys: Keys, config: ClientConfig) -> Self {
        Self {
            keys,
            config,
            relay: RwLock::new(None),
            caches: Arc::new(SessionCaches::default()),
            cancel: CancellationToken::new(),
        }
    }

    /// Create a new client from a stored identity
    pub fn from_identity(identity: &Identity, config: ClientConfig) -> Result<Self> {
        Ok(Self::with_config(identity.keys()?, config))
    }

    /// Load the identity named by `config`, creating one on first run.
    ///
    /// Returns the client and whether a new identity was generated.
    pub fn open(config: ClientConfig) -> Result<(Self, bool)> {
        let path = match &config.identity_path {
            Some(path) => path.clone(),
            None => IdentityStore::default_path()?,
        };
        let (identity, created) = IdentityStore::new(path).ensure()?;
        Ok((Self::from_identity(&identity, config)?, created))
    }

    /// Create a new client from a mnemonic recovery phrase (NIP-06)
    ///
    /// # Parameters
    /// - `mnemonic_phrase`: The BIP39 mnemonic phrase
    /// - `passphrase`: Optional passphrase for additional security (defaults to empty string)
    /// - `language`: Optional language for the mnemonic (defaults to English)
    pub fn from_recovery_phrase(
        mnemonic_phrase: &str,
        passphrase: Option<&str>,
        language: Option<Language>,
    ) -> Result<Self> {
        let keys = Keys::from_mnemonic(mnemonic_phrase, passphrase, language)?;
        Ok(Self::new(keys))
    }

    pub fn keys(&self) -> &Keys {
        &self.keys
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Get the public key as a hex string
    pub fn public_key_string(&self) -> String {
        self.keys.public_key_hex()
    }

    pub fn npub(&self) -> Result<String> {
        self.keys.npub()
    }

    pub fn caches(&self) -> &Arc<SessionCaches> {
        &self.caches
    }

    /// Session-wide token; cancelling it stops mining and the inbox
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Connect to a relay over WebSocket, replacing any current connection
    pub async fn connect(&self, url: &str) -> Result<()> {
        let relay = WebSocketRelay::connect(url, self.config.connect_timeout).await?;
        self.attach_relay(Arc::new(relay));
        Ok(())
    }

    /// Try the seed relays in order and keep the first that accepts.
    ///
    /// Returns the url that connected; if none do, the last error.
    pub async fn connect_to_default(&self) -> Result<String> {
        let mut last_error = Error::Connection("no seed relays configured".into());

        for url in &self.config.seed_relays {
            match self.connect(url).await {
                Ok(()) => return Ok(url.clone()),
                Err(e) => {
                    warn!(relay = %url, error = %e, "seed relay unreachable");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    /// Use an already connected relay
    pub fn attach_relay(&self, relay: Arc<dyn Relay>) {
        info!(relay = relay.url(), "relay attached");
        *self.relay.write() = Some(relay);
    }

    /// Url of the current relay, if any
    pub fn relay_url(&self) -> Option<String> {
        self.relay.read().as_ref().map(|r| r.url().to_string())
    }

    fn relay(&self) -> Result<Arc<dyn Relay>> {
        self.relay.read().clone().ok_or(Error::NotConnected)
    }

    /// Build, optionally mine, and sign an event without publishing it
    pub async fn finalize(
        &self,
        kind: u16,
        tags: Vec<Tag>,
        content: String,
        difficulty: Option<u32>,
    ) -> Result<Event> {
        let event = Event::unsigned(self.keys.public_key_hex(), kind, tags, content)?;
        self.seal(event, difficulty).await
    }

    async fn seal(&self, mut event: Event, difficulty: Option<u32>) -> Result<Event> {
        if let Some(target) = difficulty {
            event = self.mine(event, target).await?;
        }
        event.sign(&self.keys)?;
        Ok(event)
    }

    /// Build, mine, sign and publish.
    ///
    /// A publish timeout leaves the outcome unknown; publishing the returned
    /// event again is safe.
    pub async fn publish_draft(
        &self,
        kind: u16,
        tags: Vec<Tag>,
        content: String,
        difficulty: Option<u32>,
    ) -> Result<Event> {
        // Fail before spending any work on mining
        let relay = self.relay()?;
        let event = self.finalize(kind, tags, content, difficulty).await?;
        self.publish_event(relay.as_ref(), &event).await?;
        Ok(event)
    }

    /// Publish an already signed event, e.g. to retry after a timeout
    pub async fn republish(&self, event: &Event) -> Result<()> {
        let relay = self.relay()?;
        self.publish_event(relay.as_ref(), event).await
    }

    async fn publish_event(&self, relay: &dyn Relay, event: &Event) -> Result<()> {
        if !event.is_valid() {
            return Err(Error::InvalidSignature);
        }
        relay.publish(event, self.config.publish_timeout).await?;
        info!(id = %event.id, kind = event.kind, relay = relay.url(), "event published");
        Ok(())
    }

    async fn mine(&self, mut event: Event, target: u32) -> Result<Event> {
        let cancel = self.cancel.child_token();
        // Stop the worker if the caller gives up on this future
        let guard = cancel.clone().drop_guard();

        let (event, outcome) = tokio::task::spawn_blocking(move || {
            let outcome = pow::mine_with_cancel(&mut event, target, &cancel);
            (event, outcome)
        })
        .await
        .map_err(|e| Error::InvalidEvent(format!("mining task failed: {}", e)))?;
        guard.disarm();

        match outcome? {
            MineOutcome::Mined(report) => {
                debug!(nonce = report.nonce, attempts = report.attempts, "mined");
                Ok(event)
            }
            MineOutcome::Cancelled { .. } => Err(Error::Cancelled),
        }
    }

    /// Send an encrypted message to a recipient
    ///
    /// The recipient may be given as hex or npub. The sent message is added
    /// to the conversation cache right away.
    pub async fn send_encrypted_message(&self, recipient: &str, content: &str) -> Result<Event> {
        let recipient = parse_public_key(recipient)?;
        let recipient_hex = hex::encode(recipient.serialize());

        let key = crypto::derive_shared_key(self.keys.secret_key(), &recipient);
        let payload = crypto::encrypt(content, &key)?;

        let event = self
            .publish_draft(
                kind::ENCRYPTED_DIRECT_MESSAGE,
                vec![Tag::pubkey(recipient_hex.clone())],
                payload,
                Some(self.config.difficulty.private),
            )
            .await?;

        self.caches.conversations.insert(
            &recipient_hex,
            DirectMessage {
                id: event.id.clone(),
                sender: event.pubkey.clone(),
                content: content.to_string(),
                created_at: event.created_at,
                is_mine: true,
            },
        );

        Ok(event)
    }

    /// Publish a kind-1 note with extra tags
    pub async fn publish_text_note(&self, content: &str, tags: Vec<Tag>) -> Result<Event> {
        self.publish_draft(
            kind::TEXT_NOTE,
            tags,
            content.to_string(),
            self.config.note_difficulty,
        )
        .await
    }

    /// Publish our profile and remember it locally
    pub async fn publish_metadata(&self, profile: &Profile) -> Result<Event> {
        let content = serde_json::to_string(profile)?;
        let event = self
            .publish_draft(kind::METADATA, Vec::new(), content, None)
            .await?;
        self.caches
            .profiles
            .upsert(&event.pubkey, event.created_at, profile.clone());
        Ok(event)
    }

    pub async fn reply_post(&self, parent_id: &str, parent_author: &str, content: &str) -> Result<Event> {
        let tags = vec![Tag::reply(parent_id), Tag::pubkey(parent_author)];
        self.publish_text_note(content, tags).await
    }

    /// Quote another note (`q` tag) and notify its author
    pub async fn quote_post(&self, content: &str, quoted_id: &str, author: &str) -> Result<Event> {
        let relay_url = self.relay_url().unwrap_or_default();
        let tags = vec![Tag::quote(quoted_id, relay_url), Tag::pubkey(author)];
        self.publish_draft(
            kind::TEXT_NOTE,
            tags,
            content.to_string(),
            Some(self.config.difficulty.public),
        )
        .await
    }

    /// Repost (kind 6) with the original event embedded as content
    pub async fn repost(&self, original: &Event) -> Result<Event> {
        let relay_url = self.relay_url().unwrap_or_default();
        let tags = vec![
            Tag::event_with_relay(original.id.clone(), relay_url),
            Tag::pubkey(original.pubkey.clone()),
        ];
        let content = serde_json::to_string(original)?;
        self.publish_draft(kind::REPOST, tags, content, Some(self.config.difficulty.public))
            .await
    }

    /// Request deletion of our own events
    pub async fn delete_events(&self, ids: &[String], reason: &str) -> Result<Event> {
        let tags = ids.iter().map(|id| Tag::event(id.clone())).collect();
        self.publish_draft(kind::DELETION, tags, reason.to_string(), None)
            .await
    }

    pub async fn delete_event(&self, id: &str, reason: &str) -> Result<Event> {
        self.delete_events(&[id.to_string()], reason).await
    }

    /// Like a post, or retract our earlier like.
    ///
    /// Not atomic against the relay: two concurrent toggles on the same
    /// post can both publish.
    pub async fn toggle_like(&self, post_id: &str, author: &str) -> Result<LikeOutcome> {
        if let Some(reaction_id) = self.caches.likes.reaction_id(post_id) {
            self.publish_draft(
                kind::DELETION,
                vec![Tag::event(reaction_id)],
                "unlike".to_string(),
                None,
            )
            .await?;
            self.caches.likes.clear(post_id);
            return Ok(LikeOutcome::Unliked);
        }

        let event = self
            .publish_draft(
                kind::REACTION,
                vec![Tag::event(post_id), Tag::pubkey(author)],
                "+".to_string(),
                None,
            )
            .await?;
        self.caches.likes.set_liked(post_id, &event.id);
        Ok(LikeOutcome::Liked(event.id))
    }

    pub fn is_post_liked(&self, post_id: &str) -> bool {
        self.caches.likes.is_liked(post_id)
    }

    async fn latest_contact_list(&self, pubkey: &str) -> Result<Option<Event>> {
        // No limit: a forged newest entry must not hide the real one
        let filter = Filter::new().kind(kind::CONTACTS).author(pubkey);
        let events = self.query_within(filter, self.config.query_timeout).await?;
        Ok(events
            .into_iter()
            .filter(|e| e.kind == kind::CONTACTS && e.pubkey == pubkey)
            .max_by_key(|e| e.created_at))
    }

    /// Publish a new contact list that replaces `previous`.
    ///
    /// The new list is stamped at least one second after the old one, so
    /// it is never a same-second duplicate and always sorts as the latest.
    async fn replace_contact_list(
        &self,
        tags: Vec<Tag>,
        content: String,
        previous: Option<u64>,
    ) -> Result<Event> {
        let relay = self.relay()?;
        let mut event = Event::unsigned(self.keys.public_key_hex(), kind::CONTACTS, tags, content)?;
        if let Some(previous) = previous {
            if event.created_at <= previous {
                event.created_at = previous.saturating_add(1);
                event.refresh_id()?;
            }
        }
        let event = self.seal(event, None).await?;
        self.publish_event(relay.as_ref(), &event).await?;
        Ok(event)
    }

    /// Add `pubkey` to our contact list.
    ///
    /// Reads the latest list, appends, and publishes a new version. Other
    /// tags and the content are carried over. Concurrent edits from this or
    /// another session can overwrite each other.
    pub async fn follow(&self, pubkey: &str) -> Result<FollowOutcome> {
        let target = hex::encode(parse_public_key(pubkey)?.serialize());
        let current = self.latest_contact_list(&self.keys.public_key_hex()).await?;

        let (mut tags, content, previous) = match current {
            Some(event) => (event.tags, event.content, Some(event.created_at)),
            None => (Vec::new(), String::new(), None),
        };
        if tags
            .iter()
            .any(|t| t.name() == PUBKEY_TAG && t.value() == Some(target.as_str()))
        {
            return Ok(FollowOutcome::AlreadyFollowing);
        }

        tags.push(Tag::pubkey(target.clone()));
        self.replace_contact_list(tags, content, previous).await?;
        info!(pubkey = %target, "followed");
        Ok(FollowOutcome::Followed)
    }

    /// Remove `pubkey` from our contact list, keeping everything else
    pub async fn unfollow(&self, pubkey: &str) -> Result<FollowOutcome> {
        let target = hex::encode(parse_public_key(pubkey)?.serialize());
        let Some(current) = self.latest_contact_list(&self.keys.public_key_hex()).await? else {
            return Ok(FollowOutcome::NotFollowing);
        };

        let before = current.tags.len();
        let tags: Vec<Tag> = current
            .tags
            .into_iter()
            .filter(|t| !(t.name() == PUBKEY_TAG && t.value() == Some(target.as_str())))
            .collect();
        if tags.len() == before {
            return Ok(FollowOutcome::NotFollowing);
        }

        self.replace_contact_list(tags, current.content, Some(current.created_at))
            .await?;
        info!(pubkey = %target, "unfollowed");
        Ok(FollowOutcome::Unfollowed)
    }

    /// Pubkeys in the latest contact list of `pubkey`
    pub async fn following(&self, pubkey: &str) -> Result<Vec<String>> {
        let list = self.latest_contact_list(pubkey).await?;
        Ok(list
            .map(|e| e.pubkey_tags().map(str::to_string).collect())
            .unwrap_or_default())
    }

    /// Authors of contact lists that include `pubkey`, first 100 distinct
    pub async fn followers(&self, pubkey: &str) -> Result<Vec<String>> {
        let filter = Filter::new()
            .kind(kind::CONTACTS)
            .pubkey(pubkey)
            .limit(FOLLOWERS_LIMIT);
        let events = self.query(filter).await?;

        let mut seen = HashSet::new();
        Ok(events
            .into_iter()
            .filter(|e| seen.insert(e.pubkey.clone()))
            .map(|e| e.pubkey)
            .collect())
    }

    /// Get followed users with their profiles
    pub async fn followed_users(&self, pubkey: &str) -> Result<Vec<FollowedUser>> {
        let following = self.following(pubkey).await?;

        // Fetch profiles in parallel
        let profile_futures: Vec<_> = following
            .iter()
            .map(|pubkey| async move { (pubkey, self.fetch_profile(pubkey).await) })
            .collect();
        let results = join_all(profile_futures).await;

        Ok(results
            .into_iter()
            .map(|(pubkey, profile)| {
                let profile = profile.ok().flatten();
                FollowedUser {
                    pubkey: pubkey.clone(),
                    name: profile.as_ref().and_then(|p| p.name.clone()),
                    picture: profile.and_then(|p| p.picture),
                }
            })
            .collect())
    }

    /// Profile from the cache, without touching the relay
    pub fn profile(&self, pubkey: &str) -> Option<Profile> {
        self.caches.profiles.get(pubkey)
    }

    /// Fetch the newest profile from the relay and cache it
    pub async fn fetch_profile(&self, pubkey: &str) -> Result<Option<Profile>> {
        let filter = Filter::new().kind(kind::METADATA).author(pubkey);
        let events = self.query_within(filter, self.config.profile_timeout).await?;

        for event in events.iter().filter(|e| e.pubkey == pubkey) {
            if let Some(profile) = Profile::from_event(event) {
                self.caches
                    .profiles
                    .upsert(&event.pubkey, event.created_at, profile);
            }
        }
        Ok(self.caches.profiles.get(pubkey))
    }

    /// Get the user's own profile
    pub async fn own_profile(&self) -> Result<Option<Profile>> {
        self.fetch_profile(&self.keys.public_key_hex()).await
    }

    async fn query(&self, filter: Filter) -> Result<Vec<Event>> {
        self.query_within(filter, self.config.query_timeout).await
    }

    /// One-shot query that keeps only verifiable events, newest first
    async fn query_within(&self, filter: Filter, timeout: Duration) -> Result<Vec<Event>> {
        let relay = self.relay()?;
        let mut events = relay.query_sync(filter, timeout).await?;
        events.retain(|e| {
            let valid = e.is_valid();
            if !valid {
                debug!(id = %e.id, "skipping invalid event in query result");
            }
            valid
        });
        // Newest first
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(events)
    }

    fn enrich(&self, events: Vec<Event>) -> Vec<FeedItem> {
        events
            .into_iter()
            .map(|e| {
                let author = self.caches.profiles.get(&e.pubkey);
                FeedItem::new(e, author.as_ref())
            })
            .collect()
    }

    /// Notes referencing `root_id`, oldest first
    pub async fn post_thread(&self, root_id: &str) -> Result<Vec<ThreadEvent>> {
        let filter = Filter::new()
            .kind(kind::TEXT_NOTE)
            .event(root_id)
            .limit(THREAD_LIMIT);
        let mut events = self.query(filter).await?;
        events.reverse();
        Ok(events.into_iter().map(ThreadEvent::from_event).collect())
    }

    /// Notes that mention us, newest first
    pub async fn notifications(&self, limit: Option<usize>) -> Result<Vec<ThreadEvent>> {
        let filter = Filter::new()
            .kind(kind::TEXT_NOTE)
            .pubkey(self.keys.public_key_hex())
            .limit(limit.unwrap_or(self.config.feed_limit));
        let events = self.query(filter).await?;
        Ok(events.into_iter().map(ThreadEvent::from_event).collect())
    }

    /// Notes and reposts by `pubkey`
    pub async fn user_feed(&self, pubkey: &str, limit: usize) -> Result<Vec<FeedItem>> {
        let filter = Filter::new()
            .kinds([kind::TEXT_NOTE, kind::REPOST])
            .author(pubkey)
            .limit(limit);
        let events = self.query(filter).await?;
        Ok(self.enrich(events))
    }

    // Over-fetch so client-side filtering still fills the page
    async fn user_notes_where(
        &self,
        pubkey: &str,
        limit: usize,
        keep: impl Fn(&Event) -> bool,
    ) -> Result<Vec<FeedItem>> {
        let filter = Filter::new()
            .kind(kind::TEXT_NOTE)
            .author(pubkey)
            .limit(limit.saturating_mul(2));
        let mut events = self.query(filter).await?;
        events.retain(|e| keep(e));
        events.truncate(limit);
        Ok(self.enrich(events))
    }

    /// Top-level notes only
    pub async fn user_posts(&self, pubkey: &str, limit: usize) -> Result<Vec<FeedItem>> {
        self.user_notes_where(pubkey, limit, |e| !is_reply(e)).await
    }

    pub async fn user_replies(&self, pubkey: &str, limit: usize) -> Result<Vec<FeedItem>> {
        self.user_notes_where(pubkey, limit, is_reply).await
    }

    /// Notes linking images or video
    pub async fn user_media(&self, pubkey: &str, limit: usize) -> Result<Vec<FeedItem>> {
        self.user_notes_where(pubkey, limit, |e| has_media(&e.content))
            .await
    }

    pub async fn user_reposts(&self, pubkey: &str, limit: usize) -> Result<Vec<FeedItem>> {
        let filter = Filter::new().kind(kind::REPOST).author(pubkey).limit(limit);
        let events = self.query(filter).await?;
        Ok(self.enrich(events))
    }

    pub async fn user_highlights(&self, pubkey: &str, limit: usize) -> Result<Vec<Event>> {
        let filter = Filter::new().kind(kind::HIGHLIGHT).author(pubkey).limit(limit);
        self.query(filter).await
    }

    pub async fn single_event(&self, id: &str) -> Result<Option<Event>> {
        let filter = Filter::new().id(id).limit(1);
        Ok(self.query(filter).await?.into_iter().next())
    }

    /// Count `+` reactions to a post.
    ///
    /// Best effort: whatever arrives before the stats deadline is counted.
    /// Finding our own like also primes the like cache.
    pub async fn post_stats(&self, post_id: &str) -> Result<PostStats> {
        let filter = Filter::new().kind(kind::REACTION).event(post_id);
        let events = self.query_within(filter, self.config.stats_timeout).await?;

        let me = self.keys.public_key_hex();
        let mut stats = PostStats::default();
        for event in events.iter().filter(|e| e.content == "+") {
            stats.likes += 1;
            if event.pubkey == me {
                stats.liked_by_me = true;
                if !self.caches.likes.is_liked(post_id) {
                    self.caches.likes.set_liked(post_id, &event.id);
                }
            }
        }
        Ok(stats)
    }

    fn dispatcher(&self) -> InboxDispatcher {
        InboxDispatcher::new(self.keys.clone(), self.caches.clone())
    }

    /// Fetch direct messages sent to and by us and decrypt them into the
    /// conversation cache
    pub async fn sync_direct_messages(&self, limit: usize) -> Result<SyncReport> {
        let me = self.keys.public_key_hex();
        let received = Filter::new()
            .kind(kind::ENCRYPTED_DIRECT_MESSAGE)
            .pubkey(me.clone())
            .limit(limit);
        let sent = Filter::new()
            .kind(kind::ENCRYPTED_DIRECT_MESSAGE)
            .author(me)
            .limit(limit);

        let (received, sent) = tokio::try_join!(self.query(received), self.query(sent))?;

        let mut seen = HashSet::new();
        let dispatcher = self.dispatcher();
        let mut report = SyncReport::default();

        for event in received.into_iter().chain(sent) {
            if !seen.insert(event.id.clone()) {
                continue;
            }
            report.fetched += 1;

            let event_id = event.id.clone();
            let cached_before = self.is_cached(&event);
            match dispatcher.open_direct_message(event) {
                InboxItem::Direct { partner, .. } => {
                    report.decrypted += 1;
                    if !cached_before && self.caches.conversations.contains(&partner, &event_id) {
                        report.inserted += 1;
                    }
                }
                _ => report.failed += 1,
            }
        }

        info!(
            fetched = report.fetched,
            decrypted = report.decrypted,
            failed = report.failed,
            "direct messages synced"
        );
        Ok(report)
    }

    fn is_cached(&self, event: &Event) -> bool {
        let me = self.keys.public_key_hex();
        let partner = if event.pubkey == me {
            event.pubkey_tags().next().unwrap_or_default().to_string()
        } else {
            event.pubkey.clone()
        };
        self.caches.conversations.contains(&partner, &event.id)
    }

    /// Conversations ordered by most recent message
    pub fn conversations(&self) -> Vec<ConversationSummary> {
        self.caches.conversations.summaries(&self.caches.profiles)
    }

    /// Cached transcript with `partner` (hex or npub), oldest first
    pub fn chat_messages(&self, partner: &str) -> Result<Vec<DirectMessage>> {
        let partner = hex::encode(parse_public_key(partner)?.serialize());
        Ok(self.caches.conversations.messages(&partner))
    }

    /// Open the standing subscription and start delivering inbox items.
    ///
    /// Covers direct messages addressed to us, plus recent profiles, notes
    /// and reposts.
    pub async fn start_listening(&self) -> Result<Inbox> {
        let relay = self.relay()?;
        let filters = vec![
            Filter::new()
                .kind(kind::ENCRYPTED_DIRECT_MESSAGE)
                .pubkey(self.keys.public_key_hex()),
            Filter::new()
                .kinds([kind::METADATA, kind::TEXT_NOTE, kind::REPOST])
                .limit(self.config.feed_limit),
        ];
        let subscription = relay.subscribe(filters).await?;
        info!(subscription = subscription.id(), relay = relay.url(), "listening");

        Ok(Inbox::spawn(
            subscription,
            self.dispatcher(),
            self.config.inbox_capacity,
            self.cancel.child_token(),
        ))
    }

    /// Stop background work and disconnect
    pub async fn close(&self) -> Result<()> {
        self.cancel.cancel();
        let relay = self.relay.write().take();
        if let Some(relay) = relay {
            relay.close().await?;
            info!(relay = relay.url(), "disconnected");
        }
        Ok(())
    }
}
