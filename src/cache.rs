//! In-memory derived state owned by a session.
//!
//! Each cache sits behind its own reader/writer lock: UI reads are frequent,
//! writes come from inbox delivery and optimistic local updates. Nothing is
//! persisted.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::message::{ConversationSummary, DirectMessage, Profile};

/// Latest known profile per pubkey
#[derive(Debug, Default)]
pub struct ProfileCache {
    inner: RwLock<HashMap<String, (u64, Profile)>>,
}

impl ProfileCache {
    /// Store `profile` unless a newer one (by `created_at`) is already cached.
    /// Returns whether the cache changed.
    pub fn upsert(&self, pubkey: &str, created_at: u64, profile: Profile) -> bool {
        let mut profiles = self.inner.write();
        match profiles.get(pubkey) {
            Some((stored_at, _)) if *stored_at > created_at => false,
            _ => {
                profiles.insert(pubkey.to_string(), (created_at, profile));
                true
            }
        }
    }

    pub fn get(&self, pubkey: &str) -> Option<Profile> {
        self.inner.read().get(pubkey).map(|(_, p)| p.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

/// Decrypted transcripts keyed by conversation partner
#[derive(Debug, Default)]
pub struct ConversationCache {
    inner: RwLock<HashMap<String, Vec<DirectMessage>>>,
}

impl ConversationCache {
    /// Insert in time order; a message id already present is ignored.
    /// Returns whether the message was new.
    pub fn insert(&self, partner: &str, message: DirectMessage) -> bool {
        let mut conversations = self.inner.write();
        let messages = conversations.entry(partner.to_string()).or_default();
        if messages.iter().any(|m| m.id == message.id) {
            return false;
        }

        let at = messages.partition_point(|m| m.created_at <= message.created_at);
        messages.insert(at, message);
        true
    }

    /// Transcript with one partner, oldest first
    pub fn messages(&self, partner: &str) -> Vec<DirectMessage> {
        self.inner.read().get(partner).cloned().unwrap_or_default()
    }

    pub fn contains(&self, partner: &str, message_id: &str) -> bool {
        self.inner
            .read()
            .get(partner)
            .is_some_and(|messages| messages.iter().any(|m| m.id == message_id))
    }

    /// One summary per partner, most recent conversation first
    pub fn summaries(&self, profiles: &ProfileCache) -> Vec<ConversationSummary> {
        // Snapshot first so the profile lock is never taken under this one
        let latest: Vec<(String, DirectMessage, usize)> = self
            .inner
            .read()
            .iter()
            .filter_map(|(partner, messages)| {
                messages
                    .last()
                    .map(|last| (partner.clone(), last.clone(), messages.len()))
            })
            .collect();

        let mut summaries: Vec<ConversationSummary> = latest
            .into_iter()
            .map(|(partner, last, count)| {
                let profile = profiles.get(&partner);
                ConversationSummary {
                    partner_name: profile.as_ref().and_then(|p| p.name.clone()),
                    partner_picture: profile.and_then(|p| p.picture),
                    partner,
                    last_message: last.content,
                    last_at: last.created_at,
                    message_count: count,
                }
            })
            .collect();

        summaries.sort_by(|a, b| b.last_at.cmp(&a.last_at));
        summaries
    }
}

/// Which posts I have liked, and the reaction event that did it
#[derive(Debug, Default)]
pub struct LikeCache {
    inner: RwLock<HashMap<String, String>>,
}

impl LikeCache {
    pub fn set_liked(&self, post_id: &str, reaction_id: &str) {
        self.inner
            .write()
            .insert(post_id.to_string(), reaction_id.to_string());
    }

    /// Forget a like, returning the reaction id it had
    pub fn clear(&self, post_id: &str) -> Option<String> {
        self.inner.write().remove(post_id)
    }

    pub fn reaction_id(&self, post_id: &str) -> Option<String> {
        self.inner.read().get(post_id).cloned()
    }

    pub fn is_liked(&self, post_id: &str) -> bool {
        self.inner.read().contains_key(post_id)
    }
}

/// All caches of one session
#[derive(Debug, Default)]
pub struct SessionCaches {
    pub profiles: ProfileCache,
    pub conversations: ConversationCache,
    pub likes: LikeCache,
}
