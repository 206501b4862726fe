use serde::{Deserialize, Serialize};

use crate::error::CryptoError;
use crate::event::{kind, Event};
use crate::tag::{Tag, MARKER_REPLY, MARKER_ROOT};

const MEDIA_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".mp4", ".mov", ".webp"];

/// Profile metadata carried in kind-0 content
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub about: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

impl Profile {
    /// Parse a kind-0 event; `None` for other kinds or unparseable content
    pub fn from_event(event: &Event) -> Option<Self> {
        if event.kind != kind::METADATA {
            return None;
        }
        serde_json::from_str(&event.content).ok()
    }
}

/// A decrypted direct message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectMessage {
    pub id: String,
    pub sender: String,
    pub content: String,
    pub created_at: u64,
    pub is_mine: bool,
}

/// One row of the conversation list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub partner: String,
    pub partner_name: Option<String>,
    pub partner_picture: Option<String>,
    pub last_message: String,
    pub last_at: u64,
    pub message_count: usize,
}

/// A note or repost together with what the cache knows about its author
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    pub event: Event,
    pub author_name: Option<String>,
    pub author_picture: Option<String>,
    /// For reposts: the original event embedded in the content
    pub reposted: Option<Box<Event>>,
}

impl FeedItem {
    pub fn new(event: Event, author: Option<&Profile>) -> Self {
        let reposted = (event.kind == kind::REPOST)
            .then(|| serde_json::from_str::<Event>(&event.content).ok())
            .flatten()
            .map(Box::new);

        Self {
            author_name: author.and_then(|p| p.name.clone()),
            author_picture: author.and_then(|p| p.picture.clone()),
            reposted,
            event,
        }
    }

    /// Who reposted, if this item is a repost
    pub fn reposted_by(&self) -> Option<&str> {
        self.reposted.as_ref().map(|_| self.event.pubkey.as_str())
    }
}

/// What the inbox pipeline hands to the consumer
#[derive(Debug, Clone, PartialEq)]
pub enum InboxItem {
    /// Kind 1 or 6
    Note(FeedItem),
    /// Kind 4 that decrypted successfully
    Direct {
        partner: String,
        message: DirectMessage,
    },
    /// Kind 4 that could not be decrypted
    DecryptFailed {
        event_id: String,
        sender: String,
        error: CryptoError,
    },
}

/// A note positioned in a thread (NIP-10)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadEvent {
    pub event: Event,
    pub root_id: Option<String>,
    pub reply_to_id: Option<String>,
}

impl ThreadEvent {
    /// Marked `e` tags win. Without markers the first `e` tag is the root
    /// and the last one, when there are several, the direct parent.
    pub fn from_event(event: Event) -> Self {
        let mut root_id = None;
        let mut reply_to_id = None;
        let mut referenced = Vec::new();

        for tag in &event.tags {
            if let Tag::Event { id, marker, .. } = tag {
                referenced.push(id.clone());
                match marker.as_deref() {
                    Some(MARKER_ROOT) => root_id = Some(id.clone()),
                    Some(MARKER_REPLY) => reply_to_id = Some(id.clone()),
                    _ => {}
                }
            }
        }

        if root_id.is_none() {
            root_id = referenced.first().cloned();
        }
        if reply_to_id.is_none() && referenced.len() > 1 {
            reply_to_id = referenced.last().cloned();
        }

        Self {
            event,
            root_id,
            reply_to_id,
        }
    }
}

/// Reaction counts for one post
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostStats {
    pub likes: usize,
    pub liked_by_me: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LikeOutcome {
    /// Published a `+` reaction with this id
    Liked(String),
    /// Published a deletion of the earlier reaction
    Unliked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    Followed,
    AlreadyFollowing,
    Unfollowed,
    NotFollowing,
}

/// Counts from a direct-message history sync
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub fetched: usize,
    pub decrypted: usize,
    pub failed: usize,
    pub inserted: usize,
}

/// Any `e` tag makes a note a reply or thread participant
pub fn is_reply(event: &Event) -> bool {
    event.tags.iter().any(|t| matches!(t, Tag::Event { .. }))
}

pub fn has_media(content: &str) -> bool {
    let content = content.to_lowercase();
    MEDIA_EXTENSIONS.iter().any(|ext| content.contains(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(tags: Vec<Tag>) -> Event {
        Event {
            id: String::new(),
            pubkey: "aa".into(),
            created_at: 0,
            kind: kind::TEXT_NOTE,
            tags,
            content: String::new(),
            sig: String::new(),
        }
    }

    #[test]
    fn thread_markers() {
        let te = ThreadEvent::from_event(note(vec![
            Tag::Event {
                id: "root".into(),
                relay: Some(String::new()),
                marker: Some("root".into()),
            },
            Tag::reply("parent"),
        ]));
        assert_eq!(te.root_id.as_deref(), Some("root"));
        assert_eq!(te.reply_to_id.as_deref(), Some("parent"));

        // Reply marker only: root falls back to the first e tag
        let te = ThreadEvent::from_event(note(vec![Tag::reply("parent")]));
        assert_eq!(te.root_id.as_deref(), Some("parent"));
        assert_eq!(te.reply_to_id.as_deref(), Some("parent"));
    }

    #[test]
    fn thread_positional_fallback() {
        let te = ThreadEvent::from_event(note(vec![Tag::event("a")]));
        assert_eq!(te.root_id.as_deref(), Some("a"));
        assert_eq!(te.reply_to_id, None);

        let te = ThreadEvent::from_event(note(vec![
            Tag::event("a"),
            Tag::event("b"),
            Tag::event("c"),
        ]));
        assert_eq!(te.root_id.as_deref(), Some("a"));
        assert_eq!(te.reply_to_id.as_deref(), Some("c"));

        let te = ThreadEvent::from_event(note(vec![Tag::pubkey("x")]));
        assert_eq!(te.root_id, None);
    }

    #[test]
    fn media_detection() {
        assert!(has_media("look https://x.io/cat.JPG"));
        assert!(has_media("clip.mp4"));
        assert!(!has_media("just words"));
    }
}
