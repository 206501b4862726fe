//! Event tags.
//!
//! On the wire a tag is just an array of strings. Known shapes get their own
//! variant; anything else is kept verbatim in [`Tag::Custom`]. A known variant
//! is only chosen when writing it back out reproduces the input exactly, so
//! parsing never changes an event's id.

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// `["e", <event id>, <relay>?, <marker>?]`
pub const EVENT_TAG: &str = "e";
/// `["p", <pubkey>, <relay>?, <petname>?]`
pub const PUBKEY_TAG: &str = "p";
/// `["q", <event id>, <relay>?]`
pub const QUOTE_TAG: &str = "q";
/// `["nonce", <nonce>, <target difficulty>]`
pub const NONCE_TAG: &str = "nonce";

pub const MARKER_ROOT: &str = "root";
pub const MARKER_REPLY: &str = "reply";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tag {
    Event {
        id: String,
        relay: Option<String>,
        marker: Option<String>,
    },
    PubKey {
        pubkey: String,
        relay: Option<String>,
        petname: Option<String>,
    },
    Quote {
        id: String,
        relay: Option<String>,
    },
    Nonce {
        nonce: u64,
        target: u32,
    },
    Custom(Vec<String>),
}

impl Tag {
    pub fn event(id: impl Into<String>) -> Self {
        Tag::Event {
            id: id.into(),
            relay: None,
            marker: None,
        }
    }

    /// `["e", id, "", "reply"]`
    pub fn reply(id: impl Into<String>) -> Self {
        Tag::Event {
            id: id.into(),
            relay: Some(String::new()),
            marker: Some(MARKER_REPLY.to_string()),
        }
    }

    /// `["e", id, relay]`
    pub fn event_with_relay(id: impl Into<String>, relay: impl Into<String>) -> Self {
        Tag::Event {
            id: id.into(),
            relay: Some(relay.into()),
            marker: None,
        }
    }

    pub fn pubkey(pubkey: impl Into<String>) -> Self {
        Tag::PubKey {
            pubkey: pubkey.into(),
            relay: None,
            petname: None,
        }
    }

    pub fn quote(id: impl Into<String>, relay: impl Into<String>) -> Self {
        Tag::Quote {
            id: id.into(),
            relay: Some(relay.into()),
        }
    }

    pub fn nonce(nonce: u64, target: u32) -> Self {
        Tag::Nonce { nonce, target }
    }

    pub fn custom<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Tag::from(parts.into_iter().map(Into::into).collect::<Vec<String>>())
    }

    /// Tag name, e.g. `"p"`
    pub fn name(&self) -> &str {
        match self {
            Tag::Event { .. } => EVENT_TAG,
            Tag::PubKey { .. } => PUBKEY_TAG,
            Tag::Quote { .. } => QUOTE_TAG,
            Tag::Nonce { .. } => NONCE_TAG,
            Tag::Custom(parts) => parts.first().map(String::as_str).unwrap_or(""),
        }
    }

    /// First value after the name, if any
    pub fn value(&self) -> Option<&str> {
        match self {
            Tag::Event { id, .. } | Tag::Quote { id, .. } => Some(id),
            Tag::PubKey { pubkey, .. } => Some(pubkey),
            // Nonce values are numbers; callers wanting the string form use to_vec
            Tag::Nonce { .. } => None,
            Tag::Custom(parts) => parts.get(1).map(String::as_str),
        }
    }

    pub fn marker(&self) -> Option<&str> {
        match self {
            Tag::Event { marker, .. } => marker.as_deref(),
            _ => None,
        }
    }

    /// The tag as it appears on the wire
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Tag::Event { id, relay, marker } => {
                let mut parts = vec![EVENT_TAG.to_string(), id.clone()];
                push_optional_pair(&mut parts, relay, marker);
                parts
            }
            Tag::PubKey {
                pubkey,
                relay,
                petname,
            } => {
                let mut parts = vec![PUBKEY_TAG.to_string(), pubkey.clone()];
                push_optional_pair(&mut parts, relay, petname);
                parts
            }
            Tag::Quote { id, relay } => {
                let mut parts = vec![QUOTE_TAG.to_string(), id.clone()];
                if let Some(relay) = relay {
                    parts.push(relay.clone());
                }
                parts
            }
            Tag::Nonce { nonce, target } => vec![
                NONCE_TAG.to_string(),
                nonce.to_string(),
                target.to_string(),
            ],
            Tag::Custom(parts) => parts.clone(),
        }
    }

    fn parse_known(parts: &[String]) -> Option<Tag> {
        let name = parts.first()?;
        let at = |i: usize| parts.get(i).cloned();

        let tag = match (name.as_str(), parts.len()) {
            (EVENT_TAG, 2..=4) => Tag::Event {
                id: parts[1].clone(),
                relay: at(2),
                marker: at(3),
            },
            (PUBKEY_TAG, 2..=4) => Tag::PubKey {
                pubkey: parts[1].clone(),
                relay: at(2),
                petname: at(3),
            },
            (QUOTE_TAG, 2..=3) => Tag::Quote {
                id: parts[1].clone(),
                relay: at(2),
            },
            (NONCE_TAG, 3) => Tag::Nonce {
                nonce: parts[1].parse().ok()?,
                target: parts[2].parse().ok()?,
            },
            _ => return None,
        };

        // "007" parses as 7 but would serialize as "7"
        (tag.to_vec() == parts).then_some(tag)
    }
}

fn push_optional_pair(parts: &mut Vec<String>, first: &Option<String>, second: &Option<String>) {
    if first.is_some() || second.is_some() {
        parts.push(first.clone().unwrap_or_default());
    }
    if let Some(second) = second {
        parts.push(second.clone());
    }
}

impl From<Vec<String>> for Tag {
    fn from(parts: Vec<String>) -> Self {
        Tag::parse_known(&parts).unwrap_or(Tag::Custom(parts))
    }
}

impl From<&Tag> for Vec<String> {
    fn from(tag: &Tag) -> Self {
        tag.to_vec()
    }
}

impl Serialize for Tag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_vec().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Tag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<String>::deserialize(deserializer).map(Tag::from)
    }
}
