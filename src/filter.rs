//! Subscription filters (NIP-01).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::event::Event;

/// Event filter as sent in `REQ`. Tag conditions use keys like `"#p"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u16>>,
    #[serde(flatten)]
    pub tags: BTreeMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.ids.get_or_insert_with(Vec::new).push(id.into());
        self
    }

    pub fn author(mut self, pubkey: impl Into<String>) -> Self {
        self.authors.get_or_insert_with(Vec::new).push(pubkey.into());
        self
    }

    pub fn authors<I, S>(mut self, pubkeys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authors
            .get_or_insert_with(Vec::new)
            .extend(pubkeys.into_iter().map(Into::into));
        self
    }

    pub fn kind(mut self, kind: u16) -> Self {
        self.kinds.get_or_insert_with(Vec::new).push(kind);
        self
    }

    pub fn kinds(mut self, kinds: impl IntoIterator<Item = u16>) -> Self {
        self.kinds.get_or_insert_with(Vec::new).extend(kinds);
        self
    }

    /// Require a tag `name` whose first value is `value`
    pub fn tag(mut self, name: char, value: impl Into<String>) -> Self {
        self.tags
            .entry(format!("#{}", name))
            .or_default()
            .push(value.into());
        self
    }

    /// `#p` condition
    pub fn pubkey(self, pubkey: impl Into<String>) -> Self {
        self.tag('p', pubkey)
    }

    /// `#e` condition
    pub fn event(self, id: impl Into<String>) -> Self {
        self.tag('e', id)
    }

    pub fn since(mut self, since: u64) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: u64) -> Self {
        self.until = Some(until);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `event` satisfies every condition. `limit` is a result-count
    /// hint and plays no part here.
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.iter().any(|id| *id == event.id) {
                return false;
            }
        }
        if let Some(authors) = &self.authors {
            if !authors.iter().any(|a| *a == event.pubkey) {
                return false;
            }
        }
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&event.kind) {
                return false;
            }
        }
        if self.since.is_some_and(|since| event.created_at < since) {
            return false;
        }
        if self.until.is_some_and(|until| event.created_at > until) {
            return false;
        }

        self.tags.iter().all(|(key, values)| {
            let name = key.trim_start_matches('#');
            event
                .tag_values(name)
                .any(|value| values.iter().any(|v| v == value))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::kind;
    use crate::tag::Tag;

    fn note(pubkey: &str, tags: Vec<Tag>) -> Event {
        Event {
            id: "11".repeat(32),
            pubkey: pubkey.to_string(),
            created_at: 100,
            kind: kind::TEXT_NOTE,
            tags,
            content: String::new(),
            sig: String::new(),
        }
    }

    #[test]
    fn serializes_tag_keys_inline() {
        let filter = Filter::new().kind(4).pubkey("abc").limit(5);
        let json = serde_json::to_value(&filter).unwrap();
        assert_eq!(json, serde_json::json!({"kinds": [4], "#p": ["abc"], "limit": 5}));

        let back: Filter = serde_json::from_value(json).unwrap();
        assert_eq!(back, filter);
    }

    #[test]
    fn matches_every_condition() {
        let event = note("alice", vec![Tag::pubkey("bob"), Tag::event("root")]);

        assert!(Filter::new().matches(&event));
        assert!(Filter::new().author("alice").kind(1).matches(&event));
        assert!(Filter::new().pubkey("bob").event("root").matches(&event));
        assert!(Filter::new().since(100).until(100).matches(&event));

        assert!(!Filter::new().author("carol").matches(&event));
        assert!(!Filter::new().kind(4).matches(&event));
        assert!(!Filter::new().pubkey("carol").matches(&event));
        assert!(!Filter::new().since(101).matches(&event));
    }
}
