//! The signed, content-addressed event record.

use std::time::{SystemTime, UNIX_EPOCH};

use bitcoin::secp256k1::{schnorr, Message, XOnlyPublicKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::keys::{secp, Keys};
use crate::pow;
use crate::tag::{Tag, NONCE_TAG, PUBKEY_TAG};

/// Event kinds used by the client
pub mod kind {
    pub const METADATA: u16 = 0;
    pub const TEXT_NOTE: u16 = 1;
    pub const CONTACTS: u16 = 3;
    pub const ENCRYPTED_DIRECT_MESSAGE: u16 = 4;
    pub const DELETION: u16 = 5;
    pub const REPOST: u16 = 6;
    pub const REACTION: u16 = 7;
    pub const HIGHLIGHT: u16 = 9802;
}

/// Current unix time in seconds
pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub pubkey: String,
    pub created_at: u64,
    pub kind: u16,
    pub tags: Vec<Tag>,
    pub content: String,
    pub sig: String,
}

impl Event {
    /// Build an unsigned event stamped with the current time and a fresh id
    pub fn unsigned(
        pubkey: impl Into<String>,
        kind: u16,
        tags: Vec<Tag>,
        content: impl Into<String>,
    ) -> Result<Self> {
        let mut event = Self {
            id: String::new(),
            pubkey: pubkey.into(),
            created_at: now(),
            kind,
            tags,
            content: content.into(),
            sig: String::new(),
        };
        event.refresh_id()?;
        Ok(event)
    }

    /// `[0, pubkey, created_at, kind, tags, content]` as compact JSON
    pub fn canonical_serialize(&self) -> Result<String> {
        Ok(serde_json::to_string(&(
            0,
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        ))?)
    }

    pub(crate) fn id_digest(&self) -> Result<[u8; 32]> {
        let canonical = self.canonical_serialize()?;
        Ok(Sha256::digest(canonical.as_bytes()).into())
    }

    /// SHA-256 of the canonical serialization, hex encoded
    pub fn compute_id(&self) -> Result<String> {
        Ok(hex::encode(self.id_digest()?))
    }

    /// Recompute `id` after any field change. Clears a signature that no
    /// longer covers the event.
    pub fn refresh_id(&mut self) -> Result<()> {
        let id = self.compute_id()?;
        if id != self.id {
            self.id = id;
            self.sig.clear();
        }
        Ok(())
    }

    pub fn has_current_id(&self) -> bool {
        !self.id.is_empty() && self.compute_id().map(|id| id == self.id).unwrap_or(false)
    }

    /// Sign the current id. Fails rather than sign an id that no longer
    /// matches the event's fields.
    pub fn sign(&mut self, keys: &Keys) -> Result<()> {
        if self.pubkey != keys.public_key_hex() {
            return Err(Error::InvalidKey(format!(
                "event author {} does not match signing key",
                self.pubkey
            )));
        }
        if !self.has_current_id() {
            return Err(Error::StaleId(self.id.clone()));
        }

        let id_bytes = decode_fixed::<32>(&self.id, "id")?;
        let message = Message::from_digest(id_bytes);
        let mut aux = [0u8; 32];
        OsRng.fill_bytes(&mut aux);
        let sig = secp().sign_schnorr_with_aux_rand(&message, keys.keypair(), &aux);
        self.sig = hex::encode(sig.serialize());

        Ok(())
    }

    /// Check the id against the fields and the signature against the author.
    ///
    /// Returns `Ok(false)` on any mismatch; errors only when a field is not
    /// even structurally valid (bad hex or wrong length).
    pub fn verify(&self) -> Result<bool> {
        let id_bytes = decode_fixed::<32>(&self.id, "id")?;
        let pubkey_bytes = decode_fixed::<32>(&self.pubkey, "pubkey")?;
        let sig_bytes = decode_fixed::<64>(&self.sig, "sig")?;

        if self.id_digest()? != id_bytes {
            return Ok(false);
        }

        let pubkey = match XOnlyPublicKey::from_slice(&pubkey_bytes) {
            Ok(pubkey) => pubkey,
            Err(_) => return Ok(false),
        };
        let sig = match schnorr::Signature::from_slice(&sig_bytes) {
            Ok(sig) => sig,
            Err(_) => return Ok(false),
        };
        let message = Message::from_digest(id_bytes);

        Ok(secp().verify_schnorr(&sig, &message, &pubkey).is_ok())
    }

    /// `verify` collapsed to a bool: malformed events are simply invalid
    pub fn is_valid(&self) -> bool {
        self.verify().unwrap_or(false)
    }

    /// Values of every tag with the given name
    pub fn tag_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.tags
            .iter()
            .filter(move |t| t.name() == name)
            .filter_map(Tag::value)
    }

    pub fn first_tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .filter(|t| t.name() == name)
            .find_map(Tag::value)
    }

    /// Pubkeys referenced by `p` tags
    pub fn pubkey_tags(&self) -> impl Iterator<Item = &str> + '_ {
        self.tag_values(PUBKEY_TAG)
    }

    pub fn nonce_tag_index(&self) -> Option<usize> {
        self.tags.iter().position(|t| t.name() == NONCE_TAG)
    }

    /// Difficulty committed to in the nonce tag, if any
    pub fn committed_difficulty(&self) -> Option<u32> {
        self.tags.iter().find_map(|t| match t {
            Tag::Nonce { target, .. } => Some(*target),
            _ => None,
        })
    }

    /// Leading zero bits of the id
    pub fn pow_difficulty(&self) -> u32 {
        hex::decode(&self.id)
            .map(|bytes| pow::leading_zero_bits(&bytes))
            .unwrap_or(0)
    }
}

fn decode_fixed<const N: usize>(value: &str, field: &str) -> Result<[u8; N]> {
    let bytes = hex::decode(value)
        .map_err(|e| Error::InvalidEvent(format!("{} is not hex: {}", field, e)))?;
    bytes.try_into().map_err(|bytes: Vec<u8>| {
        Error::InvalidEvent(format!(
            "{} must be {} bytes, got {}",
            field,
            N,
            bytes.len()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::kind;

    #[test]
    fn canonical_form_is_array() {
        let event = Event {
            id: String::new(),
            pubkey: "ab".into(),
            created_at: 1,
            kind: kind::TEXT_NOTE,
            tags: vec![Tag::pubkey("cd")],
            content: "hi \"there\"".into(),
            sig: String::new(),
        };
        assert_eq!(
            event.canonical_serialize().unwrap(),
            r#"[0,"ab",1,1,[["p","cd"]],"hi \"there\""]"#
        );
    }

    #[test]
    fn refresh_clears_stale_signature() {
        let keys = Keys::generate();
        let mut event =
            Event::unsigned(keys.public_key_hex(), kind::TEXT_NOTE, vec![], "a").unwrap();
        event.sign(&keys).unwrap();
        assert!(!event.sig.is_empty());

        event.content.push('b');
        event.refresh_id().unwrap();
        assert!(event.sig.is_empty());
    }
}
