//! Proof-of-work mining (NIP-13).
//!
//! Mining rewrites the event's nonce tag and timestamp until the id has at
//! least the requested number of leading zero bits. The search is unbounded
//! and CPU bound, so callers that need responsiveness run it on a blocking
//! worker and hand it a [`CancellationToken`].

use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::event::{now, Event};
use crate::tag::Tag;

const PROGRESS_INTERVAL: u64 = 10_000;

/// What kind of message is being stamped; picks a default difficulty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageClass {
    Private,
    Group,
    Public,
}

impl FromStr for MessageClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "private" => Ok(MessageClass::Private),
            "group" => Ok(MessageClass::Group),
            "public" => Ok(MessageClass::Public),
            other => Err(Error::Config(format!("unknown message class: {}", other))),
        }
    }
}

/// Recommended difficulty per message class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DifficultyTable {
    pub private: u32,
    pub group: u32,
    pub public: u32,
}

impl Default for DifficultyTable {
    fn default() -> Self {
        Self {
            private: 12,
            group: 16,
            public: 20,
        }
    }
}

impl DifficultyTable {
    pub fn recommend(&self, class: MessageClass) -> u32 {
        match class {
            MessageClass::Private => self.private,
            MessageClass::Group => self.group,
            MessageClass::Public => self.public,
        }
    }

    /// Lookup by label; unknown labels get the private-message difficulty
    pub fn recommend_for(&self, label: &str) -> u32 {
        label
            .parse()
            .map(|class| self.recommend(class))
            .unwrap_or(self.private)
    }
}

/// Result of a successful search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiningReport {
    pub nonce: u64,
    pub attempts: u64,
    pub difficulty: u32,
    pub duration: Duration,
}

/// Mining either finds a nonce or is cancelled; it has no failure path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MineOutcome {
    Mined(MiningReport),
    Cancelled { attempts: u64 },
}

/// Count leading zero bits, most significant byte first
pub fn leading_zero_bits(bytes: &[u8]) -> u32 {
    let mut count = 0;
    for &byte in bytes {
        if byte == 0 {
            count += 8;
        } else {
            count += byte.leading_zeros();
            break;
        }
    }
    count
}

/// Whether a hex id meets the target difficulty
pub fn check_difficulty(id: &str, target: u32) -> bool {
    hex::decode(id)
        .map(|bytes| leading_zero_bits(&bytes) >= target)
        .unwrap_or(false)
}

/// Mine without any way to stop; only sensible for low difficulties
pub fn mine(event: &mut Event, target: u32) -> Result<MiningReport> {
    match mine_with_cancel(event, target, &CancellationToken::new())? {
        MineOutcome::Mined(report) => Ok(report),
        MineOutcome::Cancelled { .. } => Err(Error::Cancelled),
    }
}

/// Mine `event` in place until its id has `target` leading zero bits.
///
/// The nonce tag is overwritten where it already sits (or appended), every
/// other tag is left untouched, and `created_at` is refreshed on each
/// attempt. The refreshed timestamp never goes below the one the event came
/// in with. The cancellation token is checked before every attempt. The
/// event is left unsigned.
pub fn mine_with_cancel(
    event: &mut Event,
    target: u32,
    cancel: &CancellationToken,
) -> Result<MineOutcome> {
    let slot = match event.nonce_tag_index() {
        Some(index) => index,
        None => {
            event.tags.push(Tag::nonce(0, target));
            event.tags.len() - 1
        }
    };
    event.sig.clear();
    let floor = event.created_at;

    let started = Instant::now();
    let mut nonce: u64 = 0;
    let mut attempts: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            debug!(attempts, target, "mining cancelled");
            return Ok(MineOutcome::Cancelled { attempts });
        }

        event.tags[slot] = Tag::nonce(nonce, target);
        event.created_at = now().max(floor);
        let digest = event.id_digest()?;
        attempts += 1;

        let difficulty = leading_zero_bits(&digest);
        if difficulty >= target {
            event.id = hex::encode(digest);
            let duration = started.elapsed();
            info!(nonce, attempts, difficulty, ?duration, "mined event");
            return Ok(MineOutcome::Mined(MiningReport {
                nonce,
                attempts,
                difficulty,
                duration,
            }));
        }

        if attempts % PROGRESS_INTERVAL == 0 {
            debug!(attempts, target, elapsed = ?started.elapsed(), "mining in progress");
        }
        nonce = nonce.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_bits_across_bytes() {
        assert_eq!(leading_zero_bits(&[0xff]), 0);
        assert_eq!(leading_zero_bits(&[0x00, 0x80]), 8);
        assert_eq!(leading_zero_bits(&[0x00, 0x00, 0x0f]), 20);
        assert_eq!(leading_zero_bits(&[0x01]), 7);
        assert_eq!(leading_zero_bits(&[0x00; 4]), 32);
    }

    #[test]
    fn table_lookup() {
        let table = DifficultyTable::default();
        assert_eq!(table.recommend_for("private"), 12);
        assert_eq!(table.recommend_for("group"), 16);
        assert_eq!(table.recommend_for("public"), 20);
        assert_eq!(table.recommend_for("something-else"), 12);
    }

    #[test]
    fn cancelled_before_first_attempt() {
        let mut event = Event::unsigned("00".repeat(32), 1, vec![], "x").unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = mine_with_cancel(&mut event, 8, &cancel).unwrap();
        assert_eq!(outcome, MineOutcome::Cancelled { attempts: 0 });
    }

    #[test]
    fn timestamp_never_moves_backwards() {
        let mut event = Event::unsigned("00".repeat(32), 3, vec![], "").unwrap();
        let ahead = now() + 3600;
        event.created_at = ahead;
        event.refresh_id().unwrap();

        mine(&mut event, 4).unwrap();
        assert_eq!(event.created_at, ahead);
        assert!(event.has_current_id());
    }
}
