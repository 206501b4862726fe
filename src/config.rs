//! Client configuration.
//!
//! Defaults match the reference relay etiquette (10 s publish, 5 s queries,
//! difficulty 12/16/20). Any value can be overridden with a `POWCHAT_*`
//! environment variable, optionally loaded from a `.env` file.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};
use crate::pow::DifficultyTable;
use crate::relay::SEED_RELAYS;

/// Runtime settings for a [`MessengerClient`](crate::MessengerClient)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Identity file; `None` means `~/.powchat/identity.json`
    pub identity_path: Option<PathBuf>,
    /// Relays tried in order by `connect_to_default`
    pub seed_relays: Vec<String>,
    pub connect_timeout: Duration,
    pub publish_timeout: Duration,
    pub query_timeout: Duration,
    /// Reaction counting is best effort and uses a shorter deadline
    pub stats_timeout: Duration,
    pub profile_timeout: Duration,
    pub difficulty: DifficultyTable,
    /// Difficulty for plain notes, replies and reactions; `None` skips mining
    pub note_difficulty: Option<u32>,
    /// Capacity of the inbox delivery channel
    pub inbox_capacity: usize,
    /// Default result count for feed-style queries
    pub feed_limit: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            identity_path: None,
            seed_relays: SEED_RELAYS.iter().map(|s| s.to_string()).collect(),
            connect_timeout: Duration::from_secs(5),
            publish_timeout: Duration::from_secs(10),
            query_timeout: Duration::from_secs(5),
            stats_timeout: Duration::from_secs(3),
            profile_timeout: Duration::from_secs(10),
            difficulty: DifficultyTable::default(),
            note_difficulty: None,
            inbox_capacity: 256,
            feed_limit: 20,
        }
    }
}

impl ClientConfig {
    /// Load settings from the environment, reading `path` as a `.env` file
    /// first when given. Without a path, a `.env` in the working directory
    /// or one of its parents is read if there is one. Variables already set
    /// in the process win.
    pub fn from_env(path: Option<&str>) -> Result<Self> {
        match path {
            Some(path) => {
                dotenvy::from_filename(path)
                    .map_err(|e| Error::Config(format!("reading env file {}: {}", path, e)))?;
            }
            None => {
                if let Ok(found) = dotenvy::dotenv() {
                    debug!(path = %found.display(), "loaded env file");
                }
            }
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from any key/value source; unset or empty keys keep
    /// their defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(path) = get("POWCHAT_IDENTITY") {
            config.identity_path = Some(PathBuf::from(path));
        }
        if let Some(relays) = get("POWCHAT_RELAYS") {
            config.seed_relays = csv_strings(relays);
        }
        if let Some(secs) = get("POWCHAT_CONNECT_TIMEOUT_SECS") {
            config.connect_timeout = Duration::from_secs(parse("POWCHAT_CONNECT_TIMEOUT_SECS", &secs)?);
        }
        if let Some(secs) = get("POWCHAT_PUBLISH_TIMEOUT_SECS") {
            config.publish_timeout = Duration::from_secs(parse("POWCHAT_PUBLISH_TIMEOUT_SECS", &secs)?);
        }
        if let Some(secs) = get("POWCHAT_QUERY_TIMEOUT_SECS") {
            config.query_timeout = Duration::from_secs(parse("POWCHAT_QUERY_TIMEOUT_SECS", &secs)?);
        }
        if let Some(bits) = get("POWCHAT_POW_PRIVATE") {
            config.difficulty.private = parse("POWCHAT_POW_PRIVATE", &bits)?;
        }
        if let Some(bits) = get("POWCHAT_POW_GROUP") {
            config.difficulty.group = parse("POWCHAT_POW_GROUP", &bits)?;
        }
        if let Some(bits) = get("POWCHAT_POW_PUBLIC") {
            config.difficulty.public = parse("POWCHAT_POW_PUBLIC", &bits)?;
        }
        if let Some(bits) = get("POWCHAT_POW_NOTE") {
            config.note_difficulty = Some(parse("POWCHAT_POW_NOTE", &bits)?);
        }
        if let Some(capacity) = get("POWCHAT_INBOX_CAPACITY") {
            config.inbox_capacity = parse("POWCHAT_INBOX_CAPACITY", &capacity)?;
        }
        if let Some(limit) = get("POWCHAT_FEED_LIMIT") {
            config.feed_limit = parse("POWCHAT_FEED_LIMIT", &limit)?;
        }

        if config.inbox_capacity == 0 {
            return Err(Error::Config("POWCHAT_INBOX_CAPACITY must be positive".into()));
        }
        Ok(config)
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("{}={}: {}", key, value, e)))
}

/// Split a comma-separated string into trimmed string values.
pub fn csv_strings(input: impl AsRef<str>) -> Vec<String> {
    input
        .as_ref()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
