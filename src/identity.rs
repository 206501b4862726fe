//! Single-identity persistence.
//!
//! The identity file is JSON holding the keypair in both hex and bech32
//! form. It lives at `~/.powchat/identity.json` unless configured otherwise
//! and is written owner-only.

use std::fmt;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::keys::Keys;

const DEFAULT_DIR: &str = ".powchat";
const DEFAULT_FILE: &str = "identity.json";

/// The local user's keypair with its human-readable encodings
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub private_key: String,
    pub public_key: String,
    pub nsec: String,
    pub npub: String,
}

impl Identity {
    /// Create a brand new random identity
    pub fn generate() -> Result<Self> {
        Self::from_keys(&Keys::generate())
    }

    pub fn from_keys(keys: &Keys) -> Result<Self> {
        Ok(Self {
            private_key: keys.secret_key_hex(),
            public_key: keys.public_key_hex(),
            nsec: keys.nsec()?,
            npub: keys.npub()?,
        })
    }

    /// Rebuild the signing keys, checking that the stored public key really
    /// belongs to the stored private key
    pub fn keys(&self) -> Result<Keys> {
        let keys = Keys::parse(&self.private_key)?;
        if keys.public_key_hex() != self.public_key.to_lowercase() {
            return Err(Error::InvalidKey(
                "stored public key does not match private key".to_string(),
            ));
        }
        Ok(keys)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("public_key", &self.public_key)
            .field("npub", &self.npub)
            .finish_non_exhaustive()
    }
}

/// File-backed store for exactly one identity
#[derive(Debug, Clone)]
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.powchat/identity.json`
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("could not determine home directory".to_string()))?;
        Ok(home.join(DEFAULT_DIR).join(DEFAULT_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the identity, failing with [`Error::IdentityNotFound`] if there is none
    pub fn load(&self) -> Result<Identity> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::IdentityNotFound(self.path.clone()))
            }
            Err(e) => return Err(e.into()),
        };

        let identity: Identity = serde_json::from_str(&data)?;
        // Reject files whose keys disagree
        identity.keys()?;
        Ok(identity)
    }

    /// Write the identity, creating the directory if needed
    pub fn save(&self, identity: &Identity) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            if !dir.exists() {
                fs::create_dir_all(dir)?;
                restrict_permissions(dir, 0o700)?;
            }
        }

        let data = serde_json::to_string_pretty(identity)?;

        // Stage owner-only, then rename over the old file
        let staging = self.staging_path();
        if let Err(e) = fs::remove_file(&staging) {
            if e.kind() != ErrorKind::NotFound {
                return Err(e.into());
            }
        }
        let written = write_private(&staging, data.as_bytes())
            .and_then(|()| fs::rename(&staging, &self.path));
        if let Err(e) = written {
            let _ = fs::remove_file(&staging);
            return Err(e.into());
        }

        Ok(())
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| DEFAULT_FILE.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Load the identity, or generate and save a new one.
    ///
    /// Returns the identity and whether it was just created.
    pub fn ensure(&self) -> Result<(Identity, bool)> {
        match self.load() {
            Ok(identity) => Ok((identity, false)),
            Err(Error::IdentityNotFound(_)) => {
                let identity = Identity::generate()?;
                self.save(&identity)?;
                info!(path = %self.path.display(), npub = %identity.npub, "created new identity");
                Ok((identity, true))
            }
            Err(e) => Err(e),
        }
    }
}

fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = open_private(path)?;
    file.write_all(data)?;
    file.sync_all()?;
    restrict_permissions(path, 0o600)
}

/// Create a new file that is owner-only from the start
#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;

    fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
}

#[cfg(unix)]
fn restrict_permissions(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}
