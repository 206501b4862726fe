//! Secp256k1 keys for signing and key agreement.
//!
//! Keys can be generated, parsed from hex or `nsec`, or derived from a BIP-39
//! recovery phrase along the NIP-06 path `m/44'/1237'/0'/0/0`. Public keys are
//! x-only (32 bytes) and render as hex or `npub`.

use std::fmt;
use std::sync::OnceLock;

use bech32::{Bech32, Hrp};
use bip39::{Language, Mnemonic};
use bitcoin::bip32::{ChildNumber, DerivationPath, Xpriv};
use bitcoin::secp256k1::{All, Keypair, Secp256k1, SecretKey, XOnlyPublicKey};
use bitcoin::Network;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

use crate::error::{Error, Result};

/// Nostr coin type as registered in SLIP-0044
const NOSTR_COIN_TYPE: u32 = 1237;

const NSEC_HRP: &str = "nsec";
const NPUB_HRP: &str = "npub";

/// Shared secp256k1 context
pub(crate) fn secp() -> &'static Secp256k1<All> {
    static SECP: OnceLock<Secp256k1<All>> = OnceLock::new();
    SECP.get_or_init(Secp256k1::new)
}

/// A local keypair. The public key is always derived from the secret key.
#[derive(Clone)]
pub struct Keys {
    secret_key: SecretKey,
    keypair: Keypair,
    public_key: XOnlyPublicKey,
}

impl Keys {
    pub fn new(secret_key: SecretKey) -> Self {
        let keypair = Keypair::from_secret_key(secp(), &secret_key);
        let (public_key, _parity) = keypair.x_only_public_key();
        Self {
            secret_key,
            keypair,
            public_key,
        }
    }

    /// Generate a fresh random keypair
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        loop {
            OsRng.fill_bytes(&mut bytes);
            // Out-of-range scalars are astronomically rare; just draw again
            if let Ok(secret_key) = SecretKey::from_slice(&bytes) {
                bytes.zeroize();
                return Self::new(secret_key);
            }
        }
    }

    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        let secret_key = SecretKey::from_slice(bytes)
            .map_err(|e| Error::InvalidKey(format!("invalid secret key: {}", e)))?;
        Ok(Self::new(secret_key))
    }

    /// Parse a secret key given as 64 hex characters or as an `nsec` string
    pub fn parse(secret: &str) -> Result<Self> {
        let secret = secret.trim();
        if secret.starts_with(NSEC_HRP) {
            let mut bytes = decode_bech32(NSEC_HRP, secret)?;
            let keys = Self::from_secret_bytes(&bytes);
            bytes.zeroize();
            return keys;
        }

        let mut bytes =
            hex::decode(secret).map_err(|e| Error::InvalidKey(format!("invalid hex: {}", e)))?;
        let keys = Self::from_secret_bytes(&bytes);
        bytes.zeroize();
        keys
    }

    /// Derive keys from a 12 or 24 word BIP-39 recovery phrase
    ///
    /// # Parameters
    /// - `mnemonic_phrase`: The BIP39 mnemonic phrase
    /// - `passphrase`: Optional BIP39 passphrase (defaults to empty string)
    /// - `language`: Optional language for the mnemonic (defaults to English)
    pub fn from_mnemonic(
        mnemonic_phrase: &str,
        passphrase: Option<&str>,
        language: Option<Language>,
    ) -> Result<Self> {
        let lang = language.unwrap_or(Language::English);
        let pass = passphrase.unwrap_or("");

        let mnemonic = Mnemonic::parse_in(lang, mnemonic_phrase)
            .map_err(|e| Error::InvalidKey(format!("Invalid mnemonic phrase: {}", e)))?;
        let mut seed = mnemonic.to_seed(pass);
        let keys = Self::from_seed(&seed);
        seed.zeroize();
        keys
    }

    fn from_seed(seed: &[u8]) -> Result<Self> {
        let derivation_err = |e: bitcoin::bip32::Error| Error::InvalidKey(e.to_string());

        let master = Xpriv::new_master(Network::Bitcoin, seed).map_err(derivation_err)?;
        let path = DerivationPath::from(vec![
            ChildNumber::from_hardened_idx(44).map_err(derivation_err)?,
            ChildNumber::from_hardened_idx(NOSTR_COIN_TYPE).map_err(derivation_err)?,
            ChildNumber::from_hardened_idx(0).map_err(derivation_err)?,
            ChildNumber::from_normal_idx(0).map_err(derivation_err)?,
            ChildNumber::from_normal_idx(0).map_err(derivation_err)?,
        ]);
        let derived = master.derive_priv(secp(), &path).map_err(derivation_err)?;

        Ok(Self::new(derived.private_key))
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    pub fn public_key(&self) -> XOnlyPublicKey {
        self.public_key
    }

    /// Get the public key as lowercase hex
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key.serialize())
    }

    /// Get the secret key as lowercase hex
    pub fn secret_key_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    pub fn npub(&self) -> Result<String> {
        encode_npub(&self.public_key)
    }

    pub fn nsec(&self) -> Result<String> {
        let mut bytes = self.secret_key.secret_bytes();
        let encoded = encode_bech32(NSEC_HRP, &bytes);
        bytes.zeroize();
        encoded
    }
}

impl fmt::Debug for Keys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keys")
            .field("public_key", &self.public_key_hex())
            .field("secret_key", &"[redacted]")
            .finish()
    }
}

/// Parse a public key given as 64 hex characters or as an `npub` string
pub fn parse_public_key(input: &str) -> Result<XOnlyPublicKey> {
    let input = input.trim();
    if input.starts_with(NPUB_HRP) {
        return decode_npub(input);
    }

    let bytes = hex::decode(input).map_err(|e| Error::InvalidKey(format!("invalid hex: {}", e)))?;
    XOnlyPublicKey::from_slice(&bytes)
        .map_err(|e| Error::InvalidKey(format!("invalid public key: {}", e)))
}

pub fn encode_npub(public_key: &XOnlyPublicKey) -> Result<String> {
    encode_bech32(NPUB_HRP, &public_key.serialize())
}

pub fn decode_npub(npub: &str) -> Result<XOnlyPublicKey> {
    let bytes = decode_bech32(NPUB_HRP, npub)?;
    XOnlyPublicKey::from_slice(&bytes)
        .map_err(|e| Error::InvalidKey(format!("invalid public key: {}", e)))
}

fn encode_bech32(hrp: &str, data: &[u8]) -> Result<String> {
    let hrp = Hrp::parse(hrp).map_err(|e| Error::InvalidKey(e.to_string()))?;
    bech32::encode::<Bech32>(hrp, data).map_err(|e| Error::InvalidKey(e.to_string()))
}

fn decode_bech32(expected_hrp: &str, encoded: &str) -> Result<Vec<u8>> {
    let expected = Hrp::parse(expected_hrp).map_err(|e| Error::InvalidKey(e.to_string()))?;
    let (hrp, data) = bech32::decode(encoded)
        .map_err(|e| Error::InvalidKey(format!("invalid bech32: {}", e)))?;

    if hrp != expected {
        return Err(Error::InvalidKey(format!(
            "expected {} prefix, got {}",
            expected_hrp, hrp
        )));
    }
    if data.len() != 32 {
        return Err(Error::InvalidKey(format!(
            "expected 32 bytes, got {}",
            data.len()
        )));
    }

    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_secret_encodings() {
        let keys = Keys::generate();
        let from_hex = Keys::parse(&keys.secret_key_hex()).unwrap();
        let from_nsec = Keys::parse(&keys.nsec().unwrap()).unwrap();

        assert_eq!(from_hex.public_key(), keys.public_key());
        assert_eq!(from_nsec.public_key(), keys.public_key());
    }

    #[test]
    fn rejects_wrong_hrp() {
        let keys = Keys::generate();
        let npub = keys.npub().unwrap();
        assert!(Keys::parse(&npub).is_err());
        assert!(decode_bech32(NSEC_HRP, &npub).is_err());
    }

    #[test]
    fn debug_hides_secret() {
        let keys = Keys::generate();
        let rendered = format!("{:?}", keys);
        assert!(!rendered.contains(&keys.secret_key_hex()));
        assert!(rendered.contains(&keys.public_key_hex()));
    }
}
