//! NIP-44 (version 2) key agreement and authenticated encryption.
//!
//! ## Features
//!
//! - ECDH over secp256k1 feeding HKDF-SHA256 (`nip44-v2` salt)
//! - ChaCha20 encryption with HMAC-SHA256 over nonce and ciphertext
//! - Power-of-two-ish padding so message length leaks little
//! - Base64 payloads: `0x02 || nonce(32) || ciphertext || mac(32)`

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bitcoin::secp256k1::{ecdh, Parity, SecretKey, XOnlyPublicKey};
use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::ChaCha20;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

use crate::error::CryptoError;

const VERSION: u8 = 2;
const SALT: &[u8] = b"nip44-v2";

const NONCE_LEN: usize = 32;
const MAC_LEN: usize = 32;

const MIN_PLAINTEXT_LEN: usize = 1;
const MAX_PLAINTEXT_LEN: usize = 65535;

const MIN_PAYLOAD_LEN: usize = 132;
const MAX_PAYLOAD_LEN: usize = 87472;
const MIN_DECODED_LEN: usize = 99;
const MAX_DECODED_LEN: usize = 65603;

type HmacSha256 = Hmac<Sha256>;

/// Symmetric key shared by two parties. Wiped on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct ConversationKey([u8; 32]);

impl ConversationKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Drop for ConversationKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ConversationKey([redacted])")
    }
}

/// Derive the conversation key between a local secret and a remote public key.
///
/// Symmetric: `derive_shared_key(a, B) == derive_shared_key(b, A)`.
pub fn derive_shared_key(local: &SecretKey, remote: &XOnlyPublicKey) -> ConversationKey {
    // x-only keys are lifted to the even-y point
    let point = remote.public_key(Parity::Even);
    let mut shared = ecdh::shared_secret_point(&point, local);
    let (prk, _) = Hkdf::<Sha256>::extract(Some(SALT), &shared[..32]);
    shared.zeroize();

    let mut key = [0u8; 32];
    key.copy_from_slice(&prk);
    ConversationKey(key)
}

/// Padded length for a plaintext of `unpadded_len` bytes
pub fn calc_padded_len(unpadded_len: usize) -> usize {
    if unpadded_len <= 32 {
        return 32;
    }
    let next_power = 1usize << (usize::BITS - (unpadded_len - 1).leading_zeros());
    let chunk = if next_power <= 256 { 32 } else { next_power / 8 };
    chunk * ((unpadded_len - 1) / chunk + 1)
}

/// Encrypt with a fresh random nonce
pub fn encrypt(plaintext: &str, key: &ConversationKey) -> Result<String, CryptoError> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    encrypt_with_nonce(plaintext, key, &nonce)
}

/// Encrypt with a caller-chosen nonce. Never reuse a nonce under one key.
pub fn encrypt_with_nonce(
    plaintext: &str,
    key: &ConversationKey,
    nonce: &[u8; NONCE_LEN],
) -> Result<String, CryptoError> {
    let keys = message_keys(key, nonce)?;

    let mut buffer = pad(plaintext.as_bytes())?;
    chacha(&keys).apply_keystream(&mut buffer);
    let mac = hmac_for(&keys)?
        .chain_update(nonce)
        .chain_update(&buffer)
        .finalize()
        .into_bytes();

    let mut payload = Vec::with_capacity(1 + NONCE_LEN + buffer.len() + MAC_LEN);
    payload.push(VERSION);
    payload.extend_from_slice(nonce);
    payload.extend_from_slice(&buffer);
    payload.extend_from_slice(&mac);

    Ok(BASE64.encode(payload))
}

/// Decrypt a payload. The MAC is checked before anything is decrypted.
pub fn decrypt(payload: &str, key: &ConversationKey) -> Result<String, CryptoError> {
    if payload.is_empty() {
        return Err(CryptoError::InvalidPayload("empty payload".to_string()));
    }
    if payload.starts_with('#') {
        return Err(CryptoError::UnsupportedVersion);
    }
    if !(MIN_PAYLOAD_LEN..=MAX_PAYLOAD_LEN).contains(&payload.len()) {
        return Err(CryptoError::InvalidPayload(format!(
            "invalid payload length: {}",
            payload.len()
        )));
    }

    let data = BASE64
        .decode(payload)
        .map_err(|e| CryptoError::InvalidPayload(format!("invalid base64: {}", e)))?;
    if !(MIN_DECODED_LEN..=MAX_DECODED_LEN).contains(&data.len()) {
        return Err(CryptoError::InvalidPayload(format!(
            "invalid data length: {}",
            data.len()
        )));
    }
    if data[0] != VERSION {
        return Err(CryptoError::UnsupportedVersion);
    }

    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&data[1..1 + NONCE_LEN]);
    let (ciphertext, mac) = data[1 + NONCE_LEN..].split_at(data.len() - 1 - NONCE_LEN - MAC_LEN);

    let keys = message_keys(key, &nonce)?;
    hmac_for(&keys)?
        .chain_update(nonce)
        .chain_update(ciphertext)
        .verify_slice(mac)
        .map_err(|_| CryptoError::AuthenticationFailure)?;

    let mut buffer = Zeroizing::new(ciphertext.to_vec());
    chacha(&keys).apply_keystream(&mut buffer);
    unpad(&buffer)
}

/// Encrypt the same plaintext separately for each recipient key
pub fn encrypt_for_many<'a, I>(plaintext: &str, keys: I) -> Result<Vec<String>, CryptoError>
where
    I: IntoIterator<Item = &'a ConversationKey>,
{
    keys.into_iter().map(|key| encrypt(plaintext, key)).collect()
}

/// chacha key (32) || chacha nonce (12) || hmac key (32)
fn message_keys(
    key: &ConversationKey,
    nonce: &[u8; NONCE_LEN],
) -> Result<Zeroizing<[u8; 76]>, CryptoError> {
    let hk = Hkdf::<Sha256>::from_prk(key.as_bytes())
        .map_err(|_| CryptoError::InvalidKey("conversation key too short".to_string()))?;
    let mut okm = Zeroizing::new([0u8; 76]);
    hk.expand(nonce, &mut okm[..])
        .map_err(|_| CryptoError::InvalidKey("key expansion failed".to_string()))?;
    Ok(okm)
}

fn chacha(keys: &[u8; 76]) -> ChaCha20 {
    ChaCha20::new(keys[0..32].into(), keys[32..44].into())
}

fn hmac_for(keys: &[u8; 76]) -> Result<HmacSha256, CryptoError> {
    <HmacSha256 as Mac>::new_from_slice(&keys[44..76])
        .map_err(|_| CryptoError::InvalidKey("invalid hmac key".to_string()))
}

fn pad(plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let len = plaintext.len();
    if !(MIN_PLAINTEXT_LEN..=MAX_PLAINTEXT_LEN).contains(&len) {
        return Err(CryptoError::InvalidPlaintextLength(len));
    }

    let mut padded = Vec::with_capacity(2 + calc_padded_len(len));
    padded.extend_from_slice(&(len as u16).to_be_bytes());
    padded.extend_from_slice(plaintext);
    padded.resize(2 + calc_padded_len(len), 0);
    Ok(padded)
}

fn unpad(padded: &[u8]) -> Result<String, CryptoError> {
    if padded.len() < 2 {
        return Err(CryptoError::InvalidPadding);
    }
    let len = u16::from_be_bytes([padded[0], padded[1]]) as usize;
    if len == 0 || 2 + len > padded.len() || padded.len() != 2 + calc_padded_len(len) {
        return Err(CryptoError::InvalidPadding);
    }

    String::from_utf8(padded[2..2 + len].to_vec()).map_err(|_| CryptoError::InvalidEncoding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padding_buckets() {
        let cases = [
            (1, 32),
            (16, 32),
            (32, 32),
            (33, 64),
            (37, 64),
            (45, 64),
            (49, 64),
            (64, 64),
            (65, 96),
            (100, 128),
            (111, 128),
            (200, 224),
            (250, 256),
            (320, 320),
            (383, 384),
            (384, 384),
            (400, 448),
            (500, 512),
            (512, 512),
            (515, 640),
            (700, 768),
            (800, 896),
            (900, 1024),
            (1020, 1024),
            (65536, 65536),
        ];
        for (len, expected) in cases {
            assert_eq!(calc_padded_len(len), expected, "len {}", len);
        }
    }

    #[test]
    fn pad_rejects_bad_lengths() {
        assert_eq!(pad(b""), Err(CryptoError::InvalidPlaintextLength(0)));
        assert_eq!(
            pad(&vec![b'a'; 65536]),
            Err(CryptoError::InvalidPlaintextLength(65536))
        );
        assert_eq!(pad(b"a").unwrap().len(), 34);
    }

    #[test]
    fn unpad_checks_declared_length() {
        let mut padded = pad(b"hello").unwrap();
        assert_eq!(unpad(&padded).unwrap(), "hello");

        padded[1] = 0;
        assert_eq!(unpad(&padded), Err(CryptoError::InvalidPadding));
        padded[1] = 40;
        assert_eq!(unpad(&padded), Err(CryptoError::InvalidPadding));
    }
}
