use anyhow::Result;
use bip39::Mnemonic;
use pow_messenger::{Error, Keys, Language, MessengerClient};

const ABANDON: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

#[test]
fn test_recovery_phrase_nip06_vectors() -> Result<()> {
    // 12 words
    let client = MessengerClient::from_recovery_phrase(
        "leader monkey parrot ring guide accident before fence cannon height naive bean",
        None,
        None,
    )?;
    assert_eq!(
        client.keys().secret_key_hex(),
        "7f7ff03d123792d6ac594bfa67bf6d0c0ab55b6b1fdb6249303fe861f1ccba9a"
    );
    assert_eq!(
        client.public_key_string(),
        "17162c921dc4d2518f9a101db33695df1afb56ab82f5ff3e5da6eec3ca5cd917"
    );
    assert_eq!(
        client.keys().nsec()?,
        "nsec10allq0gjx7fddtzef0ax00mdps9t2kmtrldkyjfs8l5xruwvh2dq0lhhkp"
    );
    assert_eq!(
        client.npub()?,
        "npub1zutzeysacnf9rru6zqwmxd54mud0k44tst6l70ja5mhv8jjumytsd2x7nu"
    );

    // 24 words
    let client = MessengerClient::from_recovery_phrase(
        "what bleak badge arrange retreat wolf trade produce cricket blur garlic valid proud rude strong choose busy staff weather area salt hollow arm fade",
        None,
        None,
    )?;
    assert_eq!(
        client.keys().secret_key_hex(),
        "c15d739894c81a2fcfd3a2df85a0d2c0dbc47a280d092799f144d73d7ae78add"
    );
    assert_eq!(
        client.npub()?,
        "npub16sdj9zv4f8sl85e45vgq9n7nsgt5qphpvmf7vk8r5hhvmdjxx4es8rq74h"
    );

    Ok(())
}

#[test]
fn test_recovery_phrase_is_deterministic() -> Result<()> {
    let first = Keys::from_mnemonic(ABANDON, None, None)?;
    let second = Keys::from_mnemonic(ABANDON, None, Some(Language::English))?;
    assert_eq!(first.public_key_hex(), second.public_key_hex());

    let other = Keys::from_mnemonic("zoo zoo zoo zoo zoo zoo zoo zoo zoo zoo zoo wrong", None, None)?;
    assert_ne!(first.public_key_hex(), other.public_key_hex());

    // A phrase built from raw entropy restores the same way
    let generated = Mnemonic::from_entropy(&[7u8; 32])?.to_string();
    assert_eq!(generated.split_whitespace().count(), 24);
    assert_eq!(
        Keys::from_mnemonic(&generated, None, None)?.public_key_hex(),
        Keys::from_mnemonic(&generated, None, None)?.public_key_hex()
    );

    Ok(())
}

#[test]
fn test_passphrase_selects_a_different_account() -> Result<()> {
    let plain = Keys::from_mnemonic(ABANDON, None, None)?;
    let empty = Keys::from_mnemonic(ABANDON, Some(""), None)?;
    let guarded = Keys::from_mnemonic(ABANDON, Some("correct horse"), None)?;

    // No passphrase and an empty one are the same seed
    assert_eq!(plain.public_key_hex(), empty.public_key_hex());
    assert_ne!(plain.public_key_hex(), guarded.public_key_hex());
    assert_eq!(
        guarded.public_key_hex(),
        Keys::from_mnemonic(ABANDON, Some("correct horse"), None)?.public_key_hex()
    );

    Ok(())
}

#[test]
fn test_invalid_phrases_are_rejected() {
    let cases = [
        "",
        "invalid mnemonic phrase here",
        "abandon abandon abandon",
        // 11 words
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon",
        // checksum mismatch
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon",
        // wordlists are lowercase
        "ABANDON ABANDON ABANDON ABANDON ABANDON ABANDON ABANDON ABANDON ABANDON ABANDON ABANDON ABOUT",
    ];

    for phrase in cases {
        assert!(
            matches!(
                MessengerClient::from_recovery_phrase(phrase, None, None),
                Err(Error::InvalidKey(_))
            ),
            "accepted invalid phrase: '{}'",
            phrase
        );
    }
}

#[test]
fn test_restored_keys_round_trip_through_nsec() -> Result<()> {
    let keys = Keys::from_mnemonic(ABANDON, None, None)?;

    let from_nsec = Keys::parse(&keys.nsec()?)?;
    let from_hex = Keys::parse(&keys.secret_key_hex())?;
    assert_eq!(from_nsec.public_key_hex(), keys.public_key_hex());
    assert_eq!(from_hex.public_key_hex(), keys.public_key_hex());

    Ok(())
}
