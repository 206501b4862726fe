use anyhow::Result;
use pow_messenger::{ClientConfig, Error, Identity, IdentityStore, Keys, MessengerClient};
use tempfile::TempDir;

#[test]
fn test_ensure_creates_then_loads() -> Result<()> {
    let dir = TempDir::new()?;
    let store = IdentityStore::new(dir.path().join("nested").join("identity.json"));
    assert!(!store.exists());

    // First run generates and saves
    let (created, was_created) = store.ensure()?;
    assert!(was_created);
    assert!(store.exists());

    // Second run loads the same identity
    let (loaded, was_created) = store.ensure()?;
    assert!(!was_created);
    assert_eq!(loaded, created);

    let keys = loaded.keys()?;
    assert_eq!(keys.public_key_hex(), loaded.public_key);
    assert_eq!(keys.npub()?, loaded.npub);
    assert!(loaded.nsec.starts_with("nsec1"));

    Ok(())
}

#[test]
fn test_load_missing_identity() -> Result<()> {
    let dir = TempDir::new()?;
    let store = IdentityStore::new(dir.path().join("identity.json"));

    match store.load() {
        Err(Error::IdentityNotFound(path)) => assert_eq!(path, store.path()),
        other => panic!("expected IdentityNotFound, got {:?}", other.map(|i| i.npub)),
    }

    Ok(())
}

#[cfg(unix)]
#[test]
fn test_identity_file_is_owner_only() -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new()?;
    let store = IdentityStore::new(dir.path().join("keys").join("identity.json"));
    store.save(&Identity::generate()?)?;

    let file_mode = std::fs::metadata(store.path())?.permissions().mode() & 0o777;
    assert_eq!(file_mode, 0o600);

    let dir_mode = std::fs::metadata(dir.path().join("keys"))?.permissions().mode() & 0o777;
    assert_eq!(dir_mode, 0o700);

    Ok(())
}

#[cfg(unix)]
#[test]
fn test_overwrite_tightens_loose_permissions() -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new()?;
    let path = dir.path().join("identity.json");
    std::fs::write(&path, "{}")?;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644))?;

    let store = IdentityStore::new(path.clone());
    let identity = Identity::generate()?;
    store.save(&identity)?;

    assert_eq!(std::fs::metadata(&path)?.permissions().mode() & 0o777, 0o600);
    assert_eq!(store.load()?, identity);
    // Only the identity file is left behind
    assert_eq!(std::fs::read_dir(dir.path())?.count(), 1);

    Ok(())
}

#[test]
fn test_mismatched_keys_are_rejected() -> Result<()> {
    let dir = TempDir::new()?;
    let store = IdentityStore::new(dir.path().join("identity.json"));

    // Public key from a different keypair
    let mut identity = Identity::generate()?;
    identity.public_key = Keys::generate().public_key_hex();
    store.save(&identity)?;

    assert!(matches!(store.load(), Err(Error::InvalidKey(_))));
    // A corrupt identity is never silently replaced
    assert!(store.ensure().is_err());

    Ok(())
}

#[test]
fn test_garbage_file_is_an_error() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("identity.json");
    std::fs::write(&path, "not json")?;

    let store = IdentityStore::new(path);
    assert!(matches!(store.load(), Err(Error::Serialization(_))));

    Ok(())
}

#[test]
fn test_debug_output_hides_private_key() -> Result<()> {
    let identity = Identity::generate()?;
    let printed = format!("{:?}", identity);
    assert!(!printed.contains(&identity.private_key));
    assert!(!printed.contains(&identity.nsec));
    assert!(printed.contains(&identity.npub));
    Ok(())
}

#[test]
fn test_open_client_from_config() -> Result<()> {
    let dir = TempDir::new()?;
    let config = ClientConfig {
        identity_path: Some(dir.path().join("identity.json")),
        ..ClientConfig::default()
    };

    let (first, created) = MessengerClient::open(config.clone())?;
    assert!(created);
    let (second, created) = MessengerClient::open(config)?;
    assert!(!created);
    assert_eq!(first.public_key_string(), second.public_key_string());

    Ok(())
}
