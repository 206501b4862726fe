use anyhow::Result;
use pow_messenger::ClientConfig;
use tempfile::TempDir;

// Changes the working directory, so it lives alone in this test binary
#[test]
fn test_from_env_reads_dotenv_in_working_directory() -> Result<()> {
    std::env::remove_var("POWCHAT_POW_PUBLIC");
    std::env::remove_var("POWCHAT_FEED_LIMIT");

    let dir = TempDir::new()?;
    std::fs::write(
        dir.path().join(".env"),
        "POWCHAT_POW_PUBLIC=7\nPOWCHAT_FEED_LIMIT=5\n",
    )?;
    std::env::set_current_dir(dir.path())?;

    let config = ClientConfig::from_env(None)?;
    assert_eq!(config.difficulty.public, 7);
    assert_eq!(config.feed_limit, 5);

    Ok(())
}
