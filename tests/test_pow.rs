use std::time::Duration;

use anyhow::Result;
use pow_messenger::event::kind;
use pow_messenger::pow::{self, check_difficulty, leading_zero_bits};
use pow_messenger::{DifficultyTable, Error, Event, Keys, MessageClass, MineOutcome, Tag};
use tokio_util::sync::CancellationToken;

fn draft(keys: &Keys, tags: Vec<Tag>) -> Result<Event> {
    Ok(Event::unsigned(
        keys.public_key_hex(),
        kind::ENCRYPTED_DIRECT_MESSAGE,
        tags,
        "payload",
    )?)
}

#[test]
fn test_mined_ids_meet_difficulty() -> Result<()> {
    let keys = Keys::generate();

    for difficulty in [0, 1, 4, 8, 10, 12, 16] {
        let mut event = draft(&keys, Vec::new())?;
        let report = pow::mine(&mut event, difficulty)?;

        assert!(leading_zero_bits(&hex::decode(&event.id)?) >= difficulty);
        assert!(check_difficulty(&event.id, difficulty));
        assert_eq!(event.pow_difficulty(), report.difficulty);
        assert!(report.difficulty >= difficulty);
        assert!(report.attempts >= 1);

        // The id matches the final field values, so signing works
        assert!(event.has_current_id());
        assert_eq!(event.committed_difficulty(), Some(difficulty));
        event.sign(&keys)?;
        assert!(event.verify()?);
    }

    Ok(())
}

#[test]
fn test_mining_preserves_other_tags() -> Result<()> {
    let keys = Keys::generate();
    let recipient = Tag::pubkey(Keys::generate().public_key_hex());
    let root = Tag::Event {
        id: "aa".repeat(32),
        relay: Some("wss://relay.example".into()),
        marker: Some("root".into()),
    };
    let opaque = Tag::custom(["client", "pow-messenger", "extra"]);

    let mut event = draft(&keys, vec![recipient.clone(), root.clone(), opaque.clone()])?;
    pow::mine(&mut event, 8)?;

    assert_eq!(event.tags.len(), 4);
    assert_eq!(event.tags[0], recipient);
    assert_eq!(event.tags[1], root);
    assert_eq!(event.tags[2], opaque);
    assert!(matches!(event.tags[3], Tag::Nonce { target: 8, .. }));

    Ok(())
}

#[test]
fn test_existing_nonce_is_overwritten_in_place() -> Result<()> {
    let keys = Keys::generate();
    let recipient = Tag::pubkey(Keys::generate().public_key_hex());
    let mut event = draft(&keys, vec![Tag::nonce(999, 3), recipient.clone()])?;

    pow::mine(&mut event, 6)?;
    assert_eq!(event.tags.len(), 2);
    assert!(matches!(event.tags[0], Tag::Nonce { target: 6, .. }));
    assert_eq!(event.tags[1], recipient);

    // Mining a second time still leaves a single nonce tag
    pow::mine(&mut event, 7)?;
    assert_eq!(event.tags.len(), 2);
    assert_eq!(event.committed_difficulty(), Some(7));

    Ok(())
}

#[test]
fn test_difficulty_eight_is_cheap() -> Result<()> {
    let keys = Keys::generate();
    let mut event = draft(&keys, Vec::new())?;

    let report = pow::mine(&mut event, 8)?;
    // Median is around 256 attempts; this bound is far in the tail
    assert!(report.attempts < 20_000, "took {} attempts", report.attempts);

    Ok(())
}

#[test]
fn test_mining_clears_previous_signature() -> Result<()> {
    let keys = Keys::generate();
    let mut event = draft(&keys, Vec::new())?;
    event.sign(&keys)?;
    assert!(!event.sig.is_empty());

    pow::mine(&mut event, 2)?;
    assert!(event.sig.is_empty());

    Ok(())
}

#[test]
fn test_cancelled_before_start() -> Result<()> {
    let keys = Keys::generate();
    let mut event = draft(&keys, Vec::new())?;
    let original_id = event.id.clone();

    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = pow::mine_with_cancel(&mut event, 8, &cancel)?;
    assert_eq!(outcome, MineOutcome::Cancelled { attempts: 0 });
    // No id was accepted, so the event cannot be signed
    assert_eq!(event.id, original_id);
    assert!(matches!(event.sign(&keys), Err(Error::StaleId(_))));

    Ok(())
}

#[tokio::test]
async fn test_cancel_stops_unbounded_search() -> Result<()> {
    let keys = Keys::generate();
    let mut event = draft(&keys, Vec::new())?;

    let cancel = CancellationToken::new();
    let worker_cancel = cancel.clone();
    // 200 bits will never be found
    let handle = tokio::task::spawn_blocking(move || pow::mine_with_cancel(&mut event, 200, &worker_cancel));

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    let outcome = tokio::time::timeout(Duration::from_secs(5), handle).await???;
    assert!(matches!(outcome, MineOutcome::Cancelled { .. }));

    Ok(())
}

#[test]
fn test_difficulty_recommendations() -> Result<()> {
    let table = DifficultyTable::default();
    assert_eq!(table.recommend(MessageClass::Private), 12);
    assert_eq!(table.recommend(MessageClass::Group), 16);
    assert_eq!(table.recommend(MessageClass::Public), 20);
    assert_eq!(table.recommend_for("public"), 20);
    assert_eq!(table.recommend_for("unknown"), 12);

    let tuned = DifficultyTable {
        private: 4,
        group: 5,
        public: 6,
    };
    assert_eq!(tuned.recommend(MessageClass::Group), 5);

    Ok(())
}
