//! Concurrent access tests.
//!
//! Run on a multi-threaded runtime so contenders genuinely race on the
//! header CAS.

mod common;

use std::sync::Arc;

use anyhow::Result;
use casket_session::{LockId, ProviderSettings, RetryPolicy, SessionLookup};
use serde_json::json;

const CONTENDERS: usize = 16;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_exactly_one_contender_acquires() -> Result<()> {
    let (_cache, store) = common::memory_store(ProviderSettings::default());
    let store = Arc::new(store);
    store.create_uninitialized("S3", 20).await?;

    let mut handles = Vec::with_capacity(CONTENDERS);
    for _ in 0..CONTENDERS {
        let store = store.clone();
        handles.push(tokio::spawn(async move { store.get("S3", true).await }));
    }

    let mut acquired = Vec::new();
    let mut locked = Vec::new();
    for handle in handles {
        match handle.await?? {
            SessionLookup::Acquired { lock_id, .. } => acquired.push(lock_id),
            SessionLookup::Locked(info) => locked.push(info.lock_id),
            other => anyhow::bail!("unexpected lookup {other:?}"),
        }
    }

    assert_eq!(acquired.len(), 1, "exactly one contender should win");
    assert_eq!(locked.len(), CONTENDERS - 1);
    let winner = acquired[0];
    assert!(locked.iter().all(|id| *id == winner));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_losing_the_last_attempt_reports_the_lock() -> Result<()> {
    let settings =
        ProviderSettings::default().with_retry(RetryPolicy::default().with_max_attempts(1));
    let (_cache, store) = common::memory_store(settings);
    let store = Arc::new(store);

    for round in 0..200 {
        let id = format!("race-{round}");
        store.create_uninitialized(&id, 20).await?;

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let store = store.clone();
                let id = id.clone();
                tokio::spawn(async move { store.get(&id, true).await })
            })
            .collect();

        let mut acquired = 0;
        let mut locked = 0;
        for handle in handles {
            match handle.await?? {
                SessionLookup::Acquired { .. } => acquired += 1,
                SessionLookup::Locked(_) => locked += 1,
                other => anyhow::bail!("round {round}: unexpected lookup {other:?}"),
            }
        }
        assert_eq!((acquired, locked), (1, 1), "round {round}");
    }

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_serialized_increments_lose_no_updates() -> Result<()> {
    let (_cache, store) = common::memory_store(ProviderSettings::default());
    let store = Arc::new(store);
    store.create_uninitialized("counter", 20).await?;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            loop {
                match store.get("counter", true).await? {
                    SessionLookup::Acquired {
                        mut state, lock_id, ..
                    } => {
                        let n = state.items.get_as::<u64>("n").unwrap_or(0);
                        state.items.insert("n", json!(n + 1));
                        store.set_and_release("counter", &state, lock_id, false).await?;
                        return anyhow::Ok(());
                    }
                    SessionLookup::Locked(_) => tokio::task::yield_now().await,
                    other => anyhow::bail!("unexpected lookup {other:?}"),
                }
            }
        }));
    }
    for handle in handles {
        handle.await??;
    }

    let lookup = store.get("counter", false).await?;
    assert_eq!(lookup.state().unwrap().items.get_as::<u64>("n"), Some(8));
    assert!(!lookup.is_locked());

    Ok(())
}

#[tokio::test]
async fn test_foreign_release_leaves_lock_intact() -> Result<()> {
    let (cache, store) = common::memory_store(ProviderSettings::default());
    store.create_uninitialized("S4", 20).await?;
    let lock_id = common::acquire(&store, "S4").await?;
    let header_before = cache.raw("-/info-S4").await;

    store
        .release_exclusive("S4", LockId::new(lock_id.get() ^ 0xff))
        .await?;

    assert_eq!(cache.raw("-/info-S4").await, header_before);
    assert!(matches!(
        store.get("S4", true).await?,
        SessionLookup::Locked(info) if info.lock_id == lock_id
    ));

    Ok(())
}

#[tokio::test]
async fn test_shared_reader_sees_lock_and_data() -> Result<()> {
    let (_cache, store) = common::memory_store(ProviderSettings::default());
    let mut state = casket_session::SessionState::new(20);
    state.items.insert("user", json!("ada"));
    store.set_and_release("S5", &state, LockId::NONE, true).await?;

    let lock_id = common::acquire(&store, "S5").await?;
    match store.get("S5", false).await? {
        SessionLookup::Found { state: read, lock, .. } => {
            assert_eq!(read, state);
            assert_eq!(lock.map(|l| l.lock_id), Some(lock_id));
        }
        other => anyhow::bail!("expected Found, got {other:?}"),
    }

    Ok(())
}
