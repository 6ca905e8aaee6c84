//! Simulate command - drives session traffic through the store.
//!
//! Every session goes through one request cycle: create, contended
//! exclusive read, commit, shared read, expiry refresh and removal.

use std::sync::Arc;

use anyhow::{Result, bail};
use casket_session::{MemoryCache, SessionLookup, SessionStore};
use clap::Args;
use console::{Style, style};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use super::Context;

/// Arguments for the simulate command.
#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Number of sessions to run
    #[arg(short, long, default_value_t = 3)]
    pub sessions: usize,

    /// Concurrent requests racing for each session lock
    #[arg(long, default_value_t = 4)]
    pub contenders: usize,

    /// Session timeout in minutes
    #[arg(long, default_value_t = 20)]
    pub timeout: i32,

    /// Size of the payload written into each session, in bytes
    #[arg(long, default_value_t = 1024)]
    pub payload_bytes: usize,

    /// Keep sessions instead of removing them at the end
    #[arg(long)]
    pub keep: bool,
}

/// Outcome of one simulated session.
#[derive(Debug, Serialize)]
struct SessionReport {
    id: String,
    acquired: usize,
    locked: usize,
    raw_bytes: usize,
    stored_bytes: usize,
    removed: bool,
}

#[derive(Debug, Serialize)]
struct SimulateOutput {
    compression: String,
    exclusive_access: bool,
    sessions: Vec<SessionReport>,
}

/// Run the simulate command.
pub async fn run(args: SimulateArgs, ctx: &Context) -> Result<()> {
    if args.contenders == 0 {
        bail!("--contenders must be at least 1");
    }

    let settings = ctx.config.config.provider_settings()?;
    let compression = settings.effective_compression().to_string();
    let exclusive_access = settings.exclusive_access;
    let cache = Arc::new(MemoryCache::new());
    let store = Arc::new(SessionStore::new(cache.clone(), settings)?);

    let mut reports = Vec::with_capacity(args.sessions);
    for n in 0..args.sessions {
        let id = format!("sim-{n:04}");
        reports.push(run_session(&store, &cache, &id, &args).await?);
    }

    info!(sessions = reports.len(), "Simulation finished");

    let output = SimulateOutput {
        compression,
        exclusive_access,
        sessions: reports,
    };

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!();
    println!("{}", style("Casket Simulation").bold());
    println!("{}", dim.apply_to("─".repeat(60)));
    println!(
        "  {} {}   {} {}",
        dim.apply_to("Compression:"),
        output.compression,
        dim.apply_to("Exclusive access:"),
        output.exclusive_access
    );
    println!();
    println!(
        "  {:<10} {:>8} {:>8} {:>10} {:>10}",
        "session", "acquired", "locked", "raw", "stored"
    );
    for r in &output.sessions {
        println!(
            "  {:<10} {:>8} {:>8} {:>10} {:>10}",
            r.id, r.acquired, r.locked, r.raw_bytes, r.stored_bytes
        );
    }
    println!();
    Ok(())
}

async fn run_session(
    store: &Arc<SessionStore>,
    cache: &MemoryCache,
    id: &str,
    args: &SimulateArgs,
) -> Result<SessionReport> {
    store.create_uninitialized(id, args.timeout).await?;

    let mut handles = Vec::with_capacity(args.contenders);
    for _ in 0..args.contenders {
        let store = store.clone();
        let id = id.to_string();
        handles.push(tokio::spawn(async move { store.get(&id, true).await }));
    }

    let mut winner = None;
    let mut locked = 0;
    for handle in handles {
        match handle.await?? {
            SessionLookup::Acquired { state, lock_id, .. } => winner = Some((state, lock_id)),
            SessionLookup::Locked(_) => locked += 1,
            other => bail!("unexpected lookup for {id}: {other:?}"),
        }
    }
    let acquired = args.contenders - locked;
    let Some((mut state, lock_id)) = winner else {
        bail!("no request acquired {id}");
    };

    state
        .items
        .insert("payload", json!("x".repeat(args.payload_bytes)));
    state.items.insert("visits", json!(1));
    let raw_bytes = state.items.encode().len();
    if !store.set_and_release(id, &state, lock_id, false).await? {
        bail!("commit of {id} was rejected");
    }

    let stored_bytes = cache
        .raw(&store.settings().keys.data_key(id))
        .await
        .map(|b| b.len())
        .unwrap_or_default();

    match store.get(id, false).await? {
        SessionLookup::Found { state: read, .. } if read == state => {}
        other => bail!("read-back of {id} did not match: {other:?}"),
    }
    store.reset_timeout(id).await?;

    let removed = if args.keep {
        false
    } else {
        let lock_id = match store.get(id, true).await? {
            SessionLookup::Acquired { lock_id, .. } => lock_id,
            other => bail!("could not lock {id} for removal: {other:?}"),
        };
        store.remove(id, lock_id).await?
    };

    Ok(SessionReport {
        id: id.to_string(),
        acquired,
        locked,
        raw_bytes,
        stored_bytes,
        removed,
    })
}
