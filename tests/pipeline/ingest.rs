use std::sync::Arc;
use std::time::Duration;

use crate::support::helpers::{
    fast_ingest_config, fixture_block, genesis_for_head, init_tracing, wait_for, wait_for_completed,
    RecordingBeacon,
};
use anyhow::{anyhow, Context, Result};
use beaconstash::{
    BeaconClient, NetworkConfig, NodeConfig, Runner, SlotRecord, SlotStore, StoreOptions,
    UpstreamOptions,
};
use tempfile::TempDir;
use tokio::time::timeout;

fn runner_with(config: NodeConfig, beacon: RecordingBeacon) -> Runner {
    Runner::with_client_factory(
        config,
        Arc::new(
            move |_network: &NetworkConfig,
                  _options: &UpstreamOptions|
                  -> Result<Arc<dyn BeaconClient>> { Ok(beacon.clone().into_client()) },
        ),
    )
}

fn node_config(dir: &TempDir, retention: u64, lag: u64) -> Result<NodeConfig> {
    Ok(NodeConfig::new(
        dir.path(),
        vec![NetworkConfig::new("testnet", "http://unused.invalid")],
    )
    .with_ingest(fast_ingest_config(retention, lag)?))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn runner_ingests_trailing_window() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let beacon = RecordingBeacon::new(genesis_for_head(60)).with_even_blocks(0..10_000);

    let mut runner = runner_with(node_config(&dir, 20, 2)?, beacon.clone());
    runner.start().await?;
    let telemetry = runner.telemetry("testnet").context("telemetry for testnet")?;
    wait_for_completed(&telemetry, 15, Duration::from_secs(10)).await?;
    runner.stop().await?;

    let requested = beacon.requested();
    assert!(requested.len() >= 15);
    assert!(
        requested.iter().all(|slot| *slot >= 40),
        "slot below the retention boundary was requested: {requested:?}"
    );
    assert_eq!(beacon.genesis_calls(), 1);
    assert_eq!(telemetry.cycle_restarts(), 0);

    let store = SlotStore::open(dir.path().join("testnet"), &StoreOptions::default())?;
    let mut blocks = 0;
    for slot in requested {
        // A fetch interrupted by shutdown leaves the slot unscraped.
        let record = match store.get(slot) {
            Ok(record) => record,
            Err(err) if err.is_not_found() => continue,
            Err(err) => return Err(err.into()),
        };
        match record {
            SlotRecord::Empty => assert_eq!(slot % 2, 1, "slot {slot} should hold a block"),
            SlotRecord::Block(block) => {
                assert_eq!(slot % 2, 0, "slot {slot} should be empty");
                assert_eq!(block, fixture_block(slot));
                blocks += 1;
            }
        }
    }
    assert!(blocks > 0);
    let count = store.count()?;
    assert_eq!(count.blocks, blocks);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stale_slots_are_purged_and_filled_slots_skipped() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    {
        let store = SlotStore::open(dir.path().join("testnet"), &StoreOptions::default())?;
        for slot in 0..10 {
            store.put(slot, &SlotRecord::Empty)?;
        }
        // Inside the retention window; must not be fetched again.
        for slot in 45..50 {
            store.put(slot, &SlotRecord::Empty)?;
        }
    }

    let beacon = RecordingBeacon::new(genesis_for_head(60));
    let mut runner = runner_with(node_config(&dir, 20, 2)?, beacon.clone());
    runner.start().await?;
    let telemetry = runner.telemetry("testnet").context("telemetry for testnet")?;
    wait_for(
        "ingestion past slot 50",
        Duration::from_secs(10),
        || beacon.requested().iter().any(|slot| *slot > 50),
    )
    .await?;
    let snapshot = telemetry.snapshot();
    runner.stop().await?;

    assert_eq!(snapshot.purged_slots, 10);
    let requested = beacon.requested();
    assert!(
        requested.iter().all(|slot| !(45..50).contains(slot)),
        "filled slots were fetched again: {requested:?}"
    );

    let store = SlotStore::open(dir.path().join("testnet"), &StoreOptions::default())?;
    for slot in 0..10 {
        assert!(!store.is_filled(slot)?, "slot {slot} should have been purged");
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn upstream_failure_restarts_cycle() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let beacon = RecordingBeacon::new(genesis_for_head(60))
        .with_even_blocks(0..10_000)
        .fail_once(48);

    let mut runner = runner_with(node_config(&dir, 20, 2)?, beacon.clone());
    runner.start().await?;
    let telemetry = runner.telemetry("testnet").context("telemetry for testnet")?;
    let registry = runner.registry().context("registry after start")?;
    let store = registry.get("testnet").context("testnet registered")?.store.clone();
    drop(registry);

    wait_for("restart after failure", Duration::from_secs(10), || {
        telemetry.cycle_restarts() >= 1
    })
    .await?;
    wait_for("slot 48 ingested after restart", Duration::from_secs(10), || {
        store.is_filled(48).unwrap_or(false)
    })
    .await?;
    drop(store);
    runner.stop().await?;

    assert!(telemetry.fatal_errors() >= 1);
    assert!(beacon.genesis_calls() >= 2);
    let attempts = beacon.requested().iter().filter(|slot| **slot == 48).count();
    assert!(attempts >= 2, "slot 48 requested {attempts} times");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stop_is_prompt_while_waiting_for_lag() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    // Huge lag: every slot is still too young, so the scheduler just waits.
    let beacon = RecordingBeacon::new(genesis_for_head(10));
    let mut runner = runner_with(node_config(&dir, 5, 1_000_000)?, beacon.clone());
    runner.start().await?;
    wait_for("genesis lookup", Duration::from_secs(5), || {
        beacon.genesis_calls() >= 1
    })
    .await?;

    timeout(Duration::from_secs(5), runner.stop())
        .await
        .context("runner stop should not wait for the lag deadline")??;
    assert!(beacon.requested().is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn run_until_ctrl_c_returns_when_token_cancelled() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let beacon = RecordingBeacon::new(genesis_for_head(30));
    let mut runner = runner_with(node_config(&dir, 10, 2)?, beacon);
    let token = runner.cancellation_token();

    let cancel = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        token.cancel();
    });

    timeout(Duration::from_secs(10), runner.run_until_ctrl_c())
        .await
        .context("runner should exit once its token is cancelled")??;
    cancel.await?;
    Ok(())
}

#[tokio::test]
async fn invalid_config_fails_startup() {
    let dir = TempDir::new().unwrap();
    let config = NodeConfig::new(dir.path(), Vec::new());
    let beacon = RecordingBeacon::new(genesis_for_head(1));
    let mut runner = runner_with(config, beacon);
    let err = runner.start().await.unwrap_err();
    assert!(format!("{err:#}").contains("at least one network"));
}

#[tokio::test]
async fn failed_start_releases_opened_stores() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let config = NodeConfig::new(
        dir.path(),
        vec![
            NetworkConfig::new("alpha", "http://unused.invalid"),
            NetworkConfig::new("broken", "http://unused.invalid"),
        ],
    )
    .with_ingest(fast_ingest_config(10, 2)?);
    let beacon = RecordingBeacon::new(genesis_for_head(20));
    let mut runner = Runner::with_client_factory(
        config,
        Arc::new(
            move |network: &NetworkConfig,
                  _options: &UpstreamOptions|
                  -> Result<Arc<dyn BeaconClient>> {
                if network.name == "broken" {
                    return Err(anyhow!("no client for {}", network.name));
                }
                Ok(beacon.clone().into_client())
            },
        ),
    );

    let err = runner.start().await.unwrap_err();
    assert!(format!("{err:#}").contains("no client for broken"));
    assert!(runner.registry().is_none());

    // Both databases must be unlocked again.
    SlotStore::open(dir.path().join("alpha"), &StoreOptions::default())?;
    SlotStore::open(dir.path().join("broken"), &StoreOptions::default())?;
    Ok(())
}

#[tokio::test]
async fn bind_failure_releases_opened_stores() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let taken = std::net::TcpListener::bind("127.0.0.1:0")?;
    let config = node_config(&dir, 10, 2)?.with_listen_addr(taken.local_addr()?);
    let mut runner = runner_with(config, RecordingBeacon::new(genesis_for_head(20)));

    let err = runner.start().await.unwrap_err();
    assert!(format!("{err:#}").contains("failed to bind lookup server"));
    assert!(runner.local_addr().is_none());

    SlotStore::open(dir.path().join("testnet"), &StoreOptions::default())?;
    Ok(())
}
