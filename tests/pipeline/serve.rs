use std::net::SocketAddr;
use std::sync::Arc;

use crate::support::helpers::{fixture_block, genesis_for_head, init_tracing, RecordingBeacon};
use anyhow::Result;
use beaconstash::serve;
use beaconstash::{
    NetworkContext, NetworkRegistry, SlotRecord, SlotStore, StoreOptions, Telemetry,
};
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct TestServer {
    _dir: TempDir,
    addr: SocketAddr,
    shutdown: CancellationToken,
    handle: JoinHandle<Result<()>>,
}

impl TestServer {
    async fn start() -> Result<Self> {
        let dir = TempDir::new()?;
        let store = SlotStore::open(dir.path().join("mainnet"), &StoreOptions::default())?;
        store.put(100, &SlotRecord::Block(fixture_block(100)))?;
        store.put(101, &SlotRecord::Empty)?;
        store.put(102, &SlotRecord::Block(fixture_block(102)))?;

        let mut registry = NetworkRegistry::new();
        registry.insert(NetworkContext {
            name: Arc::from("mainnet"),
            store,
            client: RecordingBeacon::new(genesis_for_head(200)).into_client(),
            telemetry: Arc::new(Telemetry::default()),
        });

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(serve::serve(
            listener,
            Arc::new(registry),
            shutdown.clone(),
        ));

        Ok(Self {
            _dir: dir,
            addr,
            shutdown,
            handle,
        })
    }

    async fn get(&self, path: &str) -> Result<(u16, Value)> {
        let response = reqwest::get(format!("http://{}{}", self.addr, path)).await?;
        let status = response.status().as_u16();
        let body = response.json::<Value>().await?;
        Ok((status, body))
    }

    async fn stop(self) -> Result<()> {
        self.shutdown.cancel();
        self.handle.await?
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn serves_stored_blocks_with_optional_payload() -> Result<()> {
    init_tracing();
    let server = TestServer::start().await?;
    let expected = fixture_block(100);

    let (status, body) = server.get("/mainnet/100").await?;
    assert_eq!(status, 200);
    assert_eq!(body["version"], expected.version.as_str());
    assert_eq!(body["root"], expected.root.to_hex());
    assert_eq!(
        body["data"],
        format!("0x{}", hex::encode(&expected.ssz)).as_str()
    );

    let (status, body) = server.get("/mainnet/100?hide-payload").await?;
    assert_eq!(status, 200);
    assert_eq!(body["root"], expected.root.to_hex());
    assert!(body.get("data").is_none());

    // Only the whole payload can be hidden.
    let (status, body) = server.get("/mainnet/100?hide-transactions").await?;
    assert_eq!(status, 200);
    assert_eq!(
        body["data"],
        format!("0x{}", hex::encode(&expected.ssz)).as_str()
    );

    server.stop().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn distinguishes_missing_network_unscraped_and_empty_slots() -> Result<()> {
    init_tracing();
    let server = TestServer::start().await?;

    let (status, body) = server.get("/mainnet/101").await?;
    assert_eq!(status, 404);
    assert_eq!(body["message"], "block not found");

    let (status, body) = server.get("/mainnet/5000").await?;
    assert_eq!(status, 404);
    assert_eq!(body["message"], "block not scraped");

    let (status, body) = server.get("/sepolia/100").await?;
    assert_eq!(status, 404);
    assert_eq!(body["message"], "network not found");
    assert_eq!(body["code"], 404);

    let (status, _) = server.get("/mainnet/latest").await?;
    assert_eq!(status, 400);

    server.stop().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reports_slot_and_block_counts() -> Result<()> {
    init_tracing();
    let server = TestServer::start().await?;

    let (status, body) = server.get("/mainnet").await?;
    assert_eq!(status, 200);
    assert_eq!(body["slots"], 3);
    assert_eq!(body["blocks"], 2);

    let (status, body) = server.get("/goerli").await?;
    assert_eq!(status, 404);
    assert_eq!(body["message"], "network not found");

    server.stop().await
}
