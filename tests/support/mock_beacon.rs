//! In-process beacon node speaking the subset of the REST API the HTTP adapter uses.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use beaconstash::{BlockRoot, StoredBlock};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::helpers::fixture_block;

#[derive(Clone)]
pub enum SlotFixture {
    Block(StoredBlock),
    /// Plain 404 from both endpoints.
    NotFound,
    /// Root resolves but the block endpoint fails with a known Prysm message.
    PrysmMissing(&'static str),
    /// Block endpoint fails with an arbitrary error.
    Failure(u16, &'static str),
    /// Serves the block's root once, then switches the slot to a block with
    /// the given root, as if the slot was reorged between requests.
    ReorgAfterRoot(StoredBlock, BlockRoot),
}

#[derive(Clone)]
pub struct MockChain {
    genesis_secs: u64,
    slots: Arc<RwLock<HashMap<u64, SlotFixture>>>,
}

impl MockChain {
    /// Genesis is rounded down to whole seconds, as the beacon API reports it.
    pub fn new(genesis: SystemTime) -> Self {
        let genesis_secs = genesis
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();
        Self {
            genesis_secs,
            slots: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn genesis(&self) -> SystemTime {
        UNIX_EPOCH + std::time::Duration::from_secs(self.genesis_secs)
    }

    pub fn set(&self, slot: u64, fixture: SlotFixture) {
        self.slots.write().unwrap().insert(slot, fixture);
    }

    pub fn with_block(self, slot: u64) -> Self {
        self.set(slot, SlotFixture::Block(fixture_block(slot)));
        self
    }

    fn fixture(&self, slot: u64) -> SlotFixture {
        self.slots
            .read()
            .unwrap()
            .get(&slot)
            .cloned()
            .unwrap_or(SlotFixture::NotFound)
    }
}

pub struct MockBeaconServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl MockBeaconServer {
    pub async fn start(chain: MockChain) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind mock beacon node")?;
        let addr = listener.local_addr()?;
        let (tx, rx) = oneshot::channel::<()>();

        let app = Router::new()
            .route("/eth/v1/beacon/genesis", get(genesis))
            .route("/eth/v1/beacon/blocks/{slot}/root", get(block_root))
            .route("/eth/v2/beacon/blocks/{slot}", get(block))
            .with_state(chain);

        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = rx.await;
                })
                .await;
        });

        Ok(Self {
            addr,
            shutdown: Some(tx),
            handle,
        })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = self.handle.await;
    }
}

async fn genesis(State(chain): State<MockChain>) -> Json<serde_json::Value> {
    Json(json!({
        "data": {
            "genesis_time": chain.genesis_secs.to_string(),
            "genesis_validators_root": format!("0x{}", "00".repeat(32)),
            "genesis_fork_version": "0x00000000"
        }
    }))
}

async fn block_root(State(chain): State<MockChain>, Path(slot): Path<u64>) -> Response {
    match chain.fixture(slot) {
        SlotFixture::NotFound => not_found(),
        SlotFixture::Block(block) => Json(json!({
            "execution_optimistic": false,
            "data": { "root": block.root.to_hex() }
        }))
        .into_response(),
        SlotFixture::ReorgAfterRoot(block, next_root) => {
            let root = block.root.to_hex();
            chain.set(
                slot,
                SlotFixture::Block(StoredBlock::new(block.version, next_root, block.ssz)),
            );
            Json(json!({ "data": { "root": root } })).into_response()
        }
        SlotFixture::PrysmMissing(_) | SlotFixture::Failure(..) => Json(json!({
            "data": { "root": format!("0x{}", "11".repeat(32)) }
        }))
        .into_response(),
    }
}

async fn block(State(chain): State<MockChain>, Path(slot): Path<u64>) -> Response {
    match chain.fixture(slot) {
        SlotFixture::NotFound => not_found(),
        SlotFixture::Block(block) | SlotFixture::ReorgAfterRoot(block, _) => {
            let mut headers = HeaderMap::new();
            headers.insert(
                "Eth-Consensus-Version",
                HeaderValue::from_static(block.version.as_str()),
            );
            headers.insert(
                "Content-Type",
                HeaderValue::from_static("application/octet-stream"),
            );
            (headers, block.ssz).into_response()
        }
        SlotFixture::PrysmMissing(message) => error(500, message),
        SlotFixture::Failure(status, message) => error(status, message),
    }
}

fn not_found() -> Response {
    error(404, "NOT_FOUND: beacon block at slot")
}

fn error(status: u16, message: &str) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(json!({ "code": status.as_u16(), "message": message })),
    )
        .into_response()
}
