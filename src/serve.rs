//! Read-only HTTP lookups over the slot stores.
//!
//! `GET /{network}/{slot}` returns the stored block as
//! `{"version": .., "root": .., "data": ..}`; `?hide-payload` drops `data`.
//! `GET /{network}` returns `{"slots": .., "blocks": ..}`.
//!
//! Blocks are served as the raw SSZ bytes, hex encoded, and never decoded.
//! Redaction is therefore all or nothing: `?hide-payload` is the only flag, and
//! per-field switches such as `hide-attestations` or `hide-transactions` are
//! not recognised and leave `data` in place.

use crate::runtime::registry::{NetworkContext, NetworkRegistry};
use crate::storage::{SlotCount, SlotRecord, SlotStore, StorageError, StoredBlock};
use anyhow::{Context, Result};
use axum::extract::{Path, RawQuery, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

const HIDE_PAYLOAD_PARAM: &str = "hide-payload";

pub type ServeResult<T, E = ServeError> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum ServeError {
    #[error("network not found")]
    NetworkNotFound,
    #[error("block not scraped")]
    NotScraped,
    #[error("block not found")]
    EmptySlot,
    #[error("invalid slot {0:?}")]
    InvalidSlot(String),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("an internal server error occurred: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServeError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NetworkNotFound | Self::NotScraped | Self::EmptySlot => StatusCode::NOT_FOUND,
            Self::InvalidSlot(_) => StatusCode::BAD_REQUEST,
            Self::Storage(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: u16,
    message: String,
}

impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "lookup failed");
        }
        let body = ErrorBody {
            code: status.as_u16(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// JSON view of a stored block.
#[derive(Debug, Serialize)]
pub struct BlockEnvelope {
    pub version: &'static str,
    pub root: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl BlockEnvelope {
    pub fn new(block: &StoredBlock, hide_payload: bool) -> Self {
        Self {
            version: block.version.as_str(),
            root: block.root.to_hex(),
            data: (!hide_payload).then(|| format!("0x{}", hex::encode(&block.ssz))),
        }
    }
}

pub fn router(registry: Arc<NetworkRegistry>) -> Router {
    Router::new()
        .route("/{network}", get(get_counts))
        .route("/{network}/{slot}", get(get_block))
        .with_state(registry)
}

/// Serves lookups on `listener` until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    registry: Arc<NetworkRegistry>,
    shutdown: CancellationToken,
) -> Result<()> {
    axum::serve(listener, router(registry))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("lookup server failed")
}

async fn get_block(
    State(registry): State<Arc<NetworkRegistry>>,
    Path((network, slot)): Path<(String, String)>,
    RawQuery(query): RawQuery,
) -> ServeResult<Json<BlockEnvelope>> {
    let ctx = lookup_network(&registry, &network)?;
    let slot = slot
        .parse::<u64>()
        .map_err(|_| ServeError::InvalidSlot(slot.clone()))?;
    let hide_payload = wants_hidden_payload(query.as_deref());

    let record = blocking(ctx.store.clone(), move |store| store.get(slot))
        .await
        .map_err(|err| match err {
            ServeError::Storage(err) if err.is_not_found() => ServeError::NotScraped,
            other => other,
        })?;

    match record {
        SlotRecord::Empty => Err(ServeError::EmptySlot),
        SlotRecord::Block(block) => Ok(Json(BlockEnvelope::new(&block, hide_payload))),
    }
}

async fn get_counts(
    State(registry): State<Arc<NetworkRegistry>>,
    Path(network): Path<String>,
) -> ServeResult<Json<SlotCount>> {
    let ctx = lookup_network(&registry, &network)?;
    let count = blocking(ctx.store.clone(), |store| store.count()).await?;
    Ok(Json(count))
}

fn lookup_network<'a>(
    registry: &'a NetworkRegistry,
    network: &str,
) -> ServeResult<&'a NetworkContext> {
    registry.get(network).ok_or(ServeError::NetworkNotFound)
}

fn wants_hidden_payload(query: Option<&str>) -> bool {
    query
        .unwrap_or_default()
        .split('&')
        .filter_map(|pair| pair.split('=').next())
        .any(|key| key == HIDE_PAYLOAD_PARAM)
}

async fn blocking<T, F>(store: SlotStore, f: F) -> ServeResult<T>
where
    T: Send + 'static,
    F: FnOnce(&SlotStore) -> std::result::Result<T, StorageError> + Send + 'static,
{
    let result = tokio::task::spawn_blocking(move || f(&store))
        .await
        .context("storage task panicked")?;
    Ok(result?)
}
