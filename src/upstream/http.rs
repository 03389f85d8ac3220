//! Beacon REST API adapter.
//!
//! Only three endpoints are used: `/eth/v1/beacon/genesis`,
//! `/eth/v1/beacon/blocks/{slot}/root`, and the SSZ flavour of
//! `/eth/v2/beacon/blocks/{slot}` whose fork is read from the
//! `Eth-Consensus-Version` response header.
//!
//! The SSZ body is stored as-is, so the root comes from the root endpoint. It
//! is read before and after the block request; a changed root means the slot
//! was reorged mid-fetch and the fetch fails instead of pairing a root with
//! the wrong block.

use super::client::{BeaconClient, BlockOutcome};
use super::missing::{classify_error_response, ResponseClass};
use super::options::UpstreamOptions;
use crate::storage::{BlockRoot, BlockVersion, StoredBlock};
use anyhow::{anyhow, Context, Result};
use futures::future::BoxFuture;
use reqwest::header::{HeaderValue, ACCEPT};
use reqwest::{Client, Response};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const CONSENSUS_VERSION_HEADER: &str = "Eth-Consensus-Version";
const SSZ_CONTENT_TYPE: &str = "application/octet-stream";
const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream {endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("upstream {endpoint} request failed")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("upstream {endpoint} returned a malformed response: {reason}")]
    Malformed { endpoint: String, reason: String },
}

#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct GenesisData {
    genesis_time: String,
}

#[derive(Deserialize)]
struct RootData {
    root: String,
}

/// Outcome of a request once missing-block answers have been separated out.
enum Fetched {
    Ok(Response),
    Missing,
}

#[derive(Debug, Clone)]
pub struct HttpBeaconClient {
    base_url: Arc<String>,
    client: Client,
}

impl HttpBeaconClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_options(base_url, UpstreamOptions::default())
    }

    pub fn with_options(base_url: impl Into<String>, options: UpstreamOptions) -> Result<Self> {
        options.validate()?;
        let base_url = base_url.into().trim().trim_end_matches('/').to_owned();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(anyhow!("upstream url must start with http:// or https://"));
        }

        let client = Client::builder()
            .timeout(options.request_timeout)
            .connect_timeout(options.connect_timeout)
            .pool_max_idle_per_host(options.max_idle_per_host)
            .build()
            .context("failed to build upstream HTTP client")?;

        Ok(Self {
            base_url: Arc::new(base_url),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.base_url
    }

    pub async fn fetch_genesis_time(&self) -> Result<SystemTime> {
        let path = "/eth/v1/beacon/genesis";
        let response = self.get(path, None).await?;
        let envelope: DataEnvelope<GenesisData> = decode_json(path, response).await?;
        let seconds: u64 = envelope
            .data
            .genesis_time
            .trim()
            .parse()
            .map_err(|err| malformed(path, format!("invalid genesis_time: {err}")))?;
        Ok(UNIX_EPOCH + Duration::from_secs(seconds))
    }

    /// Returns the canonical block root at `slot`, or `None` when the slot is empty.
    pub async fn fetch_block_root(&self, slot: u64) -> Result<Option<BlockRoot>> {
        let path = format!("/eth/v1/beacon/blocks/{slot}/root");
        let response = match self.get_classified(&path, None).await? {
            Fetched::Ok(response) => response,
            Fetched::Missing => return Ok(None),
        };
        let envelope: DataEnvelope<RootData> = decode_json(&path, response).await?;
        let root = BlockRoot::from_hex(&envelope.data.root)
            .map_err(|err| malformed(&path, err.to_string()))?;
        Ok(Some(root))
    }

    pub async fn fetch_signed_block(&self, slot: u64) -> Result<BlockOutcome> {
        let Some(root) = self.fetch_block_root(slot).await? else {
            return Ok(BlockOutcome::Missing);
        };

        let path = format!("/eth/v2/beacon/blocks/{slot}");
        let accept = HeaderValue::from_static(SSZ_CONTENT_TYPE);
        let response = match self.get_classified(&path, Some(accept)).await? {
            Fetched::Ok(response) => response,
            Fetched::Missing => return Ok(BlockOutcome::Missing),
        };

        let version = response
            .headers()
            .get(CONSENSUS_VERSION_HEADER)
            .ok_or_else(|| malformed(&path, format!("missing {CONSENSUS_VERSION_HEADER} header")))?
            .to_str()
            .map_err(|err| malformed(&path, format!("unreadable version header: {err}")))?
            .parse::<BlockVersion>()
            .map_err(|err| malformed(&path, err.to_string()))?;

        let ssz = response
            .bytes()
            .await
            .map_err(|source| transport(&path, source))?;
        if ssz.is_empty() {
            return Err(malformed(&path, "empty block body".to_owned()).into());
        }

        let confirmed = self.fetch_block_root(slot).await?;
        if confirmed != Some(root) {
            let now = confirmed.map_or_else(|| "no block".to_owned(), |root| root.to_hex());
            return Err(malformed(
                &path,
                format!("block root changed from {} to {now} during fetch", root.to_hex()),
            )
            .into());
        }

        Ok(BlockOutcome::Found(StoredBlock::new(version, root, ssz.to_vec())))
    }

    async fn get(&self, path: &str, accept: Option<HeaderValue>) -> Result<Response> {
        let response = self.send(path, accept).await?;
        if response.status().is_success() {
            return Ok(response);
        }
        Err(status_error(path, response).await.into())
    }

    async fn get_classified(&self, path: &str, accept: Option<HeaderValue>) -> Result<Fetched> {
        let response = self.send(path, accept).await?;
        if response.status().is_success() {
            return Ok(Fetched::Ok(response));
        }

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        match classify_error_response(status, &body) {
            ResponseClass::Missing => {
                tracing::trace!(path, status, "upstream reported missing block");
                Ok(Fetched::Missing)
            }
            ResponseClass::Fatal => Err(UpstreamError::Status {
                endpoint: path.to_owned(),
                status,
                body: truncate(body),
            }
            .into()),
        }
    }

    async fn send(&self, path: &str, accept: Option<HeaderValue>) -> Result<Response> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.get(url);
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }
        Ok(request
            .send()
            .await
            .map_err(|source| transport(path, source))?)
    }
}

impl BeaconClient for HttpBeaconClient {
    fn genesis_time(&self) -> BoxFuture<'_, Result<SystemTime>> {
        Box::pin(self.fetch_genesis_time())
    }

    fn signed_block(&self, slot: u64) -> BoxFuture<'_, Result<BlockOutcome>> {
        Box::pin(self.fetch_signed_block(slot))
    }
}

async fn decode_json<T: serde::de::DeserializeOwned>(path: &str, response: Response) -> Result<T> {
    let bytes = response
        .bytes()
        .await
        .map_err(|source| transport(path, source))?;
    serde_json::from_slice(&bytes).map_err(|err| malformed(path, err.to_string()).into())
}

async fn status_error(path: &str, response: Response) -> UpstreamError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    UpstreamError::Status {
        endpoint: path.to_owned(),
        status,
        body: truncate(body),
    }
}

fn transport(path: &str, source: reqwest::Error) -> UpstreamError {
    UpstreamError::Transport {
        endpoint: path.to_owned(),
        source,
    }
}

fn malformed(path: &str, reason: String) -> UpstreamError {
    UpstreamError::Malformed {
        endpoint: path.to_owned(),
        reason,
    }
}

fn truncate(mut body: String) -> String {
    if let Some((index, _)) = body.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        body.truncate(index);
        body.push_str("...");
    }
    body
}
