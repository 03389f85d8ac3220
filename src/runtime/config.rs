use crate::storage::StoreOptions;
use crate::upstream::UpstreamOptions;
use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// 450 epochs of 32 slots, roughly two days of mainnet history.
pub const DEFAULT_RETENTION_SLOTS: u64 = 450 * 32;
pub const DEFAULT_SAFETY_LAG_SLOTS: u64 = 8;
pub const DEFAULT_CONCURRENCY: usize = 16;
pub const DEFAULT_SLOT_DURATION: Duration = Duration::from_secs(12);
const DEFAULT_RESTART_BACKOFF_SECS: u64 = 16;
const DEFAULT_PROGRESS_INTERVAL_SECS: u64 = 1;
const DEFAULT_RATE_WINDOW_SECS: u64 = 10;
const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Settings for one network's ingestion pipeline.
///
/// Construct through [`IngestConfig::builder`]; every value has a default and
/// the result is validated before it is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    retention_slots: u64,
    safety_lag_slots: u64,
    concurrency: usize,
    queue_capacity: usize,
    slot_duration: Duration,
    restart_backoff: Duration,
    progress_interval: Duration,
    rate_window: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            retention_slots: DEFAULT_RETENTION_SLOTS,
            safety_lag_slots: DEFAULT_SAFETY_LAG_SLOTS,
            concurrency: DEFAULT_CONCURRENCY,
            queue_capacity: DEFAULT_CONCURRENCY,
            slot_duration: DEFAULT_SLOT_DURATION,
            restart_backoff: Duration::from_secs(DEFAULT_RESTART_BACKOFF_SECS),
            progress_interval: Duration::from_secs(DEFAULT_PROGRESS_INTERVAL_SECS),
            rate_window: Duration::from_secs(DEFAULT_RATE_WINDOW_SECS),
        }
    }
}

impl IngestConfig {
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder::default()
    }

    /// Number of trailing slots kept in the store.
    pub fn retention_slots(&self) -> u64 {
        self.retention_slots
    }

    /// Slots to stay behind the wall-clock head before fetching.
    pub fn safety_lag_slots(&self) -> u64 {
        self.safety_lag_slots
    }

    /// Number of concurrent fetch workers.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Capacity of the job queue between scheduler and workers.
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    pub fn slot_duration(&self) -> Duration {
        self.slot_duration
    }

    /// Pause between a failed ingestion cycle and the next one.
    pub fn restart_backoff(&self) -> Duration {
        self.restart_backoff
    }

    pub fn progress_interval(&self) -> Duration {
        self.progress_interval
    }

    /// Trailing interval the throughput estimate is computed over.
    pub fn rate_window(&self) -> Duration {
        self.rate_window
    }

    pub fn validate(&self) -> Result<()> {
        if self.retention_slots == 0 {
            bail!("retention_slots must be greater than 0");
        }
        if self.concurrency == 0 {
            bail!("concurrency must be greater than 0");
        }
        if self.queue_capacity == 0 {
            bail!("queue_capacity must be greater than 0");
        }
        if self.slot_duration.is_zero() {
            bail!("slot_duration must be greater than 0");
        }
        if self.restart_backoff.is_zero() {
            bail!("restart_backoff must be greater than 0");
        }
        if self.progress_interval.is_zero() {
            bail!("progress_interval must be greater than 0");
        }
        if self.rate_window < self.progress_interval {
            bail!("rate_window must be at least progress_interval");
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct IngestConfigBuilder {
    retention_slots: Option<u64>,
    safety_lag_slots: Option<u64>,
    concurrency: Option<usize>,
    queue_capacity: Option<usize>,
    slot_duration: Option<Duration>,
    restart_backoff: Option<Duration>,
    progress_interval: Option<Duration>,
    rate_window: Option<Duration>,
}

impl IngestConfigBuilder {
    pub fn retention_slots(mut self, slots: u64) -> Self {
        self.retention_slots = Some(slots);
        self
    }

    pub fn safety_lag_slots(mut self, slots: u64) -> Self {
        self.safety_lag_slots = Some(slots);
        self
    }

    pub fn concurrency(mut self, workers: usize) -> Self {
        self.concurrency = Some(workers);
        self
    }

    /// Defaults to the worker count.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    pub fn slot_duration(mut self, duration: Duration) -> Self {
        self.slot_duration = Some(duration);
        self
    }

    pub fn restart_backoff(mut self, backoff: Duration) -> Self {
        self.restart_backoff = Some(backoff);
        self
    }

    pub fn progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = Some(interval);
        self
    }

    pub fn rate_window(mut self, window: Duration) -> Self {
        self.rate_window = Some(window);
        self
    }

    pub fn build(self) -> Result<IngestConfig> {
        let defaults = IngestConfig::default();
        let concurrency = self.concurrency.unwrap_or(defaults.concurrency);
        let config = IngestConfig {
            retention_slots: self.retention_slots.unwrap_or(defaults.retention_slots),
            safety_lag_slots: self.safety_lag_slots.unwrap_or(defaults.safety_lag_slots),
            concurrency,
            queue_capacity: self.queue_capacity.unwrap_or(concurrency),
            slot_duration: self.slot_duration.unwrap_or(defaults.slot_duration),
            restart_backoff: self.restart_backoff.unwrap_or(defaults.restart_backoff),
            progress_interval: self.progress_interval.unwrap_or(defaults.progress_interval),
            rate_window: self.rate_window.unwrap_or(defaults.rate_window),
        };
        config.validate()?;
        Ok(config)
    }
}

/// A network to scrape and the beacon node serving it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub name: String,
    pub upstream_url: String,
}

impl NetworkConfig {
    pub fn new(name: impl Into<String>, upstream_url: impl Into<String>) -> Self {
        Self {
            name: name.into().trim().to_owned(),
            upstream_url: upstream_url.into().trim().to_owned(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            bail!("network name cannot be empty");
        }
        // The name doubles as the store directory name.
        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            bail!(
                "network name {:?} may only contain ASCII letters, digits, '-' and '_'",
                self.name
            );
        }
        if !(self.upstream_url.starts_with("http://") || self.upstream_url.starts_with("https://"))
        {
            bail!(
                "upstream url of network {} must start with http:// or https://",
                self.name
            );
        }
        Ok(())
    }
}

/// Process-wide configuration: where stores live, which networks to scrape, and
/// where to serve lookups.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    pub data_dir: PathBuf,
    pub listen_addr: Option<SocketAddr>,
    pub networks: Vec<NetworkConfig>,
    pub ingest: IngestConfig,
    pub store: StoreOptions,
    pub upstream: UpstreamOptions,
}

impl NodeConfig {
    pub fn new(data_dir: impl Into<PathBuf>, networks: Vec<NetworkConfig>) -> Self {
        Self {
            data_dir: data_dir.into(),
            listen_addr: None,
            networks,
            ingest: IngestConfig::default(),
            store: StoreOptions::default(),
            upstream: UpstreamOptions::default(),
        }
    }

    pub fn with_listen_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = Some(addr);
        self
    }

    pub fn with_ingest(mut self, ingest: IngestConfig) -> Self {
        self.ingest = ingest;
        self
    }

    pub fn with_store_options(mut self, store: StoreOptions) -> Self {
        self.store = store;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.networks.is_empty() {
            bail!("at least one network must be configured");
        }
        let mut seen = HashSet::new();
        for network in &self.networks {
            network.validate()?;
            if !seen.insert(network.name.as_str()) {
                bail!("network {} is configured twice", network.name);
            }
        }
        self.ingest.validate()?;
        self.store.validate()?;
        self.upstream.validate()?;
        Ok(())
    }

    /// Reads the configuration from `BEACONSTASH_*` environment variables.
    ///
    /// `BEACONSTASH_NETWORKS` is required and holds `name=url` pairs separated by
    /// commas. Optional: `BEACONSTASH_DATA_DIR`, `BEACONSTASH_LISTEN` (`off`
    /// disables serving), `BEACONSTASH_CONCURRENCY`, `BEACONSTASH_RETENTION_SLOTS`,
    /// `BEACONSTASH_SAFETY_LAG`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let networks = lookup("BEACONSTASH_NETWORKS")
            .context("BEACONSTASH_NETWORKS is required")?;
        let networks = parse_networks(&networks)?;

        let data_dir = lookup("BEACONSTASH_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.into());
        let listen = lookup("BEACONSTASH_LISTEN").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.into());
        let listen_addr = match listen.trim() {
            "" | "off" => None,
            addr => Some(
                addr.parse::<SocketAddr>()
                    .with_context(|| format!("invalid BEACONSTASH_LISTEN {addr:?}"))?,
            ),
        };

        let mut ingest = IngestConfig::builder();
        if let Some(value) = parse_var::<usize>(&lookup, "BEACONSTASH_CONCURRENCY")? {
            ingest = ingest.concurrency(value);
        }
        if let Some(value) = parse_var::<u64>(&lookup, "BEACONSTASH_RETENTION_SLOTS")? {
            ingest = ingest.retention_slots(value);
        }
        if let Some(value) = parse_var::<u64>(&lookup, "BEACONSTASH_SAFETY_LAG")? {
            ingest = ingest.safety_lag_slots(value);
        }

        let config = NodeConfig {
            data_dir: data_dir.trim().into(),
            listen_addr,
            networks,
            ingest: ingest.build()?,
            store: StoreOptions::default(),
            upstream: UpstreamOptions::default(),
        };
        config.validate()?;
        Ok(config)
    }
}

fn parse_networks(value: &str) -> Result<Vec<NetworkConfig>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (name, url) = entry
                .split_once('=')
                .with_context(|| format!("network entry {entry:?} must look like name=url"))?;
            Ok(NetworkConfig::new(name, url))
        })
        .collect()
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|err| anyhow::anyhow!("invalid {key} {raw:?}: {err}")),
    }
}
