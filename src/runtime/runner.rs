use crate::processor::cycle::IngestContext;
use crate::processor::supervisor::Supervisor;
use crate::runtime::config::{NetworkConfig, NodeConfig};
use crate::runtime::registry::{NetworkContext, NetworkRegistry};
use crate::runtime::telemetry::Telemetry;
use crate::serve;
use crate::storage::StoreHandle;
use crate::upstream::{BeaconClient, HttpBeaconClient, UpstreamOptions};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Builds the upstream client of a configured network.
pub type ClientFactory =
    Arc<dyn Fn(&NetworkConfig, &UpstreamOptions) -> Result<Arc<dyn BeaconClient>> + Send + Sync>;

fn http_client(
    network: &NetworkConfig,
    options: &UpstreamOptions,
) -> Result<Arc<dyn BeaconClient>> {
    let client = HttpBeaconClient::with_options(network.upstream_url.clone(), options.clone())?;
    Ok(Arc::new(client))
}

/// Coordinates stores, per-network supervisors and the lookup server, and
/// handles OS signals for graceful shutdowns.
pub struct Runner {
    config: NodeConfig,
    client_factory: ClientFactory,
    shutdown: CancellationToken,
    running: Option<RunningNode>,
}

struct RunningNode {
    registry: Arc<NetworkRegistry>,
    stores: Vec<StoreHandle>,
    supervisors: Vec<(Arc<str>, JoinHandle<()>)>,
    server: Option<JoinHandle<Result<()>>>,
    local_addr: Option<SocketAddr>,
}

impl Runner {
    /// Creates a runner whose networks are scraped over the beacon REST API.
    pub fn new(config: NodeConfig) -> Self {
        Self::with_client_factory(config, Arc::new(http_client))
    }

    pub fn with_client_factory(config: NodeConfig, client_factory: ClientFactory) -> Self {
        Self {
            config,
            client_factory,
            shutdown: CancellationToken::new(),
            running: None,
        }
    }

    /// Returns a clone of the root shutdown token so external callers can integrate
    /// with their own signal handlers or cancellation strategies.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn registry(&self) -> Option<Arc<NetworkRegistry>> {
        self.running.as_ref().map(|node| node.registry.clone())
    }

    /// Address the lookup server is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().and_then(|node| node.local_addr)
    }

    pub fn telemetry(&self, network: &str) -> Option<Arc<Telemetry>> {
        self.running
            .as_ref()
            .and_then(|node| node.registry.get(network))
            .map(|ctx| ctx.telemetry.clone())
    }

    /// Opens every store, spawns one supervisor per network and, when a listen
    /// address is configured, the lookup server.
    ///
    /// Any failure here is a startup failure: already opened stores are closed
    /// and the error is returned.
    pub async fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            return Ok(());
        }
        self.config.validate().context("invalid node configuration")?;

        let mut stores = Vec::with_capacity(self.config.networks.len());
        let prepared = async {
            let registry = self.open_networks(&mut stores)?;
            let listener = self.bind_listener().await?;
            Ok::<_, anyhow::Error>((Arc::new(registry), listener))
        }
        .await;
        let (registry, listener) = match prepared {
            Ok(prepared) => prepared,
            Err(err) => {
                tracing::warn!(
                    opened = stores.len(),
                    error = %format!("{err:#}"),
                    "runner failed to start"
                );
                for store in stores {
                    store.close().await;
                }
                return Err(err);
            }
        };

        let (server, local_addr) = match listener {
            Some((listener, local_addr)) => {
                tracing::info!(addr = %local_addr, "serving slot lookups");
                let server = tokio::spawn(serve::serve(
                    listener,
                    registry.clone(),
                    self.shutdown.clone(),
                ));
                (Some(server), Some(local_addr))
            }
            None => (None, None),
        };

        let supervisors = registry
            .iter()
            .map(|ctx| {
                let ingest = IngestContext {
                    network: ctx.name.clone(),
                    store: ctx.store.clone(),
                    client: ctx.client.clone(),
                    telemetry: ctx.telemetry.clone(),
                    config: self.config.ingest.clone(),
                };
                let handle = Supervisor::new(ingest, self.shutdown.clone()).spawn();
                (ctx.name.clone(), handle)
            })
            .collect();

        tracing::info!(networks = ?registry, "runner started");
        self.running = Some(RunningNode {
            registry,
            stores,
            supervisors,
            server,
            local_addr,
        });
        Ok(())
    }

    /// Opens the store and builds the upstream client of every network. Each
    /// opened handle is pushed to `stores` before anything else can fail.
    fn open_networks(&self, stores: &mut Vec<StoreHandle>) -> Result<NetworkRegistry> {
        let mut registry = NetworkRegistry::new();
        for network in &self.config.networks {
            let handle = StoreHandle::open(&self.config.data_dir, &network.name, &self.config.store)
                .with_context(|| format!("failed to open store of network {}", network.name))?;
            let store = handle.store().clone();
            stores.push(handle);

            let client = (self.client_factory)(network, &self.config.upstream)
                .with_context(|| format!("failed to build upstream client of network {}", network.name))?;
            registry.insert(NetworkContext {
                name: Arc::from(network.name.as_str()),
                store,
                client,
                telemetry: Arc::new(Telemetry::default()),
            });
        }
        Ok(registry)
    }

    async fn bind_listener(&self) -> Result<Option<(TcpListener, SocketAddr)>> {
        let Some(addr) = self.config.listen_addr else {
            return Ok(None);
        };
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind lookup server to {addr}"))?;
        let local_addr = listener.local_addr().context("failed to read bound address")?;
        Ok(Some((listener, local_addr)))
    }

    /// Stops the node gracefully: cancels the root token, joins supervisors and
    /// the server, then closes every store.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(node) = self.running.take() else {
            return Ok(());
        };

        self.shutdown.cancel();

        for (network, handle) in node.supervisors {
            if let Err(err) = handle.await {
                tracing::warn!(network = %network, error = %err, "supervisor task join failed");
            }
        }

        let mut result = Ok(());
        if let Some(server) = node.server {
            result = match server.await {
                Ok(served) => served,
                Err(err) => Err(anyhow::Error::new(err).context("lookup server task failed")),
            };
        }

        drop(node.registry);
        for store in node.stores {
            store.close().await;
        }

        self.shutdown = CancellationToken::new();
        tracing::info!("runner stopped");
        result
    }

    /// Runs until a Ctrl-C (SIGINT) is received or the shutdown token is cancelled elsewhere.
    pub async fn run_until_ctrl_c(&mut self) -> Result<()> {
        self.start().await?;
        tracing::info!("runner started; waiting for Ctrl-C (SIGINT) to initiate shutdown");

        tokio::select! {
            _ = signal::ctrl_c() => {
                tracing::info!("Ctrl-C received; shutting down runner");
            }
            _ = self.shutdown.cancelled() => {
                tracing::info!("runner shutdown token cancelled");
            }
        }

        self.stop().await
    }
}
