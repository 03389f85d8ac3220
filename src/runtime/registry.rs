use crate::runtime::telemetry::Telemetry;
use crate::storage::SlotStore;
use crate::upstream::BeaconClient;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Per-network state shared by the supervisor and the serving layer.
#[derive(Clone)]
pub struct NetworkContext {
    pub name: Arc<str>,
    pub store: SlotStore,
    pub client: Arc<dyn BeaconClient>,
    pub telemetry: Arc<Telemetry>,
}

/// Open networks keyed by name.
#[derive(Clone, Default)]
pub struct NetworkRegistry {
    networks: BTreeMap<String, NetworkContext>,
}

impl NetworkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a network, replacing and returning any previous entry of that name.
    pub fn insert(&mut self, context: NetworkContext) -> Option<NetworkContext> {
        self.networks.insert(context.name.to_string(), context)
    }

    pub fn get(&self, name: &str) -> Option<&NetworkContext> {
        self.networks.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NetworkContext> {
        self.networks.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.networks.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}

impl std::fmt::Debug for NetworkRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
