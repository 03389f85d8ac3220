use anyhow::Result;
use beaconstash::{init_tracing, NodeConfig, Runner};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = NodeConfig::from_env()?;
    tracing::info!(
        data_dir = %config.data_dir.display(),
        networks = config.networks.len(),
        "starting beaconstash"
    );

    Runner::new(config).run_until_ctrl_c().await
}
