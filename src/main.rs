use std::sync::Arc;

use nervus::{
    cluster::{ClusterCoordinator, StaticMembership},
    config::Settings,
    logging::init_logging,
    NodeId, NoopPolicyAuthority,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let settings = Settings::load()?;
    let membership = Arc::new(StaticMembership::new(NodeId::new(
        settings.node_name.clone(),
    )));
    let runtime =
        ClusterCoordinator::start(&settings, membership, Arc::new(NoopPolicyAuthority)).await?;

    tracing::info!(node = %runtime.node(), mode = ?runtime.mode(), "Node is up");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    Ok(())
}
