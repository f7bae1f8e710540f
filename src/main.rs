use std::sync::Arc;

use anyhow::Result;
use home_energy_controller::config::AppConfig;
use home_energy_controller::coordinator::Coordinator;
use home_energy_controller::telemetry::{init_tracing, shutdown_signal};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cfg = AppConfig::load()?;
    let coordinator = Arc::new(Coordinator::new(cfg.clone()).await?);

    let app = home_energy_controller::api::router(coordinator.clone());

    let addr = cfg.server.socket_addr()?;
    info!(%addr, "starting home energy controller");

    let token = CancellationToken::new();
    coordinator.spawn_tasks(token.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            token.cancel();
        })
        .await?;

    warn!("shutdown complete");
    Ok(())
}
