//! Server mode — REST API over an assembled cluster.

use std::net::SocketAddr;

use tokio::sync::watch;
use tracing::{info, warn};

use scaleprobe_api::{ApiState, build_router};

use crate::ClusterArgs;
use crate::cluster::assemble;

pub async fn run_server(port: u16, args: ClusterArgs) -> anyhow::Result<()> {
    info!("scaleprobe daemon starting");

    let assembly = assemble(&args)?;

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start API server ───────────────────────────────────────

    let state = ApiState::new(
        assembly.cluster,
        assembly.descriptor,
        assembly.recommender,
    )
    .with_shutdown(shutdown_rx);
    let router = build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C; running scenarios are cancelled.
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    info!("scaleprobe daemon stopped");
    Ok(())
}
