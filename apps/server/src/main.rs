mod config;
mod main_lib;

use config::Config;
use main_lib::{build_state, init_tracing};
use stratfolio_core::portfolio::PortfolioRepositoryTrait;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();
    init_tracing();
    let state = build_state(&config).await?;

    state.nav_scheduler.start()?;
    tracing::info!(
        "NAV scheduler running for {} portfolio(s); press Ctrl+C to stop",
        state.storage.portfolios.get_all_portfolio_ids()?.len()
    );

    shutdown_signal().await;
    tracing::info!("Shutdown requested");

    state.nav_scheduler.stop().await?;
    let metrics = state.nav_scheduler.get_metrics();
    tracing::info!("Final scheduler metrics: {}", serde_json::to_string(&metrics)?);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
