use std::sync::Arc;

use stratfolio_core::allocation::{AllocationEngine, AllocationPreviewCache};
use stratfolio_core::portfolio::{PortfolioService, PortfolioServiceTrait};
use stratfolio_core::scheduler::NavScheduler;
use stratfolio_storage_memory::{load_seed_file, MemoryStorage};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;

pub struct AppState {
    pub storage: MemoryStorage,
    pub nav_scheduler: Arc<NavScheduler>,
}

pub fn init_tracing() {
    let log_format = std::env::var("SF_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

pub async fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let storage = MemoryStorage::new();
    let seed = match &config.seed_file {
        Some(path) => {
            let seed = load_seed_file(path)?;
            seed.apply(&storage)?;
            tracing::info!("Seed data loaded from {}", path.display());
            Some(seed)
        }
        None => {
            tracing::warn!("SF_SEED_FILE not set; starting with an empty store");
            None
        }
    };

    let engine = Arc::new(AllocationEngine::new(
        storage.strategies.clone(),
        storage.stocks.clone(),
        storage.stocks.clone(),
        storage.quotes.clone(),
    ));
    let portfolio_service: Arc<dyn PortfolioServiceTrait> = Arc::new(PortfolioService::new(
        engine,
        storage.strategies.clone(),
        storage.portfolios.clone(),
        storage.quotes.clone(),
        Arc::new(AllocationPreviewCache::new()),
    ));

    if let Some(seed) = &seed {
        for portfolio in seed.create_portfolios(portfolio_service.as_ref()).await? {
            tracing::info!(
                "Seeded portfolio '{}' ({}) with {} cash",
                portfolio.name,
                portfolio.id,
                portfolio.cash
            );
        }
    }

    let nav_scheduler = Arc::new(NavScheduler::new(
        portfolio_service,
        storage.portfolios.clone(),
        config.scheduler.clone(),
    ));

    Ok(Arc::new(AppState {
        storage,
        nav_scheduler,
    }))
}
