use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};

use super::{CycleSummary, SchedulerConfig, SchedulerError, SchedulerMetrics};
use crate::errors::{Error, Result};
use crate::portfolio::{
    NavHistory, PortfolioLocks, PortfolioRepositoryTrait, PortfolioServiceTrait,
};

/// Shared by the scheduler handle and every task it spawns.
struct SchedulerCore {
    portfolio_service: Arc<dyn PortfolioServiceTrait>,
    portfolio_repository: Arc<dyn PortfolioRepositoryTrait>,
    config: SchedulerConfig,
    metrics: Mutex<SchedulerMetrics>,
    /// Serializes retry sequences per portfolio across overlapping cycles.
    portfolio_locks: PortfolioLocks,
}

#[derive(Default)]
struct SchedulerState {
    running: bool,
    cancel_tx: Option<watch::Sender<bool>>,
    tasks: JoinSet<()>,
}

/// Refreshes the NAV of every portfolio on a fixed interval.
///
/// Must be started from within a Tokio runtime. `stop` cancels pending sleeps
/// and waits for every spawned task before returning.
pub struct NavScheduler {
    core: Arc<SchedulerCore>,
    state: Mutex<SchedulerState>,
}

impl NavScheduler {
    pub fn new(
        portfolio_service: Arc<dyn PortfolioServiceTrait>,
        portfolio_repository: Arc<dyn PortfolioRepositoryTrait>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            core: Arc::new(SchedulerCore {
                portfolio_service,
                portfolio_repository,
                config,
                metrics: Mutex::new(SchedulerMetrics::default()),
                portfolio_locks: PortfolioLocks::new(),
            }),
            state: Mutex::new(SchedulerState::default()),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.core.config
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().map(|s| s.running).unwrap_or(false)
    }

    /// Starts the periodic timer and kicks off one cycle right away.
    pub fn start(&self) -> Result<()> {
        let mut state = self.state.lock()?;
        if state.running {
            return Err(SchedulerError::AlreadyRunning.into());
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);

        let core = self.core.clone();
        let timer_cancel = cancel_rx.clone();
        state.tasks.spawn(async move { core.run_timer(timer_cancel).await });

        let core = self.core.clone();
        state
            .tasks
            .spawn(async move { core.run_logged_cycle(cancel_rx).await });

        state.running = true;
        state.cancel_tx = Some(cancel_tx);
        self.core.metrics().is_running = true;

        info!(
            "NAV scheduler started (every {:?}, batches of {}, {} attempts per portfolio)",
            self.core.config.update_interval,
            self.core.config.batch_size,
            self.core.config.max_retries
        );
        Ok(())
    }

    /// Cancels the timer and in-flight cycles, then waits for them to exit.
    pub async fn stop(&self) -> Result<()> {
        let mut tasks = {
            let mut state = self.state.lock()?;
            if !state.running {
                return Err(SchedulerError::NotRunning.into());
            }
            state.running = false;
            if let Some(cancel_tx) = state.cancel_tx.take() {
                let _ = cancel_tx.send(true);
            }
            std::mem::take(&mut state.tasks)
        };

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!("NAV scheduler task ended abnormally: {}", e);
            }
        }

        let metrics = {
            let mut metrics = self.core.metrics();
            metrics.is_running = false;
            metrics.clone()
        };
        info!(
            "NAV scheduler stopped ({} successful, {} failed updates)",
            metrics.success_count, metrics.error_count
        );
        Ok(())
    }

    /// Spawns an extra full cycle without waiting for it.
    pub fn force_update(&self) -> Result<()> {
        let mut state = self.state.lock()?;
        let cancel_rx = match (&state.cancel_tx, state.running) {
            (Some(cancel_tx), true) => cancel_tx.subscribe(),
            _ => return Err(SchedulerError::NotRunning.into()),
        };

        while let Some(joined) = state.tasks.try_join_next() {
            if let Err(e) = joined {
                warn!("NAV scheduler task ended abnormally: {}", e);
            }
        }

        info!("Forced NAV update requested");
        let core = self.core.clone();
        state
            .tasks
            .spawn(async move { core.run_logged_cycle(cancel_rx).await });
        Ok(())
    }

    /// Runs one full cycle and waits for it.
    pub async fn run_full_update(&self) -> Result<CycleSummary> {
        let (_keepalive, cancel_rx) = self.cancel_receiver();
        self.core.run_full_update(cancel_rx).await
    }

    /// Updates one portfolio with the usual retry policy and waits for it.
    pub async fn update_single_portfolio(&self, portfolio_id: &str) -> Result<NavHistory> {
        let (_keepalive, cancel_rx) = self.cancel_receiver();
        self.core.update_with_retries(portfolio_id, cancel_rx).await
    }

    pub fn get_metrics(&self) -> SchedulerMetrics {
        self.core.metrics().clone()
    }

    /// Tasks spawned by `start` and `force_update` that have not been reaped.
    pub fn pending_tasks(&self) -> usize {
        self.state.lock().map(|s| s.tasks.len()).unwrap_or(0)
    }

    /// Portfolios whose update currently holds or awaits a per-portfolio lock.
    pub fn locked_portfolios(&self) -> usize {
        self.core.portfolio_locks.len()
    }

    /// Receiver tied to the running scheduler, or a private never-cancelled
    /// channel when stopped. The returned sender keeps that channel open.
    fn cancel_receiver(&self) -> (Option<watch::Sender<bool>>, watch::Receiver<bool>) {
        let running_rx = self.state.lock().ok().and_then(|state| {
            state
                .cancel_tx
                .as_ref()
                .filter(|_| state.running)
                .map(|tx| tx.subscribe())
        });
        match running_rx {
            Some(rx) => (None, rx),
            None => {
                let (tx, rx) = watch::channel(false);
                (Some(tx), rx)
            }
        }
    }
}

impl SchedulerCore {
    fn metrics(&self) -> MutexGuard<'_, SchedulerMetrics> {
        self.metrics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn run_timer(self: Arc<Self>, cancel: watch::Receiver<bool>) {
        let mut shutdown = cancel.clone();
        let mut ticker = interval(self.config.update_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; start() already ran that cycle.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.clone().run_logged_cycle(cancel.clone()).await;
                }
                _ = cancelled(&mut shutdown) => break,
            }
        }
        debug!("NAV scheduler timer exited");
    }

    async fn run_logged_cycle(self: Arc<Self>, cancel: watch::Receiver<bool>) {
        match self.run_full_update(cancel).await {
            Ok(_) => {}
            Err(Error::Scheduler(SchedulerError::Cancelled)) => {
                info!("NAV update cycle cancelled");
            }
            Err(e) => warn!("NAV update cycle finished with errors: {}", e),
        }
    }

    async fn run_full_update(&self, cancel: watch::Receiver<bool>) -> Result<CycleSummary> {
        let portfolio_ids = self.portfolio_repository.get_all_portfolio_ids()?;
        self.metrics().total_portfolios = portfolio_ids.len();
        info!("Starting NAV update for {} portfolios", portfolio_ids.len());

        let mut summary = CycleSummary::default();
        for (index, batch) in portfolio_ids
            .chunks(self.config.batch_size.max(1))
            .enumerate()
        {
            if index > 0 {
                let mut delay_cancel = cancel.clone();
                if sleep_or_cancelled(self.config.batch_delay, &mut delay_cancel).await {
                    return Err(SchedulerError::Cancelled.into());
                }
            }
            if *cancel.borrow() {
                return Err(SchedulerError::Cancelled.into());
            }

            let outcomes = self.process_batch(batch, &cancel).await;
            summary.batches += 1;
            for (portfolio_id, outcome) in batch.iter().zip(outcomes) {
                match outcome {
                    Ok(_) => summary.success_count += 1,
                    Err(Error::Scheduler(SchedulerError::Cancelled)) => {
                        return Err(SchedulerError::Cancelled.into());
                    }
                    Err(e) => {
                        summary.error_count += 1;
                        summary.errors.push(format!("{}: {}", portfolio_id, e));
                    }
                }
            }
            debug!(
                "NAV batch {} done ({} portfolios)",
                summary.batches,
                batch.len()
            );
        }

        info!(
            "NAV update cycle complete: {} batches, {} updated, {} failed",
            summary.batches, summary.success_count, summary.error_count
        );

        if summary.error_count > 0 {
            return Err(SchedulerError::UpdateFailed {
                failed: summary.error_count,
                message: summary.errors.join("; "),
            }
            .into());
        }
        Ok(summary)
    }

    /// Updates every portfolio of the batch concurrently.
    async fn process_batch(
        &self,
        batch: &[String],
        cancel: &watch::Receiver<bool>,
    ) -> Vec<Result<NavHistory>> {
        join_all(
            batch
                .iter()
                .map(|portfolio_id| self.update_with_retries(portfolio_id, cancel.clone())),
        )
        .await
    }

    async fn update_with_retries(
        &self,
        portfolio_id: &str,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<NavHistory> {
        let _guard = self.portfolio_locks.lock(portfolio_id).await;

        let attempts = self.config.max_retries.max(1);
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            if *cancel.borrow() {
                return Err(SchedulerError::Cancelled.into());
            }

            match self.portfolio_service.update_portfolio_nav(portfolio_id).await {
                Ok(nav) => {
                    let mut metrics = self.metrics();
                    metrics.success_count += 1;
                    metrics.last_update = Some(Utc::now());
                    return Ok(nav);
                }
                Err(e) => {
                    warn!(
                        "NAV update for portfolio {} failed (attempt {}/{}): {}",
                        portfolio_id, attempt, attempts, e
                    );
                    last_error = e.to_string();
                }
            }

            if attempt < attempts && sleep_or_cancelled(self.config.retry_delay, &mut cancel).await
            {
                return Err(SchedulerError::Cancelled.into());
            }
        }

        let message = format!(
            "portfolio {} failed after {} attempts: {}",
            portfolio_id, attempts, last_error
        );
        {
            let mut metrics = self.metrics();
            metrics.error_count += 1;
            metrics.last_error = Some(message.clone());
        }
        Err(SchedulerError::UpdateFailed { failed: 1, message }.into())
    }
}

/// Sleeps for `duration` unless cancelled first. Returns whether cancellation
/// was observed.
async fn sleep_or_cancelled(duration: Duration, cancel: &mut watch::Receiver<bool>) -> bool {
    if *cancel.borrow() {
        return true;
    }
    if duration.is_zero() {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => *cancel.borrow(),
        _ = cancelled(cancel) => true,
    }
}

/// Resolves once cancellation is signalled or the scheduler handle is gone.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let _ = cancel.wait_for(|cancelled| *cancelled).await;
}
