use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal_macros::dec;

use super::*;
use crate::allocation::{AllocationPreview, AllocationRequest};
use crate::errors::{Error, Result};
use crate::portfolio::{
    CreatePortfolioRequest, NavHistory, PerformanceMetrics, Portfolio, PortfolioRepositoryTrait,
    PortfolioServiceTrait, Position, RebalanceRequest, RebalanceResult,
};

// --- Mock NAV updater: counts attempts and tracks concurrency ---
#[derive(Clone, Default)]
struct MockNavService {
    /// Portfolio id -> number of leading attempts that fail. `u32::MAX` never succeeds.
    failures: Arc<Mutex<HashMap<String, u32>>>,
    attempts: Arc<Mutex<HashMap<String, u32>>>,
    in_flight: Arc<Mutex<usize>>,
    max_in_flight: Arc<Mutex<usize>>,
    in_flight_per_portfolio: Arc<Mutex<HashMap<String, usize>>>,
    max_in_flight_per_portfolio: Arc<Mutex<usize>>,
    work: Duration,
}

impl MockNavService {
    fn with_work(work: Duration) -> Self {
        Self {
            work,
            ..Self::default()
        }
    }

    fn fail(&self, portfolio_id: &str, times: u32) {
        self.failures
            .lock()
            .unwrap()
            .insert(portfolio_id.to_string(), times);
    }

    fn attempts(&self, portfolio_id: &str) -> u32 {
        *self.attempts.lock().unwrap().get(portfolio_id).unwrap_or(&0)
    }

    fn total_attempts(&self) -> u32 {
        self.attempts.lock().unwrap().values().sum()
    }

    fn enter(&self, portfolio_id: &str) -> u32 {
        {
            let mut in_flight = self.in_flight.lock().unwrap();
            *in_flight += 1;
            let mut max = self.max_in_flight.lock().unwrap();
            *max = (*max).max(*in_flight);
        }
        {
            let mut per = self.in_flight_per_portfolio.lock().unwrap();
            let count = per.entry(portfolio_id.to_string()).or_insert(0);
            *count += 1;
            let mut max = self.max_in_flight_per_portfolio.lock().unwrap();
            *max = (*max).max(*count);
        }
        let mut attempts = self.attempts.lock().unwrap();
        let attempt = attempts.entry(portfolio_id.to_string()).or_insert(0);
        *attempt += 1;
        *attempt
    }

    fn leave(&self, portfolio_id: &str) {
        *self.in_flight.lock().unwrap() -= 1;
        if let Some(count) = self
            .in_flight_per_portfolio
            .lock()
            .unwrap()
            .get_mut(portfolio_id)
        {
            *count -= 1;
        }
    }
}

#[async_trait]
impl PortfolioServiceTrait for MockNavService {
    async fn generate_allocation_preview(
        &self,
        _request: &AllocationRequest,
    ) -> Result<AllocationPreview> {
        unimplemented!()
    }

    async fn generate_allocation_preview_with_exclusions(
        &self,
        _request: &AllocationRequest,
        _new_exclusions: &[String],
    ) -> Result<AllocationPreview> {
        unimplemented!()
    }

    async fn create_portfolio(&self, _request: CreatePortfolioRequest) -> Result<Portfolio> {
        unimplemented!()
    }

    async fn update_portfolio_nav(&self, portfolio_id: &str) -> Result<NavHistory> {
        let attempt = self.enter(portfolio_id);
        if !self.work.is_zero() {
            tokio::time::sleep(self.work).await;
        }
        self.leave(portfolio_id);

        let failing = *self
            .failures
            .lock()
            .unwrap()
            .get(portfolio_id)
            .unwrap_or(&0);
        if attempt <= failing {
            return Err(Error::Unexpected(format!("quote feed down for {}", portfolio_id)));
        }
        Ok(NavHistory {
            id: format!("nav-{}-{}", portfolio_id, attempt),
            portfolio_id: portfolio_id.to_string(),
            timestamp: Utc::now(),
            nav: dec!(1000),
            pnl: dec!(0),
            drawdown: Some(dec!(0)),
        })
    }

    async fn generate_rebalance_preview(
        &self,
        _portfolio_id: &str,
        _request: &RebalanceRequest,
    ) -> Result<AllocationPreview> {
        unimplemented!()
    }

    async fn rebalance_portfolio(
        &self,
        _portfolio_id: &str,
        _request: &RebalanceRequest,
    ) -> Result<RebalanceResult> {
        unimplemented!()
    }

    fn get_portfolio_performance_metrics(&self, _portfolio_id: &str) -> Result<PerformanceMetrics> {
        unimplemented!()
    }

    fn get_portfolio(&self, _portfolio_id: &str) -> Result<Portfolio> {
        unimplemented!()
    }

    fn get_user_portfolios(&self, _user_id: &str) -> Result<Vec<Portfolio>> {
        unimplemented!()
    }

    fn get_positions(&self, _portfolio_id: &str) -> Result<Vec<Position>> {
        unimplemented!()
    }

    fn get_nav_history(&self, _portfolio_id: &str) -> Result<Vec<NavHistory>> {
        unimplemented!()
    }
}

// --- Mock repository: only the id listing is used ---
struct MockPortfolioIds {
    ids: Vec<String>,
}

impl MockPortfolioIds {
    fn count(n: usize) -> Self {
        Self {
            ids: (1..=n).map(|i| format!("p{}", i)).collect(),
        }
    }
}

#[async_trait]
impl PortfolioRepositoryTrait for MockPortfolioIds {
    fn get_portfolio(&self, _portfolio_id: &str) -> Result<Portfolio> {
        unimplemented!()
    }

    fn get_portfolios_by_user(&self, _user_id: &str) -> Result<Vec<Portfolio>> {
        unimplemented!()
    }

    fn get_all_portfolio_ids(&self) -> Result<Vec<String>> {
        Ok(self.ids.clone())
    }

    fn get_positions(&self, _portfolio_id: &str) -> Result<Vec<Position>> {
        unimplemented!()
    }

    fn get_nav_history(&self, _portfolio_id: &str) -> Result<Vec<NavHistory>> {
        unimplemented!()
    }

    async fn create_portfolio(
        &self,
        _portfolio: Portfolio,
        _positions: Vec<Position>,
        _initial_nav: NavHistory,
    ) -> Result<Portfolio> {
        unimplemented!()
    }

    async fn update_portfolio(&self, _portfolio: Portfolio) -> Result<Portfolio> {
        unimplemented!()
    }

    async fn insert_position(&self, _position: Position) -> Result<Position> {
        unimplemented!()
    }

    async fn update_position(&self, _position: Position) -> Result<Position> {
        unimplemented!()
    }

    async fn append_nav_history(&self, _entry: NavHistory) -> Result<NavHistory> {
        unimplemented!()
    }
}

fn fast_config(batch_size: usize) -> SchedulerConfig {
    SchedulerConfig {
        update_interval: Duration::from_secs(3600),
        batch_size,
        batch_delay: Duration::from_millis(5),
        max_retries: 3,
        retry_delay: Duration::ZERO,
    }
}

fn scheduler(service: &MockNavService, portfolios: usize, config: SchedulerConfig) -> NavScheduler {
    NavScheduler::new(
        Arc::new(service.clone()),
        Arc::new(MockPortfolioIds::count(portfolios)),
        config,
    )
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

#[test]
fn default_config_uses_documented_values() {
    let config = SchedulerConfig::default();
    assert_eq!(config.update_interval, Duration::from_secs(15 * 60));
    assert_eq!(config.batch_size, 10);
    assert_eq!(config.batch_delay, Duration::from_secs(1));
    assert_eq!(config.max_retries, 3);
    assert_eq!(config.retry_delay, Duration::from_secs(30));
}

#[tokio::test]
async fn five_portfolios_in_batches_of_two_run_as_three_batches() {
    let service = MockNavService::with_work(Duration::from_millis(10));
    let scheduler = scheduler(&service, 5, fast_config(2));

    let summary = scheduler.run_full_update().await.unwrap();

    assert_eq!(summary.batches, 3);
    assert_eq!(summary.success_count, 5);
    assert_eq!(summary.error_count, 0);
    assert!(*service.max_in_flight.lock().unwrap() <= 2);

    let metrics = scheduler.get_metrics();
    assert_eq!(metrics.total_portfolios, 5);
    assert_eq!(metrics.success_count, 5);
    assert!(metrics.last_update.is_some());
    assert_eq!(scheduler.locked_portfolios(), 0);
}

#[tokio::test]
async fn one_failing_portfolio_does_not_abort_the_cycle() {
    let service = MockNavService::default();
    service.fail("p3", u32::MAX);
    let scheduler = scheduler(&service, 4, fast_config(10));

    let result = scheduler.run_full_update().await;

    match result {
        Err(Error::Scheduler(SchedulerError::UpdateFailed { failed, message })) => {
            assert_eq!(failed, 1);
            assert!(message.contains("p3"));
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(service.attempts("p3"), 3);
    for id in ["p1", "p2", "p4"] {
        assert_eq!(service.attempts(id), 1);
    }

    let metrics = scheduler.get_metrics();
    assert_eq!(metrics.success_count, 3);
    assert_eq!(metrics.error_count, 1);
    assert!(metrics.last_error.unwrap().contains("p3"));
}

#[tokio::test]
async fn transient_failures_recover_within_the_attempt_budget() {
    let service = MockNavService::default();
    service.fail("p1", 2);
    let scheduler = scheduler(&service, 1, fast_config(10));

    let nav = scheduler.update_single_portfolio("p1").await.unwrap();

    assert_eq!(nav.portfolio_id, "p1");
    assert_eq!(service.attempts("p1"), 3);
    assert_eq!(scheduler.get_metrics().error_count, 0);
}

#[tokio::test]
async fn updates_for_the_same_portfolio_are_serialized() {
    let service = MockNavService::with_work(Duration::from_millis(20));
    let scheduler = scheduler(&service, 1, fast_config(10));

    let (a, b, c) = tokio::join!(
        scheduler.update_single_portfolio("p1"),
        scheduler.update_single_portfolio("p1"),
        scheduler.update_single_portfolio("p1"),
    );

    assert!(a.is_ok() && b.is_ok() && c.is_ok());
    assert_eq!(*service.max_in_flight_per_portfolio.lock().unwrap(), 1);
    assert_eq!(scheduler.locked_portfolios(), 0);
}

#[tokio::test]
async fn start_and_stop_follow_the_lifecycle() {
    let service = MockNavService::default();
    let scheduler = scheduler(&service, 3, fast_config(10));

    assert!(matches!(
        scheduler.stop().await,
        Err(Error::Scheduler(SchedulerError::NotRunning))
    ));
    assert!(matches!(
        scheduler.force_update(),
        Err(Error::Scheduler(SchedulerError::NotRunning))
    ));

    scheduler.start().unwrap();
    assert!(scheduler.is_running());
    assert!(scheduler.get_metrics().is_running);
    assert!(matches!(
        scheduler.start(),
        Err(Error::Scheduler(SchedulerError::AlreadyRunning))
    ));

    // start() runs one cycle immediately.
    wait_until(|| service.total_attempts() == 3).await;

    scheduler.stop().await.unwrap();
    assert!(!scheduler.is_running());
    assert!(!scheduler.get_metrics().is_running);

    // A stopped scheduler can be started again.
    scheduler.start().unwrap();
    scheduler.force_update().unwrap();
    wait_until(|| service.total_attempts() >= 6).await;
    scheduler.stop().await.unwrap();
    assert_eq!(scheduler.get_metrics().error_count, 0);
}

#[tokio::test]
async fn forced_updates_reap_finished_cycles() {
    let service = MockNavService::default();
    let scheduler = scheduler(&service, 2, fast_config(10));

    scheduler.start().unwrap();
    wait_until(|| service.total_attempts() == 2).await;

    for round in 2..=6u32 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        scheduler.force_update().unwrap();
        wait_until(|| service.total_attempts() == round * 2).await;
    }

    tokio::time::sleep(Duration::from_millis(10)).await;
    // The timer plus at most the latest cycle remain tracked.
    assert!(scheduler.pending_tasks() <= 2);
    assert_eq!(scheduler.locked_portfolios(), 0);
    scheduler.stop().await.unwrap();
    assert_eq!(scheduler.pending_tasks(), 0);
}

#[tokio::test]
async fn stop_interrupts_retry_sleeps() {
    let service = MockNavService::default();
    service.fail("p1", u32::MAX);
    let config = SchedulerConfig {
        retry_delay: Duration::from_secs(3600),
        ..fast_config(10)
    };
    let scheduler = scheduler(&service, 1, config);

    scheduler.start().unwrap();
    wait_until(|| service.attempts("p1") == 1).await;

    tokio::time::timeout(Duration::from_secs(2), scheduler.stop())
        .await
        .expect("stop should not wait for the retry delay")
        .unwrap();

    assert_eq!(service.attempts("p1"), 1);
    // A cancelled update is not counted as a failure.
    assert_eq!(scheduler.get_metrics().error_count, 0);
}

#[tokio::test]
async fn metrics_serialize_in_camel_case() {
    let service = MockNavService::default();
    let scheduler = scheduler(&service, 2, fast_config(10));
    scheduler.run_full_update().await.unwrap();

    let json = serde_json::to_value(scheduler.get_metrics()).unwrap();
    assert_eq!(json["successCount"], 2);
    assert_eq!(json["isRunning"], false);
    assert_eq!(json["totalPortfolios"], 2);
}
