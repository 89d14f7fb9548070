use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_NAV_BATCH_DELAY, DEFAULT_NAV_BATCH_SIZE, DEFAULT_NAV_MAX_RETRIES,
    DEFAULT_NAV_RETRY_DELAY, DEFAULT_NAV_UPDATE_INTERVAL,
};

/// Timing and batching knobs of the NAV scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub update_interval: Duration,
    /// Portfolios updated concurrently within one batch.
    pub batch_size: usize,
    /// Pause between consecutive batches.
    pub batch_delay: Duration,
    /// Total attempts per portfolio and cycle, the first one included.
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            update_interval: DEFAULT_NAV_UPDATE_INTERVAL,
            batch_size: DEFAULT_NAV_BATCH_SIZE,
            batch_delay: DEFAULT_NAV_BATCH_DELAY,
            max_retries: DEFAULT_NAV_MAX_RETRIES,
            retry_delay: DEFAULT_NAV_RETRY_DELAY,
        }
    }
}

/// Cumulative scheduler counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerMetrics {
    pub is_running: bool,
    pub success_count: u64,
    pub error_count: u64,
    /// Portfolio count seen by the most recent cycle.
    pub total_portfolios: usize,
    pub last_update: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Outcome of one full update cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleSummary {
    pub batches: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub errors: Vec<String>,
}
