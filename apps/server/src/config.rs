use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use stratfolio_core::scheduler::SchedulerConfig;

pub struct Config {
    /// JSON seed loaded into the in-memory store at startup.
    pub seed_file: Option<PathBuf>,
    pub scheduler: SchedulerConfig,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Absent or unparsable values fall
    /// back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = SchedulerConfig::default();
        let parsed = |key: &str| -> Option<u64> { parse(&lookup, key) };

        let seed_file = lookup("SF_SEED_FILE")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        let scheduler = SchedulerConfig {
            update_interval: parsed("SF_NAV_INTERVAL_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.update_interval),
            batch_size: parse(&lookup, "SF_NAV_BATCH_SIZE")
                .filter(|size| *size > 0)
                .unwrap_or(defaults.batch_size),
            batch_delay: parsed("SF_NAV_BATCH_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.batch_delay),
            max_retries: parse(&lookup, "SF_NAV_MAX_RETRIES")
                .filter(|retries| *retries > 0)
                .unwrap_or(defaults.max_retries),
            retry_delay: parsed("SF_NAV_RETRY_DELAY_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.retry_delay),
        };

        Self {
            seed_file,
            scheduler,
        }
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|value| value.trim().parse().ok())
}
