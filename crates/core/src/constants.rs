use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;

/// Percent scale used by strategy weights and per-stock limits.
pub const ONE_HUNDRED: Decimal = dec!(100);

/// Days per year used by the linear annualized-return estimate.
pub const DAYS_PER_YEAR: Decimal = dec!(365);

/// Lifetime of a memoized allocation preview. Market data older than this is stale.
pub const PREVIEW_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Aggregate realized allocation below this share of the investment (percent) is reported.
pub const LOW_ALLOCATION_RATIO_PERCENT: Decimal = dec!(80);

/// A single holding above this share of the investment (percent) is a concentration risk.
pub const CONCENTRATION_RISK_PERCENT: Decimal = dec!(40);

/// Decimal places kept on displayed weights and percentages.
pub const PERCENT_SCALE: u32 = 4;

/// Largest rounding residue normalization folds back into an allocation.
pub const NORMALIZATION_RESIDUE_TOLERANCE: Decimal = dec!(0.000001);

// NAV scheduler defaults
pub const DEFAULT_NAV_UPDATE_INTERVAL: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_NAV_BATCH_SIZE: usize = 10;
pub const DEFAULT_NAV_BATCH_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_NAV_MAX_RETRIES: u32 = 3;
pub const DEFAULT_NAV_RETRY_DELAY: Duration = Duration::from_secs(30);
