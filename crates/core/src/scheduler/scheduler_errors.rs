use thiserror::Error;

/// Errors raised by the NAV scheduler.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchedulerError {
    #[error("NAV scheduler is already running")]
    AlreadyRunning,

    #[error("NAV scheduler is not running")]
    NotRunning,

    #[error("NAV update cancelled")]
    Cancelled,

    /// One or more portfolios exhausted their retries.
    #[error("{failed} portfolio NAV update(s) failed: {message}")]
    UpdateFailed { failed: usize, message: String },
}
