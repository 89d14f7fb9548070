//! Quote-related error types.

use thiserror::Error;

/// Errors that can occur while fetching market data.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketDataError {
    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("No quote found for {0}")]
    NotFound(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Timeout: {0}")]
    Timeout(String),
}
