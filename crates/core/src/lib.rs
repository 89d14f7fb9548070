//! Stratfolio Core - allocation engine, constraint validation, portfolio
//! orchestration and the NAV refresh scheduler.
//!
//! This crate is storage-agnostic. It defines the repository and quote source
//! traits that adapter crates (e.g. `storage-memory`) implement.

pub mod allocation;
pub mod constants;
pub mod errors;
pub mod portfolio;
pub mod quotes;
pub mod scheduler;
pub mod stocks;
pub mod strategies;

// Re-export the most used domain types
pub use allocation::*;
pub use portfolio::*;

// Re-export error types
pub use errors::Error;
pub use errors::Result;
