//! In-memory storage implementation for Stratfolio.
//!
//! This crate implements the repository traits defined in `stratfolio-core`
//! on top of lock-guarded maps and provides a static quote source. It contains:
//! - The shared in-memory tables (`MemoryDb`)
//! - Repository implementations for strategies, stocks, signals and portfolios
//! - A static, manually priced quote source
//! - JSON seed loading for demos and tests
//!
//! ```text
//!        core (domain)
//!              │
//!              ▼
//!   storage-memory (this crate)
//!              │
//!              ▼
//!     RwLock<Tables> + seed file
//! ```

pub mod db;
pub mod errors;
pub mod seed;

// Repository implementations
pub mod portfolio;
pub mod quotes;
pub mod stocks;
pub mod strategies;

pub use db::{MemoryDb, MemoryStorage};
pub use errors::StorageError;
pub use portfolio::PortfolioRepository;
pub use quotes::StaticQuoteSource;
pub use seed::{load_seed_file, PortfolioSeed, SeedData};
pub use stocks::StockRepository;
pub use strategies::StrategyRepository;

// Re-export from stratfolio-core for convenience
pub use stratfolio_core::errors::{DatabaseError, Error, Result};
