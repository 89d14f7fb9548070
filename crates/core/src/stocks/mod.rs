//! Stocks and their daily Buy/Hold signals.

mod stocks_model;
mod stocks_traits;

pub use stocks_model::*;
pub use stocks_traits::*;
