//! Strategies: named, weighted rules that spread cash over a pool of stocks.

mod strategies_model;
mod strategies_traits;

pub use strategies_model::*;
pub use strategies_traits::*;
