//! Market quotes and the injected quote source.

mod errors;
mod quotes_model;
mod quotes_traits;

pub use errors::MarketDataError;
pub use quotes_model::*;
pub use quotes_traits::*;
