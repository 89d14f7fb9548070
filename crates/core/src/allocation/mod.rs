//! Strategy-weighted allocation of an investment across Buy-signalled stocks.

mod allocation_engine;
mod allocation_model;
mod constraints_validator;
mod preview_cache;


pub use allocation_engine::*;
pub use allocation_model::*;
pub use constraints_validator::*;
pub use preview_cache::AllocationPreviewCache;
