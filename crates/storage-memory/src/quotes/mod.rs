mod static_source;

pub use static_source::{StaticQuoteSource, STATIC_QUOTE_SOURCE};
