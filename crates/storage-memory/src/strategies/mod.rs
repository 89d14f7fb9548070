mod repository;

pub use repository::StrategyRepository;
