mod repository;

pub use repository::StockRepository;
