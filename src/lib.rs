pub mod indexer;
pub mod metrics;
pub mod models;
pub mod protocols;
pub mod storage;
pub mod utils;
