pub mod block_data;
pub mod common;
pub mod errors;
