//! Accès PostgreSQL: pool, retry, transactions de lot

pub mod client;
pub mod error;
pub mod pool;
pub mod postgres;
pub mod retry;
pub mod transaction;

pub use client::{StoreClient, SystemStatus};
pub use error::StoreError;
pub use pool::{create_pool, DatabaseConfig, SslMode};
pub use postgres::PostgresSink;
pub use retry::RetryPolicy;
pub use transaction::{BatchOutcome, ItemFailure, ItemWritten};
