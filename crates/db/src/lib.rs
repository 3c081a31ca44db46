mod error;
pub mod models;
mod pool;
pub mod repositories;
mod retry;

pub use error::*;
pub use models::{CoordinatorDonorReport, OplogQuery};
pub use pool::*;
pub use repositories::*;
pub use retry::write_conflict_retry;
pub use sqlx::SqlitePool;
