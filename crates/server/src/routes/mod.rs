pub mod collections;
pub mod coordinator;
pub mod donors;
mod health;
pub mod oplog;
pub mod replication;
pub mod sse;

pub use health::*;
