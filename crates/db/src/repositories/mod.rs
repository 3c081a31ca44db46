mod catalog_repository;
mod coordinator_repository;
mod donor_state_repository;
mod oplog_repository;

pub use catalog_repository::*;
pub use coordinator_repository::*;
pub use donor_state_repository::*;
pub use oplog_repository::*;
