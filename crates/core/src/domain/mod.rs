mod catalog;
mod coordinator;
mod donor;
mod namespace;
mod oplog;

pub use catalog::*;
pub use coordinator::*;
pub use donor::*;
pub use namespace::*;
pub use oplog::*;
