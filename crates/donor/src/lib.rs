//! Donor side of a collection resharding operation.
//!
//! A [`DonorService`] keeps one [`DonorStateMachine`] per in-flight operation
//! while this shard is primary. Each machine walks the donor phase table,
//! leaves fence and final-op markers in the oplog, and finally drops or keeps
//! the source collection depending on how the operation ended.

mod completion;
mod config;
mod context;
mod error;
mod external_state;
mod hooks;
mod marker_writer;
mod service;
mod state_machine;
mod state_table;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
mod watcher;

pub use completion::{CompletionFuture, DonorOutcome};
pub use config::DonorServiceConfig;
pub use context::DonorContext;
pub use error::{DonorError, Result};
pub use external_state::{ExternalState, ShardExternalState};
pub use hooks::{NoopTransitionHook, TransitionHook};
pub use marker_writer::{OplogMarkerWriter, FENCE_NAMESPACE, FINAL_OP_TYPE};
pub use service::DonorService;
pub use state_machine::DonorStateMachine;
pub use state_table::DonorStateTable;
pub use watcher::{CoordinatorFieldWatcher, RoutingOutcome};
