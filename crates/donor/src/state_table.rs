use reshard_core::DonorState;

use crate::error::{DonorError, Result};

/// Legal moves between donor states.
///
/// The success path is strictly ordered. Every state before `Error` may be
/// abandoned for `Error`, and `Error` only ever leads to `Done`.
pub struct DonorStateTable;

impl DonorStateTable {
    pub fn validate_transition(from: DonorState, to: DonorState) -> Result<()> {
        if Self::allowed_transitions(from).contains(&to) {
            Ok(())
        } else {
            Err(DonorError::invalid_transition(from, to))
        }
    }

    pub fn allowed_transitions(from: DonorState) -> Vec<DonorState> {
        match from {
            DonorState::Unused => vec![DonorState::PreparingToDonate, DonorState::Error],
            DonorState::PreparingToDonate => {
                vec![DonorState::DonatingInitialData, DonorState::Error]
            }
            DonorState::DonatingInitialData => {
                vec![DonorState::DonatingOplogEntries, DonorState::Error]
            }
            DonorState::DonatingOplogEntries => vec![DonorState::BlockingWrites, DonorState::Error],
            DonorState::BlockingWrites => vec![DonorState::Done, DonorState::Error],
            DonorState::Error => vec![DonorState::Done],
            DonorState::Done => vec![],
        }
    }

    pub fn can_transition(from: DonorState, to: DonorState) -> bool {
        Self::validate_transition(from, to).is_ok()
    }

    /// Next state on the success path.
    pub fn next_state(current: DonorState) -> Option<DonorState> {
        match current {
            DonorState::Unused => Some(DonorState::PreparingToDonate),
            DonorState::PreparingToDonate => Some(DonorState::DonatingInitialData),
            DonorState::DonatingInitialData => Some(DonorState::DonatingOplogEntries),
            DonorState::DonatingOplogEntries => Some(DonorState::BlockingWrites),
            DonorState::BlockingWrites | DonorState::Error => Some(DonorState::Done),
            DonorState::Done => None,
        }
    }
}
