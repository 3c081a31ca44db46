use chrono::{DateTime, Utc};
use reshard_core::{CoordinatorPhaseNotification, DonorState, ShardId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping all events with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event: Event,
}

impl EventEnvelope {
    pub fn new(event: Event) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    // Donor events
    /// A donor instance was built from its state document
    #[serde(rename = "donor.instance_created")]
    DonorInstanceCreated {
        resharding_uuid: Uuid,
        state: DonorState,
    },

    /// A donor persisted a new state
    #[serde(rename = "donor.state_changed")]
    DonorStateChanged {
        resharding_uuid: Uuid,
        from_state: DonorState,
        to_state: DonorState,
    },

    /// A fence or final-op marker is durable in the oplog
    #[serde(rename = "donor.marker_written")]
    OplogMarkerWritten {
        resharding_uuid: Uuid,
        ts: i64,
        destined_recipient: Option<ShardId>,
    },

    /// A donor's completion future resolved
    #[serde(rename = "donor.completed")]
    DonorCompleted {
        resharding_uuid: Uuid,
        success: bool,
        error: Option<String>,
    },

    // Coordinator events
    /// The coordinator reported a new phase for an operation
    #[serde(rename = "coordinator.fields_changed")]
    CoordinatorFieldsChanged {
        notification: CoordinatorPhaseNotification,
    },

    // Replication events
    #[serde(rename = "replication.role_changed")]
    RoleChanged { primary: bool },

    // System events
    /// Generic error event
    #[serde(rename = "error")]
    Error {
        message: String,
        context: Option<String>,
    },
}

impl Event {
    /// The resharding operation this event belongs to, if any
    pub fn resharding_uuid(&self) -> Option<Uuid> {
        match self {
            Event::DonorInstanceCreated { resharding_uuid, .. }
            | Event::DonorStateChanged { resharding_uuid, .. }
            | Event::OplogMarkerWritten { resharding_uuid, .. }
            | Event::DonorCompleted { resharding_uuid, .. } => Some(*resharding_uuid),
            Event::CoordinatorFieldsChanged { notification } => Some(notification.resharding_uuid),
            Event::RoleChanged { .. } | Event::Error { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reshard_core::CoordinatorState;

    #[test]
    fn test_event_envelope_creation() {
        let envelope = EventEnvelope::new(Event::RoleChanged { primary: true });

        assert!(!envelope.id.is_nil());
        assert!(envelope.timestamp <= Utc::now());
    }

    #[test]
    fn test_state_changed_serialization() {
        let event = Event::DonorStateChanged {
            resharding_uuid: Uuid::new_v4(),
            from_state: DonorState::DonatingOplogEntries,
            to_state: DonorState::BlockingWrites,
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "donor.state_changed");
        assert_eq!(json["to_state"], serde_json::to_value(DonorState::BlockingWrites).unwrap());
    }

    #[test]
    fn test_fields_changed_deserialization() {
        let id = Uuid::new_v4();
        let json = serde_json::json!({
            "type": "coordinator.fields_changed",
            "notification": {
                "reshardingUUID": id,
                "state": serde_json::to_value(CoordinatorState::Applying).unwrap(),
            }
        });

        let event: Event = serde_json::from_value(json).unwrap();
        match &event {
            Event::CoordinatorFieldsChanged { notification } => {
                assert_eq!(notification.state, CoordinatorState::Applying);
                assert!(notification.donor_fields.is_none());
            }
            _ => panic!("Wrong event type"),
        }
        assert_eq!(event.resharding_uuid(), Some(id));
    }

    #[test]
    fn test_event_resharding_uuid() {
        let id = Uuid::new_v4();
        let event = Event::DonorCompleted {
            resharding_uuid: id,
            success: true,
            error: None,
        };
        assert_eq!(event.resharding_uuid(), Some(id));

        let error_event = Event::Error {
            message: "test".to_string(),
            context: None,
        };
        assert_eq!(error_event.resharding_uuid(), None);
    }
}
