use std::sync::Arc;
use std::time::Duration;

use db::{open_store, CatalogRepository, OplogQuery, OplogRepository, SqlitePool};
use donor::testing::{ExternalCall, ExternalStateForTest, StateTransitionController};
use donor::{
    CoordinatorFieldWatcher, DonorContext, DonorError, DonorOutcome, DonorService,
    DonorStateMachine, RoutingOutcome, FENCE_NAMESPACE,
};
use events::{Event, EventBus};
use reshard_core::{
    CoordinatorPhaseNotification, CoordinatorState, DonorState, DonorStateDocument,
    NamespaceString, OpType, ShardId,
};
use serde_json::json;
use tempfile::TempDir;
use uuid::Uuid;

const WAIT: Duration = Duration::from_secs(10);

struct Harness {
    service: Arc<DonorService>,
    controller: Arc<StateTransitionController>,
    external: Arc<ExternalStateForTest>,
    pool: SqlitePool,
    _dir: TempDir,
}

impl Harness {
    async fn new() -> Self {
        Self::with_bus(None).await
    }

    async fn with_bus(bus: Option<EventBus>) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let db_url = format!("sqlite:{}", dir.path().join("donor.db").display());
        let pool = open_store(&db_url).await.unwrap();

        let external = Arc::new(ExternalStateForTest::new(ShardId::new("myShardId").unwrap()));
        let controller = StateTransitionController::new();
        let mut ctx = DonorContext::new(pool.clone(), external.clone())
            .with_transition_hook(controller.clone());
        if let Some(bus) = bus {
            ctx = ctx.with_event_bus(bus);
        }

        let service = Arc::new(DonorService::new(ctx));
        service.step_up().await.unwrap();

        Self {
            service,
            controller,
            external,
            pool,
            _dir: dir,
        }
    }

    fn catalog(&self) -> CatalogRepository {
        CatalogRepository::new(self.pool.clone())
    }

    async fn create_source_collection(&self, doc: &DonorStateDocument) {
        self.catalog()
            .create_collection(&doc.source_nss, doc.source_uuid)
            .await
            .unwrap();
    }

    async fn source_collection_uuid(&self, doc: &DonorStateDocument) -> Option<Uuid> {
        self.catalog()
            .find_by_ns(&doc.source_nss)
            .await
            .unwrap()
            .map(|entry| entry.uuid)
    }

    async fn persisted(&self, doc: &DonorStateDocument) -> DonorStateDocument {
        self.service
            .context()
            .donor_repo
            .find_by_id(doc.resharding_uuid)
            .await
            .unwrap()
            .expect("donor document missing")
    }

    async fn oplog_for(&self, ns: &str) -> Vec<reshard_core::OplogEntry> {
        OplogRepository::new(self.pool.clone())
            .find(&OplogQuery::for_ns(ns))
            .await
            .unwrap()
    }
}

fn make_state_document() -> DonorStateDocument {
    DonorStateDocument::new(
        Uuid::new_v4(),
        NamespaceString::parse("sourcedb.sourcecollection").unwrap(),
        Uuid::new_v4(),
        json!({"newKey": 1}),
        ["recipient1", "recipient2", "recipient3"]
            .iter()
            .map(|s| ShardId::new(*s).unwrap())
            .collect(),
    )
    .unwrap()
}

fn notify(donor: &DonorStateMachine, doc: &DonorStateDocument, state: CoordinatorState) {
    donor.on_coordinator_phase_change(CoordinatorPhaseNotification::for_document(doc, state));
}

fn notify_recipients_done_cloning(donor: &DonorStateMachine, doc: &DonorStateDocument) {
    notify(donor, doc, CoordinatorState::Applying);
}

fn notify_to_start_blocking_writes(donor: &DonorStateMachine, doc: &DonorStateDocument) {
    notify(donor, doc, CoordinatorState::BlockingWrites);
}

fn notify_resharding_committing(donor: &DonorStateMachine, doc: &DonorStateDocument) {
    notify(donor, doc, CoordinatorState::DecisionPersisted);
}

fn notify_resharding_aborting(donor: &DonorStateMachine, doc: &DonorStateDocument) {
    notify(donor, doc, CoordinatorState::Error);
}

async fn outcome(donor: &DonorStateMachine) -> DonorOutcome {
    tokio::time::timeout(WAIT, donor.completion_future().wait())
        .await
        .expect("donor did not complete in time")
}

async fn wait_for_transition(controller: &StateTransitionController, state: DonorState) {
    tokio::time::timeout(WAIT, controller.wait(state))
        .await
        .expect("donor never reached the paused transition");
}

fn assert_interrupted(result: DonorOutcome) {
    match result {
        Err(e) => assert!(e.is_interrupted(), "expected interruption, got {}", e),
        Ok(()) => panic!("expected interruption, donor succeeded"),
    }
}

#[tokio::test]
async fn test_can_transition_through_each_state_to_completion() {
    let h = Harness::new().await;
    let doc = make_state_document();

    h.service.insert_state_document(&doc).await.unwrap();
    let donor = h.service.get_or_create(&doc).await.unwrap();

    notify_recipients_done_cloning(&donor, &doc);
    notify_to_start_blocking_writes(&donor, &doc);
    notify_resharding_committing(&donor, &doc);

    outcome(&donor).await.unwrap();
    assert_eq!(donor.current_state(), DonorState::Done);
    assert_eq!(h.persisted(&doc).await.state(), DonorState::Done);
    assert_eq!(
        h.external.reported_states(),
        vec![
            DonorState::DonatingInitialData,
            DonorState::DonatingOplogEntries,
            DonorState::BlockingWrites,
            DonorState::Done,
        ]
    );
}

#[tokio::test]
async fn test_writes_no_op_oplog_entry_to_generate_min_fetch_timestamp() {
    let h = Harness::new().await;
    h.controller.pause(DonorState::DonatingInitialData);

    let doc = make_state_document();
    h.service.insert_state_document(&doc).await.unwrap();
    let donor = h.service.get_or_create(&doc).await.unwrap();

    wait_for_transition(&h.controller, DonorState::DonatingInitialData).await;
    h.service.step_down();
    h.controller.unset(DonorState::DonatingInitialData);

    assert_interrupted(outcome(&donor).await);

    let entries = h.oplog_for(FENCE_NAMESPACE).await;
    assert_eq!(entries.len(), 1, "expected exactly one fence entry: {:?}", entries);
    let op = &entries[0];
    assert_eq!(op.op_type, OpType::Noop);
    assert!(op.uuid.is_none());
    assert!(op.object["msg"].is_string());
    assert!(op.object2.is_none());
    assert!(op.destined_recipient.is_none());

    // The transition itself never landed.
    assert_eq!(h.persisted(&doc).await.state(), DonorState::PreparingToDonate);
}

#[tokio::test]
async fn test_writes_final_reshard_op_oplog_entries_while_writes_blocked() {
    let h = Harness::new().await;
    h.controller.pause(DonorState::BlockingWrites);

    let doc = make_state_document();
    h.service.insert_state_document(&doc).await.unwrap();
    let donor = h.service.get_or_create(&doc).await.unwrap();

    notify_recipients_done_cloning(&donor, &doc);
    notify_to_start_blocking_writes(&donor, &doc);

    wait_for_transition(&h.controller, DonorState::BlockingWrites).await;
    h.service.step_down();
    h.controller.unset(DonorState::BlockingWrites);

    assert_interrupted(outcome(&donor).await);

    let entries = h.oplog_for(doc.source_nss.as_str()).await;
    assert_eq!(entries.len(), doc.recipient_shards.len());
    for (op, recipient) in entries.iter().zip(&doc.recipient_shards) {
        assert_eq!(op.op_type, OpType::Noop);
        assert_eq!(op.uuid, Some(doc.source_uuid));
        assert_eq!(op.destined_recipient.as_ref(), Some(recipient));
        assert!(op.object["msg"].is_string());
        assert_eq!(
            op.object2,
            Some(json!({
                "type": "reshardFinalOp",
                "reshardingUUID": doc.resharding_uuid.to_string(),
            }))
        );
    }
}

#[tokio::test]
async fn test_step_down_step_up_each_transition() {
    let h = Harness::new().await;
    let donor_states = [
        DonorState::DonatingInitialData,
        DonorState::DonatingOplogEntries,
        DonorState::BlockingWrites,
        DonorState::Done,
    ];
    h.controller.pause_all(&donor_states);

    let doc = make_state_document();
    h.service.insert_state_document(&doc).await.unwrap();

    let mut prev_state = DonorState::Unused;
    for state in donor_states {
        let donor = h.service.get_or_create(&doc).await.unwrap();

        if prev_state != DonorState::Unused {
            // Let this instance finish the transition the previous one was
            // stopped at.
            h.controller.unset(prev_state);
        }

        match state {
            DonorState::DonatingOplogEntries => notify_recipients_done_cloning(&donor, &doc),
            DonorState::BlockingWrites => notify_to_start_blocking_writes(&donor, &doc),
            DonorState::Done => notify_resharding_committing(&donor, &doc),
            _ => {}
        }

        wait_for_transition(&h.controller, state).await;
        h.service.step_down();

        assert_interrupted(outcome(&donor).await);
        prev_state = state;

        h.service.step_up().await.unwrap();
    }

    let donor = h.service.get_or_create(&doc).await.unwrap();
    h.controller.unset(DonorState::Done);
    notify_resharding_committing(&donor, &doc);
    outcome(&donor).await.unwrap();

    let persisted = h.persisted(&doc).await;
    assert_eq!(persisted.state(), DonorState::Done);
    assert_eq!(h.oplog_for(FENCE_NAMESPACE).await.len(), 1);
    assert_eq!(
        h.oplog_for(doc.source_nss.as_str()).await.len(),
        doc.recipient_shards.len()
    );
}

#[tokio::test]
async fn test_drops_source_collection_when_done() {
    let h = Harness::new().await;
    let doc = make_state_document();
    h.create_source_collection(&doc).await;

    h.service.insert_state_document(&doc).await.unwrap();
    let donor = h.service.get_or_create(&doc).await.unwrap();

    notify_recipients_done_cloning(&donor, &doc);
    notify_to_start_blocking_writes(&donor, &doc);

    assert_eq!(h.source_collection_uuid(&doc).await, Some(doc.source_uuid));

    notify_resharding_committing(&donor, &doc);
    outcome(&donor).await.unwrap();

    assert_eq!(h.source_collection_uuid(&doc).await, None);
}

#[tokio::test]
async fn test_completes_with_stepdown_after_error() {
    let h = Harness::new().await;
    h.controller.pause(DonorState::Done);

    let doc = make_state_document();
    h.create_source_collection(&doc).await;
    h.service.insert_state_document(&doc).await.unwrap();
    {
        let donor = h.service.get_or_create(&doc).await.unwrap();

        notify_recipients_done_cloning(&donor, &doc);
        notify_resharding_aborting(&donor, &doc);

        wait_for_transition(&h.controller, DonorState::Done).await;
        h.service.step_down();

        assert_interrupted(outcome(&donor).await);
    }
    assert_eq!(h.persisted(&doc).await.state(), DonorState::Error);

    h.service.step_up().await.unwrap();
    {
        let donor = h.service.get_or_create(&doc).await.unwrap();
        h.controller.unset(DonorState::Done);

        notify_resharding_aborting(&donor, &doc);
        outcome(&donor).await.unwrap();

        // The source collection survives the abort and the failover.
        assert_eq!(h.source_collection_uuid(&doc).await, Some(doc.source_uuid));
    }
}

#[tokio::test]
async fn test_retains_source_collection_on_error() {
    let h = Harness::new().await;
    let doc = make_state_document();
    h.create_source_collection(&doc).await;

    h.service.insert_state_document(&doc).await.unwrap();
    let donor = h.service.get_or_create(&doc).await.unwrap();

    notify_recipients_done_cloning(&donor, &doc);
    notify_to_start_blocking_writes(&donor, &doc);

    assert_eq!(h.source_collection_uuid(&doc).await, Some(doc.source_uuid));

    notify_resharding_aborting(&donor, &doc);
    outcome(&donor).await.unwrap();

    assert_eq!(h.source_collection_uuid(&doc).await, Some(doc.source_uuid));

    let persisted = h.persisted(&doc).await;
    assert_eq!(persisted.state(), DonorState::Done);
    assert!(persisted.mutable_state.abort_reason.is_some());
}

#[tokio::test]
async fn test_min_fetch_timestamp_is_fence_position() {
    let h = Harness::new().await;
    let doc = make_state_document();

    h.service.insert_state_document(&doc).await.unwrap();
    let donor = h.service.get_or_create(&doc).await.unwrap();
    notify_recipients_done_cloning(&donor, &doc);
    notify_to_start_blocking_writes(&donor, &doc);
    notify_resharding_committing(&donor, &doc);
    outcome(&donor).await.unwrap();

    let fence = h.oplog_for(FENCE_NAMESPACE).await;
    assert_eq!(
        h.persisted(&doc).await.mutable_state.min_fetch_timestamp,
        Some(fence[0].ts)
    );
}

#[tokio::test]
async fn test_abort_reason_is_recorded() {
    let h = Harness::new().await;
    let doc = make_state_document();

    h.service.insert_state_document(&doc).await.unwrap();
    let donor = h.service.get_or_create(&doc).await.unwrap();
    donor.on_coordinator_phase_change(
        CoordinatorPhaseNotification::for_document(&doc, CoordinatorState::Error)
            .with_abort_reason("recipient failed to clone"),
    );
    outcome(&donor).await.unwrap();

    let persisted = h.persisted(&doc).await;
    assert_eq!(persisted.state(), DonorState::Done);
    assert_eq!(
        persisted.mutable_state.abort_reason.as_deref(),
        Some("recipient failed to clone")
    );
    assert!(h.external.reported_states().contains(&DonorState::Error));
}

#[tokio::test]
async fn test_get_or_create_requires_primary() {
    let h = Harness::new().await;
    let doc = make_state_document();
    h.service.step_down();

    let err = h.service.get_or_create(&doc).await.unwrap_err();
    assert!(matches!(err, DonorError::NotPrimary));
    assert!(h.service.lookup(doc.resharding_uuid).is_none());
}

#[tokio::test]
async fn test_get_or_create_reuses_instance_and_inserts_missing_document() {
    let h = Harness::new().await;
    h.controller.pause(DonorState::DonatingInitialData);
    let doc = make_state_document();

    let first = h.service.get_or_create(&doc).await.unwrap();
    let second = h.service.get_or_create(&doc).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(h.persisted(&doc).await.state(), DonorState::PreparingToDonate);

    let mut conflicting = doc.clone();
    conflicting.source_uuid = Uuid::new_v4();
    let err = h.service.get_or_create(&conflicting).await.unwrap_err();
    assert!(matches!(err, DonorError::ConflictingDocument { .. }));

    // After failover the persisted document is still the reference.
    h.service.step_down();
    h.service.step_up().await.unwrap();
    let err = h.service.get_or_create(&conflicting).await.unwrap_err();
    assert!(matches!(err, DonorError::ConflictingDocument { .. }));
    h.controller.unset(DonorState::DonatingInitialData);
}

#[tokio::test]
async fn test_watcher_routes_by_resharding_uuid() {
    let h = Harness::new().await;
    h.controller.pause(DonorState::DonatingOplogEntries);
    let watcher = CoordinatorFieldWatcher::new(Arc::clone(&h.service));

    let doc = make_state_document();
    h.service.insert_state_document(&doc).await.unwrap();
    let donor = h.service.get_or_create(&doc).await.unwrap();

    let applying = CoordinatorPhaseNotification::for_document(&doc, CoordinatorState::Applying);
    assert_eq!(watcher.on_fields_changed(&applying), RoutingOutcome::Delivered);
    assert_eq!(watcher.on_fields_changed(&applying), RoutingOutcome::Duplicate);

    let mut bare = applying.clone();
    bare.donor_fields = None;
    assert_eq!(watcher.on_fields_changed(&bare), RoutingOutcome::Ignored);

    let unknown = CoordinatorPhaseNotification::for_document(
        &make_state_document(),
        CoordinatorState::Applying,
    );
    assert_eq!(watcher.on_fields_changed(&unknown), RoutingOutcome::NoInstance);

    wait_for_transition(&h.controller, DonorState::DonatingOplogEntries).await;
    assert_eq!(donor.coordinator_state(), Some(CoordinatorState::Applying));

    // An older phase never overrides a newer one.
    let blocking =
        CoordinatorPhaseNotification::for_document(&doc, CoordinatorState::BlockingWrites);
    assert_eq!(watcher.on_fields_changed(&blocking), RoutingOutcome::Delivered);
    assert_eq!(watcher.on_fields_changed(&applying), RoutingOutcome::Duplicate);
    h.controller.unset(DonorState::DonatingOplogEntries);
}

#[tokio::test]
async fn test_watcher_listens_on_event_bus() {
    let bus = EventBus::new();
    let h = Harness::with_bus(Some(bus.clone())).await;
    let watcher = CoordinatorFieldWatcher::new(Arc::clone(&h.service));
    let listener = watcher.listen(&bus);
    let mut events = bus.subscribe();

    let doc = make_state_document();
    h.service.insert_state_document(&doc).await.unwrap();
    let donor = h.service.get_or_create(&doc).await.unwrap();

    for state in [
        CoordinatorState::Applying,
        CoordinatorState::BlockingWrites,
        CoordinatorState::DecisionPersisted,
    ] {
        bus.emit(Event::CoordinatorFieldsChanged {
            notification: CoordinatorPhaseNotification::for_document(&doc, state),
        });
    }
    outcome(&donor).await.unwrap();
    listener.abort();

    let mut saw_completion = false;
    while let Ok(envelope) = events.try_recv() {
        if let Event::DonorCompleted {
            resharding_uuid,
            success,
            ..
        } = envelope.event
        {
            assert_eq!(resharding_uuid, doc.resharding_uuid);
            assert!(success);
            saw_completion = true;
        }
    }
    assert!(saw_completion);
}

async fn wait_until<F>(what: &str, mut check: F)
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(WAIT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {}", what));
}

#[tokio::test]
async fn test_resumed_donor_reports_state_missed_before_failover() {
    let h = Harness::new().await;
    h.external.fail_next_report(DonorState::DonatingInitialData);

    let doc = make_state_document();
    h.service.insert_state_document(&doc).await.unwrap();
    let donor = h.service.get_or_create(&doc).await.unwrap();

    // The state is committed even though the coordinator never heard of it.
    let err = outcome(&donor).await.unwrap_err();
    assert!(matches!(*err, DonorError::ExternalState(_)));
    let persisted = h.persisted(&doc).await;
    assert_eq!(persisted.state(), DonorState::DonatingInitialData);
    assert!(!h.external.reported_states().contains(&DonorState::DonatingInitialData));

    h.service.step_down();
    h.service.step_up().await.unwrap();

    let fence_ts = persisted.mutable_state.min_fetch_timestamp.unwrap();
    wait_until("DonatingInitialData to be reported", || {
        h.external.reported_min_fetch_timestamps(DonorState::DonatingInitialData) == vec![fence_ts]
    })
    .await;

    let donor = h.service.get_or_create(&doc).await.unwrap();
    notify_recipients_done_cloning(&donor, &doc);
    notify_to_start_blocking_writes(&donor, &doc);
    notify_resharding_committing(&donor, &doc);
    outcome(&donor).await.unwrap();
    assert_eq!(h.oplog_for(FENCE_NAMESPACE).await.len(), 1);
}

#[tokio::test]
async fn test_finished_donors_leave_the_registry() {
    let h = Harness::new().await;

    for _ in 0..5 {
        let doc = make_state_document();
        h.service.insert_state_document(&doc).await.unwrap();
        let donor = h.service.get_or_create(&doc).await.unwrap();
        notify_resharding_aborting(&donor, &doc);
        outcome(&donor).await.unwrap();
    }

    wait_until("finished donors to be evicted", || h.service.instances().is_empty()).await;
}

#[tokio::test]
async fn test_reaped_operation_gets_a_fresh_instance() {
    let h = Harness::new().await;
    let doc = make_state_document();
    h.service.insert_state_document(&doc).await.unwrap();
    let first = h.service.get_or_create(&doc).await.unwrap();
    notify_resharding_aborting(&first, &doc);
    outcome(&first).await.unwrap();

    h.service
        .context()
        .donor_repo
        .delete(doc.resharding_uuid)
        .await
        .unwrap();
    h.service.forget(doc.resharding_uuid);
    assert!(h.service.lookup(doc.resharding_uuid).is_none());

    h.controller.pause(DonorState::DonatingInitialData);
    h.service.insert_state_document(&doc).await.unwrap();
    let second = h.service.get_or_create(&doc).await.unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    wait_for_transition(&h.controller, DonorState::DonatingInitialData).await;
    assert_eq!(second.current_state(), DonorState::PreparingToDonate);
    assert!(second.document().mutable_state.abort_reason.is_none());
    h.controller.unset(DonorState::DonatingInitialData);
}

#[tokio::test]
async fn test_step_down_before_error_is_persisted() {
    let h = Harness::new().await;
    h.controller.pause(DonorState::Error);

    let doc = make_state_document();
    h.create_source_collection(&doc).await;
    h.service.insert_state_document(&doc).await.unwrap();
    {
        let donor = h.service.get_or_create(&doc).await.unwrap();
        notify_resharding_aborting(&donor, &doc);

        wait_for_transition(&h.controller, DonorState::Error).await;
        h.service.step_down();

        assert_interrupted(outcome(&donor).await);
    }
    assert_ne!(h.persisted(&doc).await.state(), DonorState::Error);

    h.service.step_up().await.unwrap();
    {
        let donor = h.service.get_or_create(&doc).await.unwrap();
        h.controller.unset(DonorState::Error);

        notify_resharding_aborting(&donor, &doc);
        outcome(&donor).await.unwrap();
    }

    let persisted = h.persisted(&doc).await;
    assert_eq!(persisted.state(), DonorState::Done);
    assert!(persisted.mutable_state.abort_reason.is_some());
    assert_eq!(h.source_collection_uuid(&doc).await, Some(doc.source_uuid));
    assert!(h.oplog_for(doc.source_nss.as_str()).await.is_empty());
}

#[tokio::test]
async fn test_abort_while_waiting_for_temporary_collection() {
    let h = Harness::new().await;
    h.external.hold_collection_flush();

    let doc = make_state_document();
    h.create_source_collection(&doc).await;
    h.service.insert_state_document(&doc).await.unwrap();
    let donor = h.service.get_or_create(&doc).await.unwrap();

    wait_until("the donor to wait on the collection flush", || {
        h.external
            .calls()
            .iter()
            .any(|call| matches!(call, ExternalCall::WaitForCollectionFlush(_)))
    })
    .await;
    assert_eq!(donor.current_state(), DonorState::PreparingToDonate);

    donor.on_coordinator_phase_change(
        CoordinatorPhaseNotification::for_document(&doc, CoordinatorState::Error)
            .with_abort_reason("recipient never created the collection"),
    );
    outcome(&donor).await.unwrap();

    let persisted = h.persisted(&doc).await;
    assert_eq!(persisted.state(), DonorState::Done);
    assert_eq!(
        persisted.mutable_state.abort_reason.as_deref(),
        Some("recipient never created the collection")
    );
    assert_eq!(persisted.mutable_state.min_fetch_timestamp, None);
    assert!(h.oplog_for(FENCE_NAMESPACE).await.is_empty());
    assert_eq!(h.source_collection_uuid(&doc).await, Some(doc.source_uuid));
    assert_eq!(
        h.external.reported_states(),
        vec![DonorState::Error, DonorState::Done]
    );
    h.external.release_collection_flush();
}

#[tokio::test]
async fn test_single_recipient_final_op_written_once_across_failover() {
    let h = Harness::new().await;
    h.controller.pause(DonorState::BlockingWrites);

    let mut doc = make_state_document();
    doc.recipient_shards.truncate(1);
    h.service.insert_state_document(&doc).await.unwrap();
    {
        let donor = h.service.get_or_create(&doc).await.unwrap();
        notify_recipients_done_cloning(&donor, &doc);
        notify_to_start_blocking_writes(&donor, &doc);

        wait_for_transition(&h.controller, DonorState::BlockingWrites).await;
        assert_eq!(h.oplog_for(doc.source_nss.as_str()).await.len(), 1);
        h.service.step_down();

        assert_interrupted(outcome(&donor).await);
    }
    assert_eq!(h.persisted(&doc).await.state(), DonorState::DonatingOplogEntries);

    h.service.step_up().await.unwrap();
    {
        let donor = h.service.get_or_create(&doc).await.unwrap();
        h.controller.unset(DonorState::BlockingWrites);
        notify_to_start_blocking_writes(&donor, &doc);
        notify_resharding_committing(&donor, &doc);
        outcome(&donor).await.unwrap();
    }

    let final_ops = h.oplog_for(doc.source_nss.as_str()).await;
    assert_eq!(final_ops.len(), 1);
    assert_eq!(final_ops[0].destined_recipient, Some(doc.recipient_shards[0].clone()));
    assert_eq!(final_ops[0].uuid, Some(doc.source_uuid));
}
