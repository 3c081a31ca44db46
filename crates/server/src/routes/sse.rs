use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::state::AppState;

pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 1000;
pub const SSE_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize, IntoParams)]
pub struct EventsQuery {
    /// Comma-separated resharding UUIDs; events for other operations are skipped
    pub resharding_uuids: Option<String>,
}

/// Recent envelopes kept for clients reconnecting with `Last-Event-ID`.
pub struct EventBuffer {
    events: VecDeque<events::EventEnvelope>,
    max_size: usize,
}

impl EventBuffer {
    pub fn new(max_size: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    pub fn push(&mut self, envelope: events::EventEnvelope) {
        if self.events.iter().any(|e| e.id == envelope.id) {
            return;
        }
        if self.events.len() >= self.max_size {
            self.events.pop_front();
        }
        self.events.push_back(envelope);
    }

    pub fn events_after(&self, event_id: Uuid) -> Vec<events::EventEnvelope> {
        self.events
            .iter()
            .skip_while(|envelope| envelope.id != event_id)
            .skip(1)
            .cloned()
            .collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.events.len()
    }
}

pub type SharedEventBuffer = Arc<RwLock<EventBuffer>>;

fn parse_resharding_uuids(ids: Option<&str>) -> Option<Vec<Uuid>> {
    ids.map(|s| {
        s.split(',')
            .filter_map(|id| id.trim().parse().ok())
            .collect()
    })
}

fn matches_filter(envelope: &events::EventEnvelope, filter: Option<&[Uuid]>) -> bool {
    match (filter, envelope.event.resharding_uuid()) {
        (Some(ids), Some(id)) => ids.contains(&id),
        _ => true,
    }
}

fn event_type(event: &events::Event) -> &'static str {
    match event {
        events::Event::DonorInstanceCreated { .. } => "donor.instance_created",
        events::Event::DonorStateChanged { .. } => "donor.state_changed",
        events::Event::OplogMarkerWritten { .. } => "donor.marker_written",
        events::Event::DonorCompleted { .. } => "donor.completed",
        events::Event::CoordinatorFieldsChanged { .. } => "coordinator.fields_changed",
        events::Event::RoleChanged { .. } => "replication.role_changed",
        events::Event::Error { .. } => "error",
    }
}

fn envelope_to_sse_event(envelope: &events::EventEnvelope) -> Result<Event, Infallible> {
    let data = serde_json::to_string(&envelope).unwrap_or_else(|_| "{}".to_string());

    Ok(Event::default()
        .id(envelope.id.to_string())
        .event(event_type(&envelope.event))
        .data(data))
}

#[utoipa::path(
    get,
    path = "/api/events",
    params(EventsQuery),
    responses(
        (status = 200, description = "SSE event stream"),
    ),
    tag = "events"
)]
pub async fn events_stream(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
    headers: axum::http::HeaderMap,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let filter = parse_resharding_uuids(query.resharding_uuids.as_deref());
    let last_event_id = headers
        .get("Last-Event-ID")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<Uuid>().ok());

    let buffer = Arc::clone(&state.event_buffer);
    let buffer_for_live = Arc::clone(&buffer);

    let rx = state.event_bus.subscribe();

    let missed_events: Vec<_> = match last_event_id {
        Some(event_id) => buffer
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .events_after(event_id)
            .into_iter()
            .filter(|e| matches_filter(e, filter.as_deref()))
            .collect(),
        None => vec![],
    };

    let missed_stream =
        futures::stream::iter(missed_events.into_iter().map(|e| envelope_to_sse_event(&e)));

    let live_stream = BroadcastStream::new(rx).filter_map(move |result| {
        let filter = filter.clone();
        let buffer = Arc::clone(&buffer_for_live);

        async move {
            match result {
                Ok(envelope) => {
                    buffer
                        .write()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .push(envelope.clone());

                    if !matches_filter(&envelope, filter.as_deref()) {
                        return None;
                    }

                    Some(envelope_to_sse_event(&envelope))
                }
                Err(e) => {
                    tracing::warn!("SSE broadcast error: {:?}", e);
                    None
                }
            }
        }
    });

    let stream = missed_stream.chain(live_stream);

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(SSE_KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
}
