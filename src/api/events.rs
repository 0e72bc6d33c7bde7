//! Server-Sent Events stream of run completions
//!
//! Each connection is one live subscription for one site. The first event is
//! always `connected`; every run ingested for the site afterwards arrives as
//! `run_completed`. Nothing is replayed after a reconnect.

use std::convert::Infallible;

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{Stream, StreamExt};
use tracing::{debug, error};

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::EventsQuery,
};
use crate::live::LiveEvent;

const CONNECTED_MESSAGE: &str = "Connected to monitoring events";

/// GET /api/v1/events?siteId=
pub async fn events_handler(
    State(state): State<ApiState>,
    Query(query): Query<EventsQuery>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let site_id = query.site_id;
    if state.store.get_site(site_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("site not found: {site_id}")));
    }

    let subscription = state.bus.subscribe(site_id);
    debug!(site_id, "event stream opened");

    let stream = subscription
        .into_stream()
        .filter_map(|event| async move { to_sse(&event).map(Ok::<_, Infallible>) });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn to_sse(event: &LiveEvent) -> Option<Event> {
    let data = match event {
        LiveEvent::Connected { .. } => CONNECTED_MESSAGE.to_string(),
        LiveEvent::RunCompleted(payload) => match serde_json::to_string(payload) {
            Ok(json) => json,
            Err(e) => {
                error!("failed to serialize live event: {}", e);
                return None;
            }
        },
    };

    Some(Event::default().event(event.name()).data(data))
}
