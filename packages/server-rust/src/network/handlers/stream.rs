//! Server-sent event relay endpoint.

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use callwire_core::CallId;
use futures_util::stream::{self, Stream};
use tracing::info;

use super::AppState;
use crate::call::StreamRelay;
use crate::network::error::ApiError;

/// `GET /stream/{call_id}` -- attaches the single consumer to a call's
/// event queue and relays it as SSE.
///
/// Each SSE message carries the event's `type` discriminant as the event
/// name and the full JSON body as data. The stream ends after the terminal
/// event, or after the relay synthesizes its timeout error. A second
/// concurrent attach is rejected with a conflict; the slot is released when
/// this stream is dropped.
pub async fn stream_handler(
    State(state): State<AppState>,
    Path(call_id): Path<CallId>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let relay = StreamRelay::open(state.engine.registry(), &call_id, state.engine.config())?;
    let guard = state.shutdown.stream_guard();
    info!(call_id = %call_id, "stream attached");

    let events = stream::unfold((relay, guard), |(mut relay, guard)| async move {
        let event = relay.next_event().await?;
        let item = Event::default()
            .event(event.event_name())
            .json_data(&event);
        Some((item, (relay, guard)))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
