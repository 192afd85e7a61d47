//! Server-Sent Events stream of view changes

use super::server::AppContext;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};
use uuid::Uuid;

/// GET /api/v1/events
pub async fn event_stream(
    State(ctx): State<AppContext>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let client = Uuid::new_v4();
    debug!(%client, "SSE client connected");

    let stream = BroadcastStream::new(ctx.state.subscribe_events()).filter_map(move |result| async move {
        match result {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => Some(Ok(Event::default()
                    .id(Uuid::new_v4().to_string())
                    .event(event.event_type())
                    .data(json))),
                Err(e) => {
                    warn!("Failed to serialize feed event: {}", e);
                    None
                }
            },
            Err(e) => {
                // Lagged receivers skip ahead
                warn!(%client, "SSE stream error: {:?}", e);
                None
            }
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
