use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
};
use tokio_stream::{Stream, StreamExt, wrappers::BroadcastStream};
use tracing::warn;

use crate::app::services::AppServices;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Server-sent stream of committed request events.
///
/// Lossy: a subscriber that falls behind skips what it missed.
pub async fn stream(
    Extension(services): Extension<Arc<AppServices>>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let stream = BroadcastStream::new(services.subscribe()).filter_map(|msg| match msg {
        Ok(notification) => match SseEvent::default()
            .event(notification.event_type.clone())
            .json_data(&notification)
        {
            Ok(event) => Some(Ok(event)),
            Err(err) => {
                warn!(error = %err, "failed to encode notification");
                None
            }
        },
        Err(err) => {
            warn!(error = %err, "notification stream lagged");
            None
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
