use std::convert::Infallible;

use actix_web::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use actix_web::web::Bytes;
use actix_web::{HttpResponse, get, web};
use futures::stream;
use tracing::debug;

use crate::state::AppState;

/// Live event stream
///
/// The subscription guard lives inside the stream state, so the subscriber is
/// removed as soon as actix drops the body on disconnect.
#[get("/events")]
pub async fn events_route(state: web::Data<AppState>) -> HttpResponse {
    let (subscription, rx) = state.bus.subscribe_channel();
    debug!(
        subscriber = ?subscription.handle(),
        subscribers = state.bus.subscriber_count(),
        "Event stream opened"
    );

    let body = stream::unfold((subscription, rx), |(subscription, mut rx)| async move {
        let frame = rx.recv().await?;
        Some((Ok::<_, Infallible>(Bytes::from(frame.to_sse())), (subscription, rx)))
    });

    HttpResponse::Ok()
        .insert_header((CONTENT_TYPE, "text/event-stream"))
        .insert_header((CACHE_CONTROL, "no-cache"))
        .streaming(body)
}
