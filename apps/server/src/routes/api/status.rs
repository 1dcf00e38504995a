use actix_web::{HttpResponse, get, web};
use pulseboard_service::database::Target;
use pulseboard_service::monitoring::CycleSnapshot;
use serde::Serialize;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    interval_ms: u64,
    #[serde(flatten)]
    cycle: CycleSnapshot,
    targets: Vec<Target>,
}

/// Snapshot for a freshly loaded page, before the event stream catches up
#[get("/status")]
pub async fn status_route(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let targets = state.store.list_targets().await?;

    Ok(HttpResponse::Ok().json(StatusResponse {
        interval_ms: state.cycle.interval().as_millis() as u64,
        cycle: state.cycle.snapshot(),
        targets,
    }))
}
