use actix_web::{HttpResponse, delete, get, post, web};
use pulseboard_service::validation::validate_target_url;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteUrl {
    id: Uuid,
}

/// Every target with its last known result
#[get("/urls")]
pub async fn list_urls(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let urls = state.store.list_targets().await?;
    Ok(HttpResponse::Ok().json(json!({ "urls": urls })))
}

/// Add a target. It is picked up by the next cycle.
#[post("/urls")]
pub async fn create_url(
    state: web::Data<AppState>,
    body: web::Json<CreateUrl>,
) -> Result<HttpResponse, ApiError> {
    let url = validate_target_url(&body.url).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let target = state.store.create_target(url.as_str()).await?;

    info!(target_id = %target.id, url = %target.url, "Target added");
    Ok(HttpResponse::Created().json(json!({ "url": target })))
}

#[delete("/urls")]
pub async fn delete_url(
    state: web::Data<AppState>,
    body: web::Json<DeleteUrl>,
) -> Result<HttpResponse, ApiError> {
    if !state.store.delete_target(body.id).await? {
        return Err(ApiError::NotFound);
    }

    info!(target_id = %body.id, "Target removed");
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}
