use actix_web::web;

use crate::error::ApiError;

mod api;
mod health;


use health::health_route;

macros_utils::routes! {
    route health_route,
    scope "/api" => api,
}

/// Malformed JSON bodies are answered in the same `{"message"}` shape as other errors
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(16 * 1024)
        .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into())
}
