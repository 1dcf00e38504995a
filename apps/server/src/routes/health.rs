use actix_web::{HttpResponse, Responder, get};

/// Health check route
/// This route returns no content, the response status is enough.
/// It stays reachable when basic auth is enabled.
#[get("/health")]
pub async fn health_route() -> impl Responder {
    HttpResponse::Ok()
}
