use actix_web::body::{EitherBody, MessageBody};
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use actix_web::middleware::Next;
use actix_web::{Error, HttpResponse, web};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use pulseboard_service::config::Auth;
use tracing::debug;

use crate::state::AppState;

const REALM: &str = "Basic realm=\"Restricted Area\"";

/// Routes reachable without credentials
const PUBLIC_PATHS: &[&str] = &["/health"];

/// Basic auth credential pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: password.into() }
    }

    /// `None` when either half is missing or empty, which disables the gate
    pub fn from_config(auth: &Auth) -> Option<Self> {
        auth.credentials().map(|(username, password)| Self::new(username, password))
    }

    /// Check an `Authorization` header value
    pub fn authorizes(&self, header: Option<&str>) -> bool {
        let Some(encoded) = header.and_then(|h| h.strip_prefix("Basic ")) else {
            return false;
        };
        let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
            return false;
        };
        let Ok(decoded) = String::from_utf8(decoded) else {
            return false;
        };

        match decoded.split_once(':') {
            Some((username, password)) => username == self.username && password == self.password,
            None => false,
        }
    }
}

/// Basic auth gate for every route except the public ones
pub async fn basic_auth<B: MessageBody + 'static>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<EitherBody<B>>, Error> {
    let credentials = req
        .app_data::<web::Data<AppState>>()
        .and_then(|state| state.credentials.clone());

    let allowed = match &credentials {
        None => true,
        Some(_) if PUBLIC_PATHS.contains(&req.path()) => true,
        Some(credentials) => {
            let header = req.headers().get(AUTHORIZATION).and_then(|h| h.to_str().ok());
            credentials.authorizes(header)
        }
    };

    if allowed {
        return next.call(req).await.map(ServiceResponse::map_into_left_body);
    }

    debug!(path = req.path(), "Rejected unauthenticated request");
    let response = HttpResponse::Unauthorized()
        .insert_header((WWW_AUTHENTICATE, REALM))
        .body("Unauthorized");
    Ok(req.into_response(response).map_into_right_body())
}
