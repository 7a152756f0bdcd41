//! HTTP handlers.

pub mod admin;
pub mod auth;
pub mod health;

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};

use crate::api::APP_USER_AGENT;

/// Root responds with the service identity and no body.
pub async fn root() -> (StatusCode, HeaderMap) {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(APP_USER_AGENT) {
        headers.insert(header::SERVER, value);
    }
    (StatusCode::OK, headers)
}
