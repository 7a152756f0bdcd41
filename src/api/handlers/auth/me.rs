//! Current-user projection.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;

use super::types::user_json;
use crate::api::response::success;
use crate::auth::AuthState;

/// Return the authenticated caller's public profile.
#[utoipa::path(
    get,
    path = "/auth/me",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Caller profile"),
        (status = 401, description = "Missing or invalid bearer token")
    ),
    tag = "auth"
)]
pub async fn me(headers: HeaderMap, state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    match state.principal().resolve_required(&headers).await {
        Ok(principal) => success(StatusCode::OK, "OK", Some(user_json(&principal.user))),
        Err(err) => err.into_response(),
    }
}
