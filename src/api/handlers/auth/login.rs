//! Login, logout, and refresh.

use axum::{
    extract::{ConnectInfo, Extension},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::{net::SocketAddr, sync::Arc};

use super::request_context;
use super::types::{token_pair_json, LoginRequest, RefreshRequest};
use crate::api::response::{failure, success};
use crate::auth::AuthState;

/// Authenticate with email or username plus password.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token pair issued"),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account disabled or email unverified"),
        (status = 423, description = "Account temporarily locked"),
        (status = 429, description = "Too many attempts from this address")
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return failure(
            StatusCode::BAD_REQUEST,
            "Missing payload",
            "INVALID_REQUEST",
        );
    };

    let (device, ip) = request_context(&headers, peer.map(|ConnectInfo(addr)| addr));
    match state
        .credentials()
        .login(&request.identifier, &request.password, &device, &ip)
        .await
    {
        Ok(pair) => success(
            StatusCode::OK,
            "Logged in",
            Some(token_pair_json(&pair)),
        ),
        Err(err) => err.into_response(),
    }
}

/// Exchange a refresh token for a new pair. Each refresh token works once;
/// reusing an old one revokes the whole session.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Token pair rotated"),
        (status = 401, description = "Refresh token unknown, expired, or reused")
    ),
    tag = "auth"
)]
pub async fn refresh(
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<RefreshRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return failure(
            StatusCode::BAD_REQUEST,
            "Missing payload",
            "INVALID_REQUEST",
        );
    };

    match state.tokens().refresh(&request.refresh_token).await {
        Ok(pair) => success(
            StatusCode::OK,
            "Tokens refreshed",
            Some(token_pair_json(&pair)),
        ),
        Err(err) => err.into_response(),
    }
}

/// End the caller's session. Idempotent for a valid token.
#[utoipa::path(
    post,
    path = "/auth/logout",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Session revoked"),
        (status = 401, description = "Missing or invalid bearer token")
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let principal = match state.principal().resolve_required(&headers).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };
    match state.credentials().logout(&principal.session_id).await {
        Ok(()) => success(StatusCode::OK, "Logged out", None),
        Err(err) => err.into_response(),
    }
}
