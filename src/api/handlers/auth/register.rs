//! Account creation.

use axum::{
    extract::{ConnectInfo, Extension},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc};

use super::request_context;
use super::types::RegisterRequest;
use crate::api::response::{failure, success};
use crate::auth::credentials::Registration;
use crate::auth::AuthState;

/// Create an account and send the first verification code. No tokens are
/// returned; the client must verify the email before logging in.
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Account created, verification code sent"),
        (status = 400, description = "Invalid email or weak password"),
        (status = 409, description = "Email or username already taken"),
        (status = 429, description = "Too many registrations from this address"),
        (status = 503, description = "Verification email could not be delivered")
    ),
    tag = "auth"
)]
pub async fn register(
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return failure(
            StatusCode::BAD_REQUEST,
            "Missing payload",
            "INVALID_REQUEST",
        );
    };

    let (_, ip) = request_context(&headers, peer.map(|ConnectInfo(addr)| addr));
    let client_ip = if ip.is_empty() { None } else { Some(ip.as_str()) };
    let registration = Registration {
        email: request.email,
        password: request.password,
        username: request.username,
        first_name: request.first_name,
        last_name: request.last_name,
    };

    match state.credentials().register(registration, client_ip).await {
        Ok(registered) => success(
            StatusCode::OK,
            "Account created, check your email for a verification code",
            Some(json!({
                "user_id": registered.user_id,
                "email": registered.email,
                "username": registered.username,
            })),
        ),
        Err(err) => err.into_response(),
    }
}
