//! Email verification endpoints.
//!
//! Both endpoints answer identically whether or not the address is
//! registered; existence is never observable here.

use axum::{
    extract::{ConnectInfo, Extension},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::{net::SocketAddr, sync::Arc};

use super::request_context;
use super::types::{RequestCodeRequest, VerifyEmailRequest};
use crate::api::response::{failure, success};
use crate::auth::verification::CodePurpose;
use crate::auth::AuthState;

/// Send (or resend) a verification code to the given address.
#[utoipa::path(
    post,
    path = "/auth/verify/request",
    request_body = RequestCodeRequest,
    responses(
        (status = 200, description = "If the address is registered and unverified, a code is on its way"),
        (status = 400, description = "Malformed email address"),
        (status = 429, description = "Resend cooldown or send limit hit"),
        (status = 503, description = "Email could not be delivered")
    ),
    tag = "auth"
)]
pub async fn request_verification(
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<RequestCodeRequest>>,
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
    match state
        .verification()
        .request_code(CodePurpose::EmailVerification, &request.email, client_ip)
        .await
    {
        Ok(()) => success(
            StatusCode::OK,
            "If that address needs verification, a code has been sent",
            None,
        ),
        Err(err) => err.into_response(),
    }
}

/// Confirm a verification code and mark the account verified.
#[utoipa::path(
    post,
    path = "/auth/verify/confirm",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified"),
        (status = 401, description = "Code invalid, expired, or exhausted")
    ),
    tag = "auth"
)]
pub async fn confirm_verification(
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyEmailRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return failure(
            StatusCode::BAD_REQUEST,
            "Missing payload",
            "INVALID_REQUEST",
        );
    };

    match state
        .verification()
        .verify_email(&request.email, &request.code)
        .await
    {
        Ok(()) => success(StatusCode::OK, "Email verified", None),
        Err(err) => err.into_response(),
    }
}
