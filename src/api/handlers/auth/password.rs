//! Password reset and change.

use axum::{
    extract::{ConnectInfo, Extension},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::{net::SocketAddr, sync::Arc};

use super::request_context;
use super::types::{
    token_pair_json, ChangePasswordRequest, RequestCodeRequest, ResetPasswordRequest,
};
use crate::api::response::{failure, success};
use crate::auth::verification::CodePurpose;
use crate::auth::AuthState;

/// Request a password-reset code. The response never reveals whether the
/// address is registered.
#[utoipa::path(
    post,
    path = "/auth/password/forgot",
    request_body = RequestCodeRequest,
    responses(
        (status = 200, description = "If the address is registered, a reset code is on its way"),
        (status = 400, description = "Malformed email address"),
        (status = 429, description = "Resend cooldown or send limit hit"),
        (status = 503, description = "Email could not be delivered")
    ),
    tag = "auth"
)]
pub async fn forgot_password(
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
        .request_code(CodePurpose::PasswordReset, &request.email, client_ip)
        .await
    {
        Ok(()) => success(
            StatusCode::OK,
            "If that address is registered, a reset code has been sent",
            None,
        ),
        Err(err) => err.into_response(),
    }
}

/// Complete a password reset with an emailed code. Every session of the
/// account is revoked; the user logs in again with the new password.
#[utoipa::path(
    post,
    path = "/auth/password/reset",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password replaced, all sessions revoked"),
        (status = 400, description = "New password fails the policy"),
        (status = 401, description = "Code invalid, expired, or exhausted")
    ),
    tag = "auth"
)]
pub async fn reset_password(
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return failure(
            StatusCode::BAD_REQUEST,
            "Missing payload",
            "INVALID_REQUEST",
        );
    };

    match state
        .credentials()
        .reset_password(&request.email, &request.code, &request.new_password)
        .await
    {
        Ok(()) => success(
            StatusCode::OK,
            "Password reset, log in with your new password",
            None,
        ),
        Err(err) => err.into_response(),
    }
}

/// Change the password of the authenticated caller. All existing sessions
/// are revoked and a fresh token pair is returned.
#[utoipa::path(
    post,
    path = "/auth/password/change",
    request_body = ChangePasswordRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Password changed, fresh token pair returned"),
        (status = 400, description = "New password fails the policy"),
        (status = 401, description = "Current password wrong or token invalid")
    ),
    tag = "auth"
)]
pub async fn change_password(
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<ChangePasswordRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return failure(
            StatusCode::BAD_REQUEST,
            "Missing payload",
            "INVALID_REQUEST",
        );
    };

    let principal = match state.principal().resolve_required(&headers).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };
    let (device, ip) = request_context(&headers, peer.map(|ConnectInfo(addr)| addr));
    match state
        .credentials()
        .change_password(
            principal.user.user_id,
            &request.current_password,
            &request.new_password,
            &device,
            &ip,
        )
        .await
    {
        Ok(pair) => success(
            StatusCode::OK,
            "Password changed",
            Some(token_pair_json(&pair)),
        ),
        Err(err) => err.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing;
    use super::*;

    #[tokio::test]
    async fn forgot_password_returns_200_for_any_address() {
        let request = RequestCodeRequest {
            email: "ghost@example.com".to_string(),
        };
        let response = forgot_password(
            HeaderMap::new(),
            None,
            Extension(testing::state()),
            Some(Json(request)),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
