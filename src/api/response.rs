//! Response envelope and the single error-to-status mapping.
//!
//! Every JSON body, success or failure, uses the same envelope so clients
//! never branch on shape. [`AuthError`] maps to HTTP in exactly one place.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};

use crate::auth::error::AuthError;

/// Build a success envelope.
pub fn success(status: StatusCode, message: &str, data: Option<Value>) -> Response {
    let mut body = json!({
        "success": true,
        "message": message,
        "timestamp": Utc::now(),
    });
    if let (Some(object), Some(data)) = (body.as_object_mut(), data) {
        object.insert("data".to_string(), data);
    }
    (status, Json(body)).into_response()
}

/// Build a failure envelope for request-shape problems that never reach the
/// engines (missing or malformed payloads).
pub fn failure(status: StatusCode, message: &str, error_code: &str) -> Response {
    let body = json!({
        "success": false,
        "message": message,
        "error_code": error_code,
        "timestamp": Utc::now(),
    });
    (status, Json(body)).into_response()
}

fn status_for(error: &AuthError) -> StatusCode {
    match error {
        AuthError::WeakPassword(_) | AuthError::InvalidEmail => StatusCode::BAD_REQUEST,
        AuthError::InvalidCredentials
        | AuthError::CodeExpired
        | AuthError::CodeInvalid { .. }
        | AuthError::CodeExhausted
        | AuthError::InvalidRefresh
        | AuthError::Unauthenticated => StatusCode::UNAUTHORIZED,
        AuthError::Forbidden(_)
        | AuthError::AccountDisabled
        | AuthError::EmailVerificationRequired => StatusCode::FORBIDDEN,
        AuthError::EmailTaken | AuthError::UsernameTaken => StatusCode::CONFLICT,
        AuthError::AccountLocked { .. } => StatusCode::LOCKED,
        AuthError::RateLimited { .. } | AuthError::ResendTooSoon { .. } => {
            StatusCode::TOO_MANY_REQUESTS
        }
        AuthError::Unavailable(_) | AuthError::EmailSendFailed => StatusCode::SERVICE_UNAVAILABLE,
        AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
        }

        let mut body = json!({
            "success": false,
            "message": self.client_message(),
            "error_code": self.code(),
            "timestamp": Utc::now(),
        });
        if let AuthError::CodeInvalid { attempts_remaining } = &self {
            if let Some(object) = body.as_object_mut() {
                object.insert(
                    "details".to_string(),
                    json!({ "attempts_remaining": attempts_remaining }),
                );
            }
        }

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        if let Some(retry_after) = self.retry_after_seconds() {
            if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
