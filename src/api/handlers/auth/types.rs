//! Request and response bodies for the auth endpoints.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::ToSchema;

use crate::auth::store::UserRecord;
use crate::auth::tokens::TokenPair;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    /// Optional; derived from the email local part when absent.
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    /// Email address or username.
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RequestCodeRequest {
    pub email: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyEmailRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub code: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

pub fn token_pair_json(pair: &TokenPair) -> Value {
    json!({
        "access_token": pair.access_token,
        "refresh_token": pair.refresh_token,
        "token_type": pair.token_type,
        "expires_in": pair.expires_in,
    })
}

/// Public projection of an account. The password hash, failure counters, and
/// lock state never leave the server.
pub fn user_json(user: &UserRecord) -> Value {
    json!({
        "user_id": user.user_id,
        "email": user.email,
        "username": user.username,
        "first_name": user.first_name,
        "last_name": user.last_name,
        "is_verified": user.is_verified(),
        "is_active": user.is_active,
        "is_premium": user.is_premium,
        "role": user.role.as_str(),
        "permissions": user.permissions,
        "last_login_at": user.last_login_at,
        "created_at": user.created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::Role;
    use chrono::Utc;

    #[test]
    fn user_projection_hides_credential_state() {
        let user = UserRecord {
            user_id: 1,
            email: "a@b.c".to_string(),
            username: "a".to_string(),
            first_name: "A".to_string(),
            last_name: "B".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            is_active: true,
            is_premium: false,
            role: Role::User,
            permissions: Vec::new(),
            email_verified_at: Some(Utc::now()),
            failed_login_count: 3,
            locked_until: None,
            last_login_at: None,
            last_active_at: None,
            created_at: Utc::now(),
        };
        let value = user_json(&user);
        assert_eq!(value["is_verified"], true);
        assert_eq!(value["role"], "USER");
        let rendered = value.to_string();
        assert!(!rendered.contains("argon2"));
        assert!(!rendered.contains("failed_login_count"));
        assert!(!rendered.contains("locked_until"));
    }
}
