//! OpenAPI document for the served routes.

use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use super::handlers;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health,
        handlers::auth::register::register,
        handlers::auth::login::login,
        handlers::auth::login::refresh,
        handlers::auth::login::logout,
        handlers::auth::me::me,
        handlers::auth::verification::request_verification,
        handlers::auth::verification::confirm_verification,
        handlers::auth::password::forgot_password,
        handlers::auth::password::reset_password,
        handlers::auth::password::change_password,
        handlers::admin::update_entity_ratings,
    ),
    components(schemas(
        handlers::health::Health,
        handlers::auth::types::RegisterRequest,
        handlers::auth::types::LoginRequest,
        handlers::auth::types::RefreshRequest,
        handlers::auth::types::RequestCodeRequest,
        handlers::auth::types::VerifyEmailRequest,
        handlers::auth::types::ResetPasswordRequest,
        handlers::auth::types::ChangePasswordRequest,
        handlers::auth::types::TokenPairResponse,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Registration, login, verification, and sessions"),
        (name = "admin", description = "Admin-gated maintenance"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_all_auth_routes() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        for expected in [
            "/health",
            "/auth/register",
            "/auth/login",
            "/auth/refresh",
            "/auth/logout",
            "/auth/me",
            "/auth/verify/request",
            "/auth/verify/confirm",
            "/auth/password/forgot",
            "/auth/password/reset",
            "/auth/password/change",
            "/admin/update-entity-ratings",
        ] {
            assert!(
                paths.iter().any(|p| p.as_str() == expected),
                "missing path {expected}"
            );
        }
    }
}
