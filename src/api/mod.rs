//! HTTP surface: router construction, middleware, and server startup.

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    routing::{get, options, post},
    Extension, Router,
};
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::{
    config::AuthConfig, email::LogEmailSender, kv::MemoryKvStore, postgres::PgAuthStore,
    store::SessionStore, store::UserStore, AuthState,
};

pub mod handlers;
pub mod openapi;
pub mod response;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

/// Build the router against an already-constructed state. Split out from
/// [`serve`] so tests can drive the full HTTP surface in process.
pub fn router(auth_state: Arc<AuthState>) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", options(handlers::health::health))
        .route("/health", get(handlers::health::health))
        .route("/auth/register", post(handlers::auth::register::register))
        .route("/auth/login", post(handlers::auth::login::login))
        .route("/auth/refresh", post(handlers::auth::login::refresh))
        .route("/auth/logout", post(handlers::auth::login::logout))
        .route("/auth/me", get(handlers::auth::me::me))
        .route(
            "/auth/verify/request",
            post(handlers::auth::verification::request_verification),
        )
        .route(
            "/auth/verify/confirm",
            post(handlers::auth::verification::confirm_verification),
        )
        .route(
            "/auth/password/forgot",
            post(handlers::auth::password::forgot_password),
        )
        .route(
            "/auth/password/reset",
            post(handlers::auth::password::reset_password),
        )
        .route(
            "/auth/password/change",
            post(handlers::auth::password::change_password),
        )
        .route(
            "/admin/update-entity-ratings",
            get(handlers::admin::update_entity_ratings),
        )
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
        .layer(Extension(auth_state))
}

/// Start the server.
///
/// # Errors
///
/// Returns an error if the database is unreachable or the port cannot be
/// bound.
pub async fn serve(port: u16, dsn: String, config: AuthConfig) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let store = Arc::new(PgAuthStore::new(pool.clone()));
    let auth_state = Arc::new(AuthState::new(
        config,
        Arc::clone(&store) as Arc<dyn UserStore>,
        store as Arc<dyn SessionStore>,
        Arc::new(MemoryKvStore::new()),
        Arc::new(LogEmailSender),
    ));

    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_origin(Any);

    let app = router(auth_state).layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(cors)
            .layer(Extension(pool)),
    );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    // Connect info backs the per-IP limits when no proxy header is present.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
