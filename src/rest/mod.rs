// rest/mod.rs — Public REST API server.
//
// Axum HTTP server, local-only by default (bind 127.0.0.1).
//
// Endpoints:
//   GET    /                            (no auth)
//   GET    /health                      (no auth)
//   POST   /api/auth/register           (no auth)
//   POST   /api/auth/login              (no auth)
//   GET    /api/auth/verify
//   GET    /api/auth/profile
//   PUT    /api/auth/profile
//   GET    /api/tasks
//   POST   /api/tasks
//   GET    /api/tasks/{id}
//   PUT    /api/tasks/{id}
//   PATCH  /api/tasks/{id}/complete
//   DELETE /api/tasks/{id}
//   POST   /api/chat                    (rate-limited)

pub mod rate_limit;
pub mod routes;

use anyhow::Result;
use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, patch, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

use crate::{auth, config::CorsConfig, AppContext};

pub async fn start_rest_server(ctx: Arc<AppContext>) -> Result<()> {
    let bind = format!("{}:{}", ctx.config.bind_address, ctx.config.port);
    let addr: SocketAddr = bind.parse()?;

    let router = build_router(ctx);

    info!("HTTP API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

pub fn build_router(ctx: Arc<AppContext>) -> Router {
    let chat_limiter = Arc::new(rate_limit::FixedWindow::new(
        ctx.config.limits.chat_max_calls,
        Duration::from_secs(ctx.config.limits.chat_window_secs),
    ));
    let chat = post(routes::chat::chat)
        .layer(middleware::from_fn_with_state(
            chat_limiter,
            rate_limit::enforce,
        ));

    let authed = Router::new()
        .route("/api/auth/verify", get(routes::auth::verify_token))
        .route(
            "/api/auth/profile",
            get(routes::auth::get_profile).put(routes::auth::update_profile),
        )
        .route(
            "/api/tasks",
            get(routes::tasks::list_tasks).post(routes::tasks::create_task),
        )
        .route(
            "/api/tasks/{id}",
            get(routes::tasks::get_task)
                .put(routes::tasks::update_task)
                .delete(routes::tasks::delete_task),
        )
        .route(
            "/api/tasks/{id}/complete",
            patch(routes::tasks::toggle_completion),
        )
        .route("/api/chat", chat)
        .route_layer(middleware::from_fn_with_state(
            ctx.clone(),
            auth::require_auth,
        ));

    Router::new()
        // Health (no auth)
        .route("/", get(routes::health::root))
        .route("/health", get(routes::health::health))
        // Account creation (no auth)
        .route("/api/auth/register", post(routes::auth::register))
        .route("/api/auth/login", post(routes::auth::login))
        .merge(authed)
        .layer(cors_layer(&ctx.config.cors))
        .with_state(ctx)
}

fn cors_layer(cfg: &CorsConfig) -> CorsLayer {
    // A wildcard origin cannot be combined with credentials at the HTTP
    // level, so `"*"` degrades to a credential-less allow-all layer.
    if cfg.allowed_origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = cfg
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring unparseable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
}
