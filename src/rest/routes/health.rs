// rest/routes/health.rs — liveness endpoints (no auth).

use axum::{extract::State, response::Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::AppContext;

pub async fn root(State(_ctx): State<Arc<AppContext>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "todod",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn health(State(ctx): State<Arc<AppContext>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "todod service is running",
        "uptime": ctx.started_at.elapsed().as_secs(),
    }))
}
