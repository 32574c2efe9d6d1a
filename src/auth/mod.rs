// auth/mod.rs — Bearer token auth middleware.
//
// Every `/api` route except register/login sits behind `require_auth`.
// Header: Authorization: Bearer <jwt>
// On success the authenticated user id is inserted as an `AuthUser` request
// extension for handlers to consume.

pub mod jwt;
pub mod password;

use anyhow::Result;
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::AppContext;

/// The authenticated caller's stable identity.  All task visibility and
/// mutation is scoped by this id.
#[derive(Debug, Clone)]
pub struct AuthUser(pub String);

pub async fn require_auth(
    State(ctx): State<Arc<AppContext>>,
    mut req: Request,
    next: Next,
) -> Response {
    // Extract Bearer token from Authorization header
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let Some(token) = token else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": "Not authenticated, Authorization header missing or invalid format"
            })),
        )
            .into_response();
    };

    match jwt::verify(token, &ctx.jwt_secret) {
        Ok(user_id) => {
            req.extensions_mut().insert(AuthUser(user_id));
            next.run(req).await
        }
        Err(e) => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

/// Return the JWT signing secret for this server instance.
///
/// On first call, generates a random 32-character hex secret and writes it to
/// `{data_dir}/jwt_secret` with user-only read/write permissions (mode 0600
/// on Unix). On subsequent calls, reads and returns the existing secret.
///
/// The secret file must be kept private — anyone holding it can mint tokens
/// for any user id.
pub fn get_or_create_secret(data_dir: &Path) -> Result<String> {
    let path = data_dir.join("jwt_secret");

    if path.exists() {
        let secret = std::fs::read_to_string(&path)?.trim().to_string();
        if !secret.is_empty() {
            return Ok(secret);
        }
    }

    // Generate a new secret (UUID v4, hex without dashes = 32 chars)
    let secret = Uuid::new_v4().to_string().replace('-', "");

    std::fs::create_dir_all(data_dir)?;
    std::fs::write(&path, &secret)?;

    // Restrict to owner read/write only on Unix
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(secret)
}
