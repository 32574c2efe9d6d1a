// rest/routes/auth.rs — registration, login, and profile routes.

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    Extension,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::auth::{jwt, password, AuthUser};
use crate::storage::{NewUser, StoreError, UserPatch, UserRow};
use crate::AppContext;

/// User payload for responses — never includes the password hash.
fn user_json(user: &UserRow) -> Value {
    json!({
        "id": user.id,
        "email": user.email,
        "username": user.username,
        "first_name": user.first_name,
        "last_name": user.last_name,
        "is_active": user.is_active,
        "created_at": user.created_at,
        "updated_at": user.updated_at,
    })
}

fn bad_request(message: &str) -> (StatusCode, Json<Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn internal_error(e: &StoreError, action: &str) -> (StatusCode, Json<Value>) {
    error!(err = %e, "error while {action}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": format!("Internal server error occurred while {action}")
        })),
    )
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

pub async fn register(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    let email = body.email.trim().to_lowercase();
    if !email.contains('@') || email.len() < 3 {
        return Err(bad_request("A valid email address is required"));
    }
    let username = body.username.trim().to_string();
    if username.is_empty() {
        return Err(bad_request("Username is required"));
    }
    if body.password.len() < 8 {
        return Err(bad_request("Password must be at least 8 characters"));
    }

    let new_user = NewUser {
        email,
        username,
        password_hash: password::hash(&body.password),
        first_name: body.first_name,
        last_name: body.last_name,
    };

    let user = match ctx.storage.create_user(new_user).await {
        Ok(user) => user,
        Err(e @ (StoreError::EmailTaken | StoreError::UsernameTaken)) => {
            return Err(bad_request(&e.to_string()));
        }
        Err(e) => return Err(internal_error(&e, "registering user")),
    };

    let token = jwt::sign(&user.id, &ctx.jwt_secret, ctx.config.auth.token_ttl_hours);
    info!(user_id = %user.id, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "data": { "user": user_json(&user), "token": token },
        })),
    ))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub async fn login(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let email = body.email.trim().to_lowercase();
    let user = match ctx.storage.get_user_by_email(&email).await {
        Ok(user) => user,
        Err(e) => return Err(internal_error(&e, "logging in")),
    };

    let authenticated = user
        .filter(|u| u.is_active)
        .filter(|u| password::verify(&body.password, &u.password_hash));

    let Some(user) = authenticated else {
        warn!(email = %email, "failed login attempt");
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Incorrect email or password" })),
        ));
    };

    if let Err(e) = ctx.storage.touch_last_login(&user.id).await {
        // Non-fatal — the login still succeeds.
        warn!(err = %e, user_id = %user.id, "could not record last login");
    }

    let token = jwt::sign(&user.id, &ctx.jwt_secret, ctx.config.auth.token_ttl_hours);
    info!(user_id = %user.id, "user logged in");

    Ok(Json(json!({
        "success": true,
        "data": { "user": user_json(&user), "token": token },
    })))
}

pub async fn get_profile(
    State(ctx): State<Arc<AppContext>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match ctx.storage.get_user_by_id(&user_id).await {
        Ok(Some(user)) => Ok(Json(json!({ "success": true, "data": user_json(&user) }))),
        // A valid token for a missing row is a server-side inconsistency.
        Ok(None) => {
            error!(user_id = %user_id, "authenticated user not found in database");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "User account could not be found" })),
            ))
        }
        Err(e) => Err(internal_error(&e, "retrieving profile")),
    }
}

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    pub email: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

pub async fn update_profile(
    State(ctx): State<Arc<AppContext>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if let Some(email) = body.email.as_deref() {
        if !email.contains('@') {
            return Err(bad_request("A valid email address is required"));
        }
    }

    let patch = UserPatch {
        email: body.email.map(|e| e.trim().to_lowercase()),
        username: body.username,
        first_name: body.first_name,
        last_name: body.last_name,
    };

    match ctx.storage.update_user(&user_id, patch).await {
        Ok(Some(user)) => {
            info!(user_id = %user.id, "user profile updated");
            Ok(Json(json!({ "success": true, "data": user_json(&user) })))
        }
        Ok(None) => {
            error!(user_id = %user_id, "authenticated user not found in database");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "User account could not be found" })),
            ))
        }
        Err(e @ (StoreError::EmailTaken | StoreError::UsernameTaken)) => {
            Err(bad_request(&e.to_string()))
        }
        Err(e) => Err(internal_error(&e, "updating profile")),
    }
}

/// Lightweight check that the caller's token is valid — the auth middleware
/// has already done the work by the time this handler runs.
pub async fn verify_token(
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Json<Value> {
    Json(json!({ "authenticated": true, "user_id": user_id }))
}
