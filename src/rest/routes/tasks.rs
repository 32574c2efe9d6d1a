// rest/routes/tasks.rs — owner-scoped task CRUD routes.
//
// Every handler reads the owner id from the `AuthUser` extension the auth
// middleware inserted.  A task that exists but belongs to someone else is
// reported as 404 — existence is never leaked across owners.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info};

use crate::auth::AuthUser;
use crate::storage::{NewTask, StatusFilter, StoreError, TaskPatch, TaskRow, TaskSort};
use crate::AppContext;

fn task_json(task: &TaskRow) -> Value {
    json!({
        "id": task.id,
        "title": task.title,
        "description": task.description,
        "completed": task.completed,
        "due_date": task.due_date,
        "user_id": task.user_id,
        "created_at": task.created_at,
        "updated_at": task.updated_at,
    })
}

fn not_found() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Task not found" })),
    )
}

fn store_error(e: StoreError, action: &str) -> (StatusCode, Json<Value>) {
    if e.is_validation() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": e.to_string() })),
        );
    }
    error!(err = %e, "error while {action}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": format!("Internal server error occurred while {action}")
        })),
    )
}

#[derive(Deserialize)]
pub struct ListQuery {
    /// "all" | "completed" | "pending"
    pub status: Option<String>,
    /// "created_at" | "due_date" | "title"
    pub sort: Option<String>,
}

pub async fn list_tasks(
    State(ctx): State<Arc<AppContext>>,
    Extension(AuthUser(owner)): Extension<AuthUser>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let status = match query.status.as_deref() {
        None => StatusFilter::All,
        Some(s) => StatusFilter::parse(s).ok_or((
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "Invalid status parameter. Use 'all', 'completed', or 'pending'"
            })),
        ))?,
    };
    let sort = match query.sort.as_deref() {
        None => TaskSort::CreatedAt,
        Some(s) => TaskSort::parse(s).ok_or((
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "Invalid sort parameter. Use 'created_at', 'due_date', or 'title'"
            })),
        ))?,
    };

    let tasks = ctx
        .storage
        .list_tasks(&owner, status, sort)
        .await
        .map_err(|e| store_error(e, "retrieving tasks"))?;

    info!(owner = %owner, count = tasks.len(), "tasks listed");
    let data: Vec<Value> = tasks.iter().map(task_json).collect();
    Ok(Json(json!({ "success": true, "data": data })))
}

#[derive(Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub completed: bool,
    pub due_date: Option<String>,
}

pub async fn create_task(
    State(ctx): State<Arc<AppContext>>,
    Extension(AuthUser(owner)): Extension<AuthUser>,
    Json(body): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    let task = ctx
        .storage
        .create_task(
            &owner,
            NewTask {
                title: body.title,
                description: body.description,
                completed: body.completed,
                due_date: body.due_date,
            },
        )
        .await
        .map_err(|e| store_error(e, "creating task"))?;

    info!(owner = %owner, task_id = task.id, "task created");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": task_json(&task) })),
    ))
}

pub async fn get_task(
    State(ctx): State<Arc<AppContext>>,
    Extension(AuthUser(owner)): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match ctx.storage.get_task(&owner, id).await {
        Ok(Some(task)) => Ok(Json(json!({ "success": true, "data": task_json(&task) }))),
        Ok(None) => Err(not_found()),
        Err(e) => Err(store_error(e, "retrieving task")),
    }
}

#[derive(Deserialize)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub completed: Option<bool>,
    pub due_date: Option<String>,
}

pub async fn update_task(
    State(ctx): State<Arc<AppContext>>,
    Extension(AuthUser(owner)): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateTaskRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let patch = TaskPatch {
        title: body.title,
        description: body.description,
        completed: body.completed,
        due_date: body.due_date,
    };

    match ctx.storage.update_task(&owner, id, patch).await {
        Ok(Some(task)) => {
            info!(owner = %owner, task_id = task.id, "task updated");
            Ok(Json(json!({ "success": true, "data": task_json(&task) })))
        }
        Ok(None) => Err(not_found()),
        Err(e) => Err(store_error(e, "updating task")),
    }
}

pub async fn toggle_completion(
    State(ctx): State<Arc<AppContext>>,
    Extension(AuthUser(owner)): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match ctx.storage.toggle_task_completion(&owner, id).await {
        Ok(Some(task)) => {
            info!(owner = %owner, task_id = task.id, completed = task.completed, "task completion toggled");
            Ok(Json(json!({ "success": true, "data": task_json(&task) })))
        }
        Ok(None) => Err(not_found()),
        Err(e) => Err(store_error(e, "toggling task completion")),
    }
}

pub async fn delete_task(
    State(ctx): State<Arc<AppContext>>,
    Extension(AuthUser(owner)): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match ctx.storage.delete_task(&owner, id).await {
        Ok(true) => {
            info!(owner = %owner, task_id = id, "task deleted");
            Ok(Json(json!({
                "success": true,
                "data": { "message": "Task deleted successfully" },
            })))
        }
        Ok(false) => Err(not_found()),
        Err(e) => Err(store_error(e, "deleting task")),
    }
}
