//! Integration tests for the task CRUD surface.

use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use todod::{auth::jwt, config::AppConfig, rest, storage::Storage, AppContext};

const SECRET: &str = "test-secret";

async fn spawn_server(dir: &TempDir) -> String {
    let config = Arc::new(AppConfig::new(
        None,
        Some(dir.path().to_path_buf()),
        Some("error".to_string()),
        None,
    ));
    let storage = Arc::new(Storage::new(dir.path()).await.unwrap());
    let ctx = Arc::new(AppContext {
        config,
        storage,
        started_at: std::time::Instant::now(),
        jwt_secret: SECRET.to_string(),
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = rest::build_router(ctx);
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    format!("http://{addr}")
}

fn token_for(user_id: &str) -> String {
    jwt::sign(user_id, SECRET, 24)
}

async fn create_task(client: &reqwest::Client, base: &str, token: &str, title: &str) -> Value {
    let response = client
        .post(format!("{base}/api/tasks"))
        .bearer_auth(token)
        .json(&json!({ "title": title }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    response.json().await.unwrap()
}

#[tokio::test]
async fn crud_lifecycle() {
    let dir = TempDir::new().unwrap();
    let base = spawn_server(&dir).await;
    let client = reqwest::Client::new();
    let token = token_for("alice");

    // Create
    let created = create_task(&client, &base, &token, "buy milk").await;
    let id = created["data"]["id"].as_i64().unwrap();
    assert_eq!(created["data"]["title"], "buy milk");
    assert_eq!(created["data"]["completed"], false);

    // Read
    let fetched: Value = client
        .get(format!("{base}/api/tasks/{id}"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["data"]["id"], id);

    // Update
    let updated: Value = client
        .put(format!("{base}/api/tasks/{id}"))
        .bearer_auth(&token)
        .json(&json!({ "title": "buy oat milk", "description": "the barista kind" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(updated["data"]["title"], "buy oat milk");
    assert_eq!(updated["data"]["description"], "the barista kind");

    // Toggle complete
    let toggled: Value = client
        .patch(format!("{base}/api/tasks/{id}/complete"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(toggled["data"]["completed"], true);

    // Delete
    let response = client
        .delete(format!("{base}/api/tasks/{id}"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // Second delete is a 404, not an error
    let response = client
        .delete(format!("{base}/api/tasks/{id}"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn tasks_are_invisible_across_owners() {
    let dir = TempDir::new().unwrap();
    let base = spawn_server(&dir).await;
    let client = reqwest::Client::new();
    let alice = token_for("alice");
    let mallory = token_for("mallory");

    let created = create_task(&client, &base, &alice, "alice's task").await;
    let id = created["data"]["id"].as_i64().unwrap();

    // Every mutation path reads as 404 for the non-owner, even though the id exists.
    let response = client
        .get(format!("{base}/api/tasks/{id}"))
        .bearer_auth(&mallory)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    let response = client
        .put(format!("{base}/api/tasks/{id}"))
        .bearer_auth(&mallory)
        .json(&json!({ "title": "hijacked" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    let response = client
        .delete(format!("{base}/api/tasks/{id}"))
        .bearer_auth(&mallory)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    // Alice's listing is unaffected
    let list: Value = client
        .get(format!("{base}/api/tasks"))
        .bearer_auth(&alice)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["data"].as_array().unwrap().len(), 1);
    assert_eq!(list["data"][0]["title"], "alice's task");
}

#[tokio::test]
async fn list_filters_and_validation() {
    let dir = TempDir::new().unwrap();
    let base = spawn_server(&dir).await;
    let client = reqwest::Client::new();
    let token = token_for("alice");

    let first = create_task(&client, &base, &token, "done task").await;
    create_task(&client, &base, &token, "pending task").await;
    let id = first["data"]["id"].as_i64().unwrap();
    client
        .patch(format!("{base}/api/tasks/{id}/complete"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();

    let completed: Value = client
        .get(format!("{base}/api/tasks?status=completed"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(completed["data"].as_array().unwrap().len(), 1);
    assert_eq!(completed["data"][0]["title"], "done task");

    // Unknown filter values are rejected up front
    let response = client
        .get(format!("{base}/api/tasks?status=bogus"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let response = client
        .get(format!("{base}/api/tasks?sort=bogus"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn title_validation_is_422() {
    let dir = TempDir::new().unwrap();
    let base = spawn_server(&dir).await;
    let client = reqwest::Client::new();
    let token = token_for("alice");

    let response = client
        .post(format!("{base}/api/tasks"))
        .bearer_auth(&token)
        .json(&json!({ "title": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 422);

    let response = client
        .post(format!("{base}/api/tasks"))
        .bearer_auth(&token)
        .json(&json!({ "title": "x".repeat(201) }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 422);

    let response = client
        .post(format!("{base}/api/tasks"))
        .bearer_auth(&token)
        .json(&json!({ "title": "fine", "description": "d".repeat(1001) }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 422);
}
