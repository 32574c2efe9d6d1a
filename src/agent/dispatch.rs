// agent/dispatch.rs — maps a resolved intent to at most one store call and a
// natural-language reply.
//
// Position references ("task 3") are resolved against a single owner-scoped
// snapshot taken at dispatch time, then the mutation itself goes through the
// owner-filtered store op keyed by id.  Store failures never escape: they are
// folded into the tool call's `{success: false, error}` result and a readable
// reply.

use serde_json::{json, Value};

use crate::storage::{NewTask, Storage, StoreError, TaskPatch, TaskRow};

use super::intent::{resolve, Intent};

/// Structured record of one dispatched action, returned to the caller for
/// transparency.  Built once per dispatch, never mutated, never persisted.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Value,
    pub result: Value,
}

/// One chat turn's outcome: the reply text plus zero or one tool call.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub reply: String,
    pub tool_calls: Vec<ToolCall>,
}

impl ChatOutcome {
    fn reply_only(reply: String) -> Self {
        Self {
            reply,
            tool_calls: Vec::new(),
        }
    }

    fn with_call(reply: String, call: ToolCall) -> Self {
        Self {
            reply,
            tool_calls: vec![call],
        }
    }
}

/// Resolve and dispatch one message for `owner`.
pub async fn run(message: &str, owner: &str, store: &Storage) -> ChatOutcome {
    let intent = resolve(message);
    dispatch(message, intent, owner, store).await
}

/// Dispatch an already-resolved intent.  At most one store mutation happens
/// per call; every failure path produces a reply, never an error.
pub async fn dispatch(message: &str, intent: Intent, owner: &str, store: &Storage) -> ChatOutcome {
    match intent {
        Intent::AddTask { title } => add_task(owner, title, store).await,
        Intent::ListTasks => list_tasks(owner, store).await,
        Intent::CompleteTask { position } => complete_task(owner, position, store).await,
        Intent::DeleteTask { position } => delete_task(owner, position, store).await,
        Intent::UpdateTask { position, content } => {
            update_task(owner, position, content, store).await
        }
        Intent::Unrecognized => ChatOutcome::reply_only(format!(
            "I received your message: '{message}'. How can I help you with your tasks?"
        )),
    }
}

async fn add_task(owner: &str, title: String, store: &Storage) -> ChatOutcome {
    let arguments = json!({ "user_id": owner, "title": &title });
    let new_task = NewTask {
        title: title.clone(),
        ..Default::default()
    };
    match store.create_task(owner, new_task).await {
        Ok(task) => ChatOutcome::with_call(
            format!("I've added the task '{title}' to your list."),
            ToolCall {
                name: "add_task".to_string(),
                arguments,
                result: json!({
                    "task_id": task.id,
                    "title": task.title,
                    "description": task.description,
                    "completed": task.completed,
                    "success": true,
                }),
            },
        ),
        Err(e) => ChatOutcome::with_call(
            format!("I encountered an error adding the task: {e}"),
            failure_call("add_task", arguments, &e.to_string()),
        ),
    }
}

async fn list_tasks(owner: &str, store: &Storage) -> ChatOutcome {
    let arguments = json!({ "user_id": owner });
    match store.snapshot_tasks(owner).await {
        Ok(tasks) => {
            let listed: Vec<Value> = tasks
                .iter()
                .map(|t| {
                    json!({
                        "task_id": t.id,
                        "title": t.title,
                        "description": t.description,
                        "completed": t.completed,
                    })
                })
                .collect();
            ChatOutcome::with_call(
                format!("You have {} tasks in your list.", tasks.len()),
                ToolCall {
                    name: "list_tasks".to_string(),
                    arguments,
                    result: json!({ "tasks": listed, "success": true }),
                },
            )
        }
        Err(e) => ChatOutcome::with_call(
            format!("I encountered an error listing tasks: {e}"),
            failure_call("list_tasks", arguments, &e.to_string()),
        ),
    }
}

async fn complete_task(owner: &str, position: Option<usize>, store: &Storage) -> ChatOutcome {
    let snapshot = match store.snapshot_tasks(owner).await {
        Ok(s) => s,
        Err(e) => {
            return store_failure("complete_task", owner, &e);
        }
    };

    // Explicit position wins; otherwise the first still-pending task.
    let target = match position {
        Some(p) => target_at(&snapshot, p),
        None => snapshot.iter().find(|t| !t.completed),
    };
    let Some(target) = target else {
        let (reply, error) = match position {
            Some(p) => (
                format!("I couldn't find task {p} on your list."),
                format!("No task found at position {p}"),
            ),
            None => (
                "You don't have any pending tasks to complete.".to_string(),
                "No pending tasks found".to_string(),
            ),
        };
        return ChatOutcome::with_call(
            reply,
            failure_call("complete_task", json!({ "user_id": owner }), &error),
        );
    };

    let arguments = json!({ "user_id": owner, "task_id": target.id });
    let patch = TaskPatch {
        completed: Some(true),
        ..Default::default()
    };
    match store.update_task(owner, target.id, patch).await {
        Ok(Some(task)) => ChatOutcome::with_call(
            format!("I've marked the task '{}' as completed.", task.title),
            ToolCall {
                name: "complete_task".to_string(),
                arguments,
                result: json!({
                    "task_id": task.id,
                    "title": task.title,
                    "completed": task.completed,
                    "success": true,
                }),
            },
        ),
        Ok(None) => ChatOutcome::with_call(
            "I couldn't find that task on your list.".to_string(),
            failure_call("complete_task", arguments, "Task not found or not owned by user"),
        ),
        Err(e) => ChatOutcome::with_call(
            format!("I encountered an error completing the task: {e}"),
            failure_call("complete_task", arguments, &e.to_string()),
        ),
    }
}

async fn delete_task(owner: &str, position: Option<usize>, store: &Storage) -> ChatOutcome {
    let snapshot = match store.snapshot_tasks(owner).await {
        Ok(s) => s,
        Err(e) => {
            return store_failure("delete_task", owner, &e);
        }
    };

    let target = match position {
        Some(p) => target_at(&snapshot, p),
        None => snapshot.first(),
    };
    let Some(target) = target else {
        let (reply, error) = match position {
            Some(p) => (
                format!("I couldn't find task {p} on your list."),
                format!("No task found at position {p}"),
            ),
            None => (
                "You don't have any tasks to delete.".to_string(),
                "No tasks found".to_string(),
            ),
        };
        return ChatOutcome::with_call(
            reply,
            failure_call("delete_task", json!({ "user_id": owner }), &error),
        );
    };

    let arguments = json!({ "user_id": owner, "task_id": target.id });
    match store.delete_task(owner, target.id).await {
        Ok(true) => ChatOutcome::with_call(
            format!("I've removed the task '{}' from your list.", target.title),
            ToolCall {
                name: "delete_task".to_string(),
                arguments,
                result: json!({ "task_id": target.id, "deleted": true, "success": true }),
            },
        ),
        Ok(false) => ChatOutcome::with_call(
            "I couldn't find that task on your list.".to_string(),
            failure_call("delete_task", arguments, "Task not found or not owned by user"),
        ),
        Err(e) => ChatOutcome::with_call(
            format!("I encountered an error deleting the task: {e}"),
            failure_call("delete_task", arguments, &e.to_string()),
        ),
    }
}

async fn update_task(
    owner: &str,
    position: Option<usize>,
    content: Option<String>,
    store: &Storage,
) -> ChatOutcome {
    let snapshot = match store.snapshot_tasks(owner).await {
        Ok(s) => s,
        Err(e) => {
            return store_failure("update_task", owner, &e);
        }
    };

    let target = match position {
        Some(p) => target_at(&snapshot, p),
        None => snapshot.first(),
    };
    let Some(target) = target else {
        let (reply, error) = match position {
            Some(p) => (
                format!("I couldn't find task {p} on your list."),
                format!("No task found at position {p}"),
            ),
            None => (
                "You don't have any tasks to update.".to_string(),
                "No tasks found".to_string(),
            ),
        };
        return ChatOutcome::with_call(
            reply,
            failure_call("update_task", json!({ "user_id": owner }), &error),
        );
    };

    let arguments = json!({ "user_id": owner, "task_id": target.id, "title": &content });
    let patch = TaskPatch {
        title: content,
        ..Default::default()
    };
    match store.update_task(owner, target.id, patch).await {
        Ok(Some(task)) => ChatOutcome::with_call(
            format!("I've updated the task '{}'.", task.title),
            ToolCall {
                name: "update_task".to_string(),
                arguments,
                result: json!({
                    "task_id": task.id,
                    "title": task.title,
                    "description": task.description,
                    "updated": true,
                    "success": true,
                }),
            },
        ),
        Ok(None) => ChatOutcome::with_call(
            "I couldn't find that task on your list.".to_string(),
            failure_call("update_task", arguments, "Task not found or not owned by user"),
        ),
        Err(e) => ChatOutcome::with_call(
            format!("I encountered an error updating the task: {e}"),
            failure_call("update_task", arguments, &e.to_string()),
        ),
    }
}

/// 1-indexed lookup into the snapshot.  Position 0 and out-of-range both
/// yield `None`, which surfaces as a "not found" failure.
fn target_at(snapshot: &[TaskRow], position: usize) -> Option<&TaskRow> {
    position.checked_sub(1).and_then(|i| snapshot.get(i))
}

fn failure_call(name: &str, arguments: Value, error: &str) -> ToolCall {
    ToolCall {
        name: name.to_string(),
        arguments,
        result: json!({ "error": error, "success": false }),
    }
}

fn store_failure(name: &str, owner: &str, e: &StoreError) -> ChatOutcome {
    ChatOutcome::with_call(
        format!("I encountered an error reading your tasks: {e}"),
        failure_call(name, json!({ "user_id": owner }), &e.to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{NewTask, Storage};
    use tempfile::TempDir;

    async fn test_store() -> (TempDir, Storage) {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path()).await.unwrap();
        (dir, storage)
    }

    async fn seed(store: &Storage, owner: &str, titles: &[&str]) {
        for title in titles {
            store
                .create_task(
                    owner,
                    NewTask {
                        title: title.to_string(),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn add_scenario_produces_exact_reply() {
        let (_dir, store) = test_store().await;
        let outcome = run("Add a task to buy groceries", "alice", &store).await;

        assert_eq!(
            outcome.reply,
            "I've added the task 'buy groceries' to your list."
        );
        assert_eq!(outcome.tool_calls.len(), 1);
        let call = &outcome.tool_calls[0];
        assert_eq!(call.name, "add_task");
        assert_eq!(call.result["success"], true);
        assert_eq!(call.result["title"], "buy groceries");
        assert_eq!(store.count_tasks("alice").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn list_reply_count_matches_store() {
        let (_dir, store) = test_store().await;
        seed(&store, "alice", &["one", "two", "three"]).await;
        seed(&store, "bob", &["other"]).await;

        let outcome = run("list my tasks", "alice", &store).await;
        assert_eq!(outcome.reply, "You have 3 tasks in your list.");
        let call = &outcome.tool_calls[0];
        assert_eq!(call.name, "list_tasks");
        assert_eq!(call.result["tasks"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn complete_out_of_range_position_is_failure_not_error() {
        let (_dir, store) = test_store().await;
        seed(&store, "alice", &["only task"]).await;

        let outcome = run("complete task 2", "alice", &store).await;
        assert_eq!(outcome.reply, "I couldn't find task 2 on your list.");
        let call = &outcome.tool_calls[0];
        assert_eq!(call.result["success"], false);

        // The one task is untouched.
        let tasks = store.snapshot_tasks("alice").await.unwrap();
        assert!(!tasks[0].completed);
    }

    #[tokio::test]
    async fn complete_without_position_takes_first_pending() {
        let (_dir, store) = test_store().await;
        seed(&store, "alice", &["first", "second"]).await;
        let snapshot = store.snapshot_tasks("alice").await.unwrap();
        store
            .update_task(
                "alice",
                snapshot[0].id,
                TaskPatch {
                    completed: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let outcome = run("mark it done", "alice", &store).await;
        assert_eq!(outcome.reply, "I've marked the task 'second' as completed.");
    }

    #[tokio::test]
    async fn complete_with_nothing_pending() {
        let (_dir, store) = test_store().await;
        let outcome = run("done", "alice", &store).await;
        assert_eq!(outcome.reply, "You don't have any pending tasks to complete.");
        assert_eq!(outcome.tool_calls[0].result["success"], false);
    }

    #[tokio::test]
    async fn delete_targets_position_and_defaults_to_first() {
        let (_dir, store) = test_store().await;
        seed(&store, "alice", &["first", "second", "third"]).await;

        let outcome = run("delete task 2", "alice", &store).await;
        assert_eq!(outcome.reply, "I've removed the task 'second' from your list.");

        let outcome = run("delete it", "alice", &store).await;
        assert_eq!(outcome.reply, "I've removed the task 'first' from your list.");

        let remaining = store.snapshot_tasks("alice").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].title, "third");
    }

    #[tokio::test]
    async fn update_sets_new_title() {
        let (_dir, store) = test_store().await;
        seed(&store, "alice", &["old title"]).await;

        let outcome = run("update task 1 to 'buy almond milk'", "alice", &store).await;
        assert_eq!(outcome.reply, "I've updated the task 'buy almond milk'.");

        let tasks = store.snapshot_tasks("alice").await.unwrap();
        assert_eq!(tasks[0].title, "buy almond milk");
    }

    #[tokio::test]
    async fn update_without_content_keeps_title() {
        let (_dir, store) = test_store().await;
        seed(&store, "alice", &["keep me"]).await;

        let outcome = run("modify task 1", "alice", &store).await;
        assert_eq!(outcome.reply, "I've updated the task 'keep me'.");
    }

    #[tokio::test]
    async fn update_with_overlong_content_is_validation_failure() {
        let (_dir, store) = test_store().await;
        seed(&store, "alice", &["short"]).await;

        let long = "x".repeat(201);
        let intent = Intent::UpdateTask {
            position: Some(1),
            content: Some(long),
        };
        let outcome = dispatch("irrelevant", intent, "alice", &store).await;
        assert!(outcome.reply.starts_with("I encountered an error updating the task:"));
        assert_eq!(outcome.tool_calls[0].result["success"], false);

        let tasks = store.snapshot_tasks("alice").await.unwrap();
        assert_eq!(tasks[0].title, "short");
    }

    #[tokio::test]
    async fn empty_message_echoes_prompt_with_no_tool_calls() {
        let (_dir, store) = test_store().await;
        let outcome = run("", "alice", &store).await;
        assert_eq!(
            outcome.reply,
            "I received your message: ''. How can I help you with your tasks?"
        );
        assert!(outcome.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn foreign_tasks_are_invisible_to_dispatch() {
        let (_dir, store) = test_store().await;
        seed(&store, "bob", &["bob's secret"]).await;

        let outcome = run("delete task 1", "alice", &store).await;
        assert_eq!(outcome.reply, "I couldn't find task 1 on your list.");
        assert_eq!(store.count_tasks("bob").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn position_zero_is_not_found() {
        let (_dir, store) = test_store().await;
        seed(&store, "alice", &["first"]).await;

        let outcome = run("delete task 0", "alice", &store).await;
        assert_eq!(outcome.reply, "I couldn't find task 0 on your list.");
        assert_eq!(store.count_tasks("alice").await.unwrap(), 1);
    }
}
