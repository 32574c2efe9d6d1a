use chrono::Utc;
use sqlx::{sqlite::SqliteConnectOptions, SqlitePool};
use std::{path::Path, str::FromStr};
use uuid::Uuid;

/// Default timeout for individual SQLite queries.
/// Prevents hung queries from blocking the server indefinitely.
const QUERY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Execute a future with the standard query timeout.
/// Returns an error if the operation takes longer than `QUERY_TIMEOUT`.
async fn with_timeout<T>(
    fut: impl std::future::Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    match tokio::time::timeout(QUERY_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout),
    }
}

// ─── Errors ───────────────────────────────────────────────────────────────────

/// Storage-level failure taxonomy.  Validation variants map to 422 at the
/// REST surface; everything else is a 500.  "Not found" is not an error —
/// owner-scoped lookups return `Option` / `bool` so a missing task and a
/// task owned by someone else are indistinguishable to the caller.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Title must be between 1 and 200 characters")]
    InvalidTitle,
    #[error("Description must be 1000 characters or less")]
    InvalidDescription,
    #[error("Email already registered")]
    EmailTaken,
    #[error("Username already taken")]
    UsernameTaken,
    #[error("database query timed out after 30s")]
    Timeout,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl StoreError {
    /// True for input errors the caller can fix (422), false for faults (500).
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            StoreError::InvalidTitle
                | StoreError::InvalidDescription
                | StoreError::EmailTaken
                | StoreError::UsernameTaken
        )
    }
}

// ─── Row types ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TaskRow {
    pub id: i64,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    /// RFC 3339 due date, if the caller set one.
    pub due_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub username: String,
    /// KDF-encoded hash — never serialized into responses.
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
    pub last_login_at: Option<String>,
}

// ─── Input types ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    pub due_date: Option<String>,
}

/// Partial task update — `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub completed: Option<bool>,
    pub due_date: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub email: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

// ─── Filters ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    All,
    Completed,
    Pending,
}

impl StatusFilter {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "all" => Some(Self::All),
            "completed" => Some(Self::Completed),
            "pending" => Some(Self::Pending),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskSort {
    /// Newest first — the default listing order.
    CreatedAt,
    DueDate,
    Title,
}

impl TaskSort {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created_at" => Some(Self::CreatedAt),
            "due_date" => Some(Self::DueDate),
            "title" => Some(Self::Title),
            _ => None,
        }
    }
}

fn validate_task_fields(title: Option<&str>, description: Option<&str>) -> Result<(), StoreError> {
    if let Some(t) = title {
        if t.is_empty() || t.chars().count() > 200 {
            return Err(StoreError::InvalidTitle);
        }
    }
    if let Some(d) = description {
        if d.chars().count() > 1000 {
            return Err(StoreError::InvalidDescription);
        }
    }
    Ok(())
}

// ─── Storage ──────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn new(data_dir: &Path) -> Result<Self, StoreError> {
        Self::new_with_slow_query(data_dir, 0).await
    }

    /// Create storage with slow-query logging enabled.
    ///
    /// `slow_query_ms` is the threshold in milliseconds — queries exceeding it
    /// are logged at WARN level. Set to 0 to disable slow-query logging.
    pub async fn new_with_slow_query(data_dir: &Path, slow_query_ms: u64) -> Result<Self, StoreError> {
        tokio::fs::create_dir_all(data_dir)
            .await
            .map_err(|e| StoreError::Db(sqlx::Error::Io(e)))?;
        let db_path = data_dir.join("todod.db");
        let mut opts =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))?
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .create_if_missing(true);

        if slow_query_ms > 0 {
            use sqlx::ConnectOptions;
            opts = opts.log_slow_statements(
                log::LevelFilter::Warn,
                std::time::Duration::from_millis(slow_query_ms),
            );
        }

        let pool = SqlitePool::connect_with(opts).await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    async fn migrate(pool: &SqlitePool) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id            TEXT PRIMARY KEY,
                email         TEXT NOT NULL UNIQUE,
                username      TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                first_name    TEXT,
                last_name     TEXT,
                is_active     INTEGER NOT NULL DEFAULT 1,
                created_at    TEXT NOT NULL,
                updated_at    TEXT NOT NULL,
                last_login_at TEXT
            );
            CREATE TABLE IF NOT EXISTS tasks (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     TEXT NOT NULL,
                title       TEXT NOT NULL,
                description TEXT,
                completed   INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_user ON tasks(user_id);
            "#,
        )
        .execute(pool)
        .await?;

        // Idempotent column additions (ALTER TABLE IF NOT EXISTS is not
        // supported in SQLite, so we attempt the ALTER and ignore the
        // "duplicate column name" error).
        let alter_stmts = ["ALTER TABLE tasks ADD COLUMN due_date TEXT"];
        for stmt in alter_stmts {
            let result = sqlx::query(stmt).execute(pool).await;
            if let Err(e) = result {
                let msg = e.to_string();
                if !msg.contains("duplicate column") {
                    return Err(e.into());
                }
            }
        }

        Ok(())
    }

    // ─── Tasks ──────────────────────────────────────────────────────────────

    pub async fn create_task(&self, owner: &str, task: NewTask) -> Result<TaskRow, StoreError> {
        validate_task_fields(Some(&task.title), task.description.as_deref())?;
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "INSERT INTO tasks (user_id, title, description, completed, due_date, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(owner)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.completed)
        .bind(&task.due_date)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        Ok(
            sqlx::query_as("SELECT * FROM tasks WHERE id = ? AND user_id = ?")
                .bind(id)
                .bind(owner)
                .fetch_one(&self.pool)
                .await?,
        )
    }

    pub async fn get_task(&self, owner: &str, id: i64) -> Result<Option<TaskRow>, StoreError> {
        Ok(
            sqlx::query_as("SELECT * FROM tasks WHERE id = ? AND user_id = ?")
                .bind(id)
                .bind(owner)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn list_tasks(
        &self,
        owner: &str,
        status: StatusFilter,
        sort: TaskSort,
    ) -> Result<Vec<TaskRow>, StoreError> {
        let status_clause = match status {
            StatusFilter::All => "",
            StatusFilter::Completed => " AND completed = 1",
            StatusFilter::Pending => " AND completed = 0",
        };
        let order_clause = match sort {
            TaskSort::CreatedAt => " ORDER BY created_at DESC",
            TaskSort::DueDate => " ORDER BY due_date",
            TaskSort::Title => " ORDER BY title",
        };
        let sql = format!("SELECT * FROM tasks WHERE user_id = ?{status_clause}{order_clause}");
        with_timeout(async {
            Ok(sqlx::query_as(&sql)
                .bind(owner)
                .fetch_all(&self.pool)
                .await?)
        })
        .await
    }

    /// Materialized owner-scoped list in store (insertion) order.  The chat
    /// dispatcher takes this snapshot once per request and resolves 1-indexed
    /// position references against it, so a concurrent mutation cannot shift
    /// the target mid-dispatch.
    pub async fn snapshot_tasks(&self, owner: &str) -> Result<Vec<TaskRow>, StoreError> {
        with_timeout(async {
            Ok(
                sqlx::query_as("SELECT * FROM tasks WHERE user_id = ? ORDER BY id ASC")
                    .bind(owner)
                    .fetch_all(&self.pool)
                    .await?,
            )
        })
        .await
    }

    pub async fn count_tasks(&self, owner: &str) -> Result<u64, StoreError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tasks WHERE user_id = ?")
            .bind(owner)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0 as u64)
    }

    /// Partial update.  Returns `None` when the task does not exist or is not
    /// owned by `owner` — the two cases are deliberately indistinguishable.
    pub async fn update_task(
        &self,
        owner: &str,
        id: i64,
        patch: TaskPatch,
    ) -> Result<Option<TaskRow>, StoreError> {
        let Some(existing) = self.get_task(owner, id).await? else {
            return Ok(None);
        };
        validate_task_fields(patch.title.as_deref(), patch.description.as_deref())?;

        let title = patch.title.unwrap_or(existing.title);
        let description = patch.description.or(existing.description);
        let completed = patch.completed.unwrap_or(existing.completed);
        let due_date = patch.due_date.or(existing.due_date);
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "UPDATE tasks SET title = ?, description = ?, completed = ?, due_date = ?, updated_at = ?
             WHERE id = ? AND user_id = ?",
        )
        .bind(&title)
        .bind(&description)
        .bind(completed)
        .bind(&due_date)
        .bind(&now)
        .bind(id)
        .bind(owner)
        .execute(&self.pool)
        .await?;

        self.get_task(owner, id).await
    }

    pub async fn toggle_task_completion(
        &self,
        owner: &str,
        id: i64,
    ) -> Result<Option<TaskRow>, StoreError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE tasks SET completed = NOT completed, updated_at = ?
             WHERE id = ? AND user_id = ?",
        )
        .bind(&now)
        .bind(id)
        .bind(owner)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_task(owner, id).await
    }

    /// Returns `true` if a row was deleted.  Deleting an already-deleted or
    /// foreign task returns `false`, never an error.
    pub async fn delete_task(&self, owner: &str, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(owner)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ─── Users ──────────────────────────────────────────────────────────────

    pub async fn create_user(&self, user: NewUser) -> Result<UserRow, StoreError> {
        if self.get_user_by_email(&user.email).await?.is_some() {
            return Err(StoreError::EmailTaken);
        }
        if self.get_user_by_username(&user.username).await?.is_some() {
            return Err(StoreError::UsernameTaken);
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO users (id, email, username, password_hash, first_name, last_name, is_active, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)",
        )
        .bind(&id)
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(&id)
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>, StoreError> {
        Ok(sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>, StoreError> {
        Ok(sqlx::query_as("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>, StoreError> {
        Ok(sqlx::query_as("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn update_user(
        &self,
        id: &str,
        patch: UserPatch,
    ) -> Result<Option<UserRow>, StoreError> {
        let Some(existing) = self.get_user_by_id(id).await? else {
            return Ok(None);
        };

        // Uniqueness checks only when the value actually changes.
        if let Some(email) = patch.email.as_deref() {
            if email != existing.email && self.get_user_by_email(email).await?.is_some() {
                return Err(StoreError::EmailTaken);
            }
        }
        if let Some(username) = patch.username.as_deref() {
            if username != existing.username && self.get_user_by_username(username).await?.is_some()
            {
                return Err(StoreError::UsernameTaken);
            }
        }

        let email = patch.email.unwrap_or(existing.email);
        let username = patch.username.unwrap_or(existing.username);
        let first_name = patch.first_name.or(existing.first_name);
        let last_name = patch.last_name.or(existing.last_name);
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "UPDATE users SET email = ?, username = ?, first_name = ?, last_name = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&email)
        .bind(&username)
        .bind(&first_name)
        .bind(&last_name)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.get_user_by_id(id).await
    }

    pub async fn touch_last_login(&self, id: &str) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE users SET last_login_at = ? WHERE id = ?")
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_storage() -> (TempDir, Storage) {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path()).await.unwrap();
        (dir, storage)
    }

    fn new_task(title: &str) -> NewTask {
        NewTask {
            title: title.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_and_list_scoped_by_owner() {
        let (_dir, storage) = test_storage().await;
        storage.create_task("alice", new_task("buy milk")).await.unwrap();
        storage.create_task("alice", new_task("walk dog")).await.unwrap();
        storage.create_task("bob", new_task("file taxes")).await.unwrap();

        let alice = storage
            .list_tasks("alice", StatusFilter::All, TaskSort::CreatedAt)
            .await
            .unwrap();
        assert_eq!(alice.len(), 2);
        assert!(alice.iter().all(|t| t.user_id == "alice"));
        assert_eq!(storage.count_tasks("bob").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn snapshot_is_insertion_ordered() {
        let (_dir, storage) = test_storage().await;
        let first = storage.create_task("alice", new_task("first")).await.unwrap();
        let second = storage.create_task("alice", new_task("second")).await.unwrap();

        let snapshot = storage.snapshot_tasks("alice").await.unwrap();
        assert_eq!(snapshot[0].id, first.id);
        assert_eq!(snapshot[1].id, second.id);
    }

    #[tokio::test]
    async fn title_validation_rejected() {
        let (_dir, storage) = test_storage().await;
        let err = storage.create_task("alice", new_task("")).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidTitle));

        let err = storage
            .create_task("alice", new_task(&"x".repeat(201)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTitle));
    }

    #[tokio::test]
    async fn toggle_flips_completion() {
        let (_dir, storage) = test_storage().await;
        let task = storage.create_task("alice", new_task("buy milk")).await.unwrap();
        assert!(!task.completed);

        let toggled = storage
            .toggle_task_completion("alice", task.id)
            .await
            .unwrap()
            .unwrap();
        assert!(toggled.completed);

        let toggled = storage
            .toggle_task_completion("alice", task.id)
            .await
            .unwrap()
            .unwrap();
        assert!(!toggled.completed);
    }

    #[tokio::test]
    async fn second_delete_is_false_not_error() {
        let (_dir, storage) = test_storage().await;
        let task = storage.create_task("alice", new_task("buy milk")).await.unwrap();

        assert!(storage.delete_task("alice", task.id).await.unwrap());
        assert!(!storage.delete_task("alice", task.id).await.unwrap());
    }

    #[tokio::test]
    async fn foreign_owner_mutations_look_like_not_found() {
        let (_dir, storage) = test_storage().await;
        let task = storage.create_task("alice", new_task("buy milk")).await.unwrap();

        assert!(storage.get_task("mallory", task.id).await.unwrap().is_none());
        assert!(storage
            .update_task(
                "mallory",
                task.id,
                TaskPatch {
                    title: Some("stolen".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .is_none());
        assert!(storage
            .toggle_task_completion("mallory", task.id)
            .await
            .unwrap()
            .is_none());
        assert!(!storage.delete_task("mallory", task.id).await.unwrap());

        // Untouched for the real owner.
        let fetched = storage.get_task("alice", task.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "buy milk");
        assert!(!fetched.completed);
    }

    #[tokio::test]
    async fn status_filter_splits_completed_and_pending() {
        let (_dir, storage) = test_storage().await;
        let done = storage.create_task("alice", new_task("done one")).await.unwrap();
        storage.create_task("alice", new_task("pending one")).await.unwrap();
        storage.toggle_task_completion("alice", done.id).await.unwrap();

        let completed = storage
            .list_tasks("alice", StatusFilter::Completed, TaskSort::CreatedAt)
            .await
            .unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].title, "done one");

        let pending = storage
            .list_tasks("alice", StatusFilter::Pending, TaskSort::CreatedAt)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].title, "pending one");
    }

    #[tokio::test]
    async fn duplicate_email_and_username_rejected() {
        let (_dir, storage) = test_storage().await;
        let user = NewUser {
            email: "a@example.com".to_string(),
            username: "alice".to_string(),
            password_hash: "h".to_string(),
            first_name: None,
            last_name: None,
        };
        storage.create_user(user.clone()).await.unwrap();

        let err = storage.create_user(user.clone()).await.unwrap_err();
        assert!(matches!(err, StoreError::EmailTaken));

        let mut other_email = user;
        other_email.email = "b@example.com".to_string();
        let err = storage.create_user(other_email).await.unwrap_err();
        assert!(matches!(err, StoreError::UsernameTaken));
    }

    #[tokio::test]
    async fn migrate_is_idempotent_across_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let storage = Storage::new(dir.path()).await.unwrap();
            storage.create_task("alice", new_task("persisted")).await.unwrap();
        }
        let storage = Storage::new(dir.path()).await.unwrap();
        assert_eq!(storage.count_tasks("alice").await.unwrap(), 1);
    }
}
