use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::models::*;
use super::streak::StreakState;

/// Tasks every new account starts with.
pub const STARTER_TASKS: [(&str, i64); 3] = [
    ("review project requirements", 45),
    ("plan the week ahead", 30),
    ("go for a 15-minute walk", 15),
];

const TASK_COLUMNS: &str =
    "id, user_id, title, duration, completed, completed_at, properties, created_at, updated_at";

const USER_COLUMNS: &str = "id, email, name, streak, last_completed_on, theme, task_spacing, property_visibility, created_at";

/// Async-safe handle to the board database.
///
/// Wraps `BoardDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O never
/// ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<BoardDb>>,
}

impl DbHandle {
    pub fn new(db: BoardDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&BoardDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }

    /// Acquire the database mutex synchronously. Only for startup and tests.
    pub fn lock_sync(&self) -> Result<std::sync::MutexGuard<'_, BoardDb>> {
        self.inner
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))
    }
}

pub struct BoardDb {
    conn: Connection,
}

impl BoardDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS users (
                    id TEXT PRIMARY KEY,
                    email TEXT NOT NULL UNIQUE,
                    name TEXT,
                    streak INTEGER NOT NULL DEFAULT 0,
                    last_completed_on TEXT,
                    theme TEXT NOT NULL DEFAULT 'system',
                    task_spacing TEXT NOT NULL DEFAULT 'default',
                    property_visibility TEXT NOT NULL DEFAULT '{}',
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS sessions (
                    token_hash TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    expires_at INTEGER NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS tasks (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    title TEXT NOT NULL,
                    duration INTEGER NOT NULL,
                    completed INTEGER NOT NULL DEFAULT 0,
                    completed_at TEXT,
                    properties TEXT NOT NULL DEFAULT '[]',
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS properties (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    type TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS default_properties (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    type TEXT NOT NULL,
                    options TEXT NOT NULL DEFAULT '[]',
                    position INTEGER NOT NULL DEFAULT 0
                );

                CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
                CREATE INDEX IF NOT EXISTS idx_tasks_user ON tasks(user_id, completed);
                CREATE INDEX IF NOT EXISTS idx_properties_user ON properties(user_id);
                CREATE INDEX IF NOT EXISTS idx_default_properties_user ON default_properties(user_id, position);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Users ─────────────────────────────────────────────────────────

    /// Find the user with this email or create one. New users get the
    /// starter tasks. Returns the user and whether it was just created.
    pub fn upsert_user(&self, email: &str, name: Option<&str>) -> Result<(User, bool)> {
        let email = email.trim().to_lowercase();
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM users WHERE email = ?1",
                params![email],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to look up user by email")?;

        let (id, created) = match existing {
            Some(id) => {
                if let Some(n) = name {
                    tx.execute("UPDATE users SET name = ?1 WHERE id = ?2", params![n, id])
                        .context("Failed to update user name")?;
                }
                (id, false)
            }
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                tx.execute(
                    "INSERT INTO users (id, email, name) VALUES (?1, ?2, ?3)",
                    params![id, email, name],
                )
                .context("Failed to insert user")?;
                self.seed_starter_tasks(&id)?;
                (id, true)
            }
        };
        tx.commit().context("Failed to commit user upsert")?;

        let user = self
            .get_user(&id)?
            .context("User not found after upsert")?;
        Ok((user, created))
    }

    /// Insert the starter tasks for `user_id`. Runs inside the caller's
    /// transaction when there is one.
    pub fn seed_starter_tasks(&self, user_id: &str) -> Result<()> {
        for (title, duration) in STARTER_TASKS {
            self.conn
                .execute(
                    "INSERT INTO tasks (user_id, title, duration) VALUES (?1, ?2, ?3)",
                    params![user_id, title, duration],
                )
                .context("Failed to insert starter task")?;
        }
        Ok(())
    }

    pub fn get_user(&self, id: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
        let row = self
            .conn
            .query_row(&sql, params![id], UserRow::from_row)
            .optional()
            .context("Failed to query user")?;
        row.map(UserRow::into_user).transpose()
    }

    // ── Sessions ──────────────────────────────────────────────────────

    pub fn create_session(&self, user_id: &str, token_hash: &str, expires_at: i64) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO sessions (token_hash, user_id, expires_at) VALUES (?1, ?2, ?3)",
                params![token_hash, user_id, expires_at],
            )
            .context("Failed to insert session")?;
        Ok(())
    }

    /// Resolve a session to its user, ignoring sessions expired at `now`
    /// (unix seconds).
    pub fn user_for_session(&self, token_hash: &str, now: i64) -> Result<Option<User>> {
        let user_id: Option<String> = self
            .conn
            .query_row(
                "SELECT user_id FROM sessions WHERE token_hash = ?1 AND expires_at > ?2",
                params![token_hash, now],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query session")?;
        match user_id {
            Some(id) => self.get_user(&id),
            None => Ok(None),
        }
    }

    pub fn delete_session(&self, token_hash: &str) -> Result<bool> {
        let n = self
            .conn
            .execute(
                "DELETE FROM sessions WHERE token_hash = ?1",
                params![token_hash],
            )
            .context("Failed to delete session")?;
        Ok(n > 0)
    }

    pub fn purge_expired_sessions(&self, now: i64) -> Result<usize> {
        self.conn
            .execute("DELETE FROM sessions WHERE expires_at <= ?1", params![now])
            .context("Failed to purge expired sessions")
    }

    // ── Tasks ─────────────────────────────────────────────────────────

    pub fn create_task(&self, user_id: &str, task: &NewTask) -> Result<Task> {
        let properties =
            serde_json::to_string(&task.properties).context("Failed to encode properties")?;
        self.conn
            .execute(
                "INSERT INTO tasks (user_id, title, duration, properties) VALUES (?1, ?2, ?3, ?4)",
                params![user_id, task.title, task.duration, properties],
            )
            .context("Failed to insert task")?;
        let id = self.conn.last_insert_rowid();
        self.get_task(user_id, id)?
            .context("Task not found after insert")
    }

    /// Active and completed tasks of a user, each newest first.
    pub fn list_tasks(&self, user_id: &str) -> Result<TaskLists> {
        let sql = format!(
            "SELECT {} FROM tasks WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
            TASK_COLUMNS
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare list_tasks")?;
        let rows = stmt
            .query_map(params![user_id], TaskRow::from_row)
            .context("Failed to query tasks")?;

        let mut lists = TaskLists {
            active: Vec::new(),
            completed: Vec::new(),
        };
        for row in rows {
            let task = row.context("Failed to read task row")?.into_task()?;
            if task.completed {
                lists.completed.push(task);
            } else {
                lists.active.push(task);
            }
        }
        Ok(lists)
    }

    /// Fetch a task owned by `user_id`. Other users' tasks are invisible.
    pub fn get_task(&self, user_id: &str, id: i64) -> Result<Option<Task>> {
        let sql = format!(
            "SELECT {} FROM tasks WHERE id = ?1 AND user_id = ?2",
            TASK_COLUMNS
        );
        let row = self
            .conn
            .query_row(&sql, params![id, user_id], TaskRow::from_row)
            .optional()
            .context("Failed to query task")?;
        row.map(TaskRow::into_task).transpose()
    }

    pub fn update_task(&self, user_id: &str, id: i64, patch: &TaskPatch) -> Result<Option<Task>> {
        if self.get_task(user_id, id)?.is_none() {
            return Ok(None);
        }

        // Safety: DbHandle's Mutex already guarantees single-threaded access.
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        if let Some(title) = &patch.title {
            tx.execute(
                "UPDATE tasks SET title = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![title, id],
            )
            .context("Failed to update task title")?;
        }
        if let Some(duration) = patch.duration {
            tx.execute(
                "UPDATE tasks SET duration = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![duration, id],
            )
            .context("Failed to update task duration")?;
        }
        if let Some(properties) = &patch.properties {
            let encoded =
                serde_json::to_string(properties).context("Failed to encode properties")?;
            tx.execute(
                "UPDATE tasks SET properties = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![encoded, id],
            )
            .context("Failed to update task properties")?;
        }

        tx.commit().context("Failed to commit task update")?;
        self.get_task(user_id, id)
    }

    /// Complete or re-open a task. A transition to completed advances the
    /// owner's streak for `today`; re-opening leaves the streak untouched.
    pub fn set_task_completed(
        &self,
        user_id: &str,
        id: i64,
        completed: bool,
        today: NaiveDate,
    ) -> Result<Option<TaskCompletion>> {
        let Some(task) = self.get_task(user_id, id)? else {
            return Ok(None);
        };
        let user = self
            .get_user(user_id)?
            .with_context(|| format!("User {} not found", user_id))?;
        let mut state = StreakState {
            streak: user.streak,
            last_completed_on: user.last_completed_on,
        };

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        if completed && !task.completed {
            state = state.record_completion(today);
            tx.execute(
                "UPDATE users SET streak = ?1, last_completed_on = ?2 WHERE id = ?3",
                params![state.streak, state.last_completed_on.map(|d| d.to_string()), user_id],
            )
            .context("Failed to update streak")?;
            tx.execute(
                "UPDATE tasks SET completed = 1, completed_at = datetime('now'), updated_at = datetime('now') WHERE id = ?1",
                params![id],
            )
            .context("Failed to complete task")?;
        } else if !completed && task.completed {
            tx.execute(
                "UPDATE tasks SET completed = 0, completed_at = NULL, updated_at = datetime('now') WHERE id = ?1",
                params![id],
            )
            .context("Failed to re-open task")?;
        }

        tx.commit().context("Failed to commit completion")?;

        let task = self
            .get_task(user_id, id)?
            .context("Task not found after completion")?;
        Ok(Some(TaskCompletion {
            task,
            streak: state.current(today),
        }))
    }

    pub fn delete_task(&self, user_id: &str, id: i64) -> Result<bool> {
        let n = self
            .conn
            .execute(
                "DELETE FROM tasks WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )
            .context("Failed to delete task")?;
        Ok(n > 0)
    }

    // ── Property definitions ──────────────────────────────────────────

    pub fn list_property_definitions(&self, user_id: &str) -> Result<Vec<PropertyDefinition>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, user_id, name, type, created_at FROM properties
                 WHERE user_id = ?1 ORDER BY name ASC, id ASC",
            )
            .context("Failed to prepare list_property_definitions")?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .context("Failed to query property definitions")?;
        let mut defs = Vec::new();
        for row in rows {
            let (id, user_id, name, kind, created_at) =
                row.context("Failed to read property definition row")?;
            defs.push(PropertyDefinition {
                id,
                user_id,
                name,
                kind: parse_property_type(&kind)?,
                created_at,
            });
        }
        Ok(defs)
    }

    pub fn create_property_definition(
        &self,
        user_id: &str,
        name: &str,
        kind: PropertyType,
    ) -> Result<PropertyDefinition> {
        self.conn
            .execute(
                "INSERT INTO properties (user_id, name, type) VALUES (?1, ?2, ?3)",
                params![user_id, name, kind.as_str()],
            )
            .context("Failed to insert property definition")?;
        let id = self.conn.last_insert_rowid();
        self.list_property_definitions(user_id)?
            .into_iter()
            .find(|d| d.id == id)
            .context("Property definition not found after insert")
    }

    // ── Default properties ────────────────────────────────────────────

    pub fn list_default_properties(&self, user_id: &str) -> Result<Vec<DefaultProperty>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, user_id, name, type, options, position FROM default_properties
                 WHERE user_id = ?1 ORDER BY position ASC",
            )
            .context("Failed to prepare list_default_properties")?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            })
            .context("Failed to query default properties")?;
        let mut props = Vec::new();
        for row in rows {
            let (id, user_id, name, kind, options, order) =
                row.context("Failed to read default property row")?;
            props.push(DefaultProperty {
                id,
                user_id,
                name,
                kind: parse_property_type(&kind)?,
                options: serde_json::from_str(&options)
                    .context("Failed to parse default property options JSON")?,
                order,
            });
        }
        Ok(props)
    }

    /// Replace the user's whole template: delete all, insert all, in one
    /// transaction. `order` follows the input order.
    pub fn replace_default_properties(
        &self,
        user_id: &str,
        props: &[NewDefaultProperty],
    ) -> Result<Vec<DefaultProperty>> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "DELETE FROM default_properties WHERE user_id = ?1",
            params![user_id],
        )
        .context("Failed to clear default properties")?;
        for (index, prop) in props.iter().enumerate() {
            let options =
                serde_json::to_string(&prop.options).context("Failed to encode options")?;
            tx.execute(
                "INSERT INTO default_properties (user_id, name, type, options, position)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![user_id, prop.name, prop.kind.as_str(), options, index as i64],
            )
            .context("Failed to insert default property")?;
        }
        tx.commit().context("Failed to commit default properties")?;
        self.list_default_properties(user_id)
    }

    // ── Settings ──────────────────────────────────────────────────────

    pub fn update_visibility(
        &self,
        user_id: &str,
        visibility: &BTreeMap<String, bool>,
    ) -> Result<Option<BTreeMap<String, bool>>> {
        let encoded = serde_json::to_string(visibility).context("Failed to encode visibility")?;
        let n = self
            .conn
            .execute(
                "UPDATE users SET property_visibility = ?1 WHERE id = ?2",
                params![encoded, user_id],
            )
            .context("Failed to update property visibility")?;
        if n == 0 {
            return Ok(None);
        }
        Ok(self
            .get_user(user_id)?
            .map(|u| u.settings.property_visibility))
    }

    pub fn update_appearance(
        &self,
        user_id: &str,
        theme: Option<Theme>,
        spacing: Option<TaskSpacing>,
    ) -> Result<Option<Appearance>> {
        if let Some(theme) = theme {
            self.conn
                .execute(
                    "UPDATE users SET theme = ?1 WHERE id = ?2",
                    params![theme.as_str(), user_id],
                )
                .context("Failed to update theme")?;
        }
        if let Some(spacing) = spacing {
            self.conn
                .execute(
                    "UPDATE users SET task_spacing = ?1 WHERE id = ?2",
                    params![spacing.as_str(), user_id],
                )
                .context("Failed to update task spacing")?;
        }
        Ok(self.get_user(user_id)?.map(|u| Appearance {
            theme: u.settings.theme,
            task_spacing: u.settings.task_spacing,
        }))
    }
}

fn parse_property_type(raw: &str) -> Result<PropertyType> {
    PropertyType::from_str(raw)
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to parse property type")
}

/// Intermediate row struct for tasks.
struct TaskRow {
    id: i64,
    user_id: String,
    title: String,
    duration: i64,
    completed: i64,
    completed_at: Option<String>,
    properties: String,
    created_at: String,
    updated_at: String,
}

impl TaskRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            duration: row.get(3)?,
            completed: row.get(4)?,
            completed_at: row.get(5)?,
            properties: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_task(self) -> Result<Task> {
        let properties: Vec<TaskProperty> = serde_json::from_str(&self.properties)
            .context("Failed to parse task properties JSON")?;
        Ok(Task {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            duration: self.duration,
            completed: self.completed != 0,
            completed_at: self.completed_at,
            properties,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Intermediate row struct for users.
struct UserRow {
    id: String,
    email: String,
    name: Option<String>,
    streak: i64,
    last_completed_on: Option<String>,
    theme: String,
    task_spacing: String,
    property_visibility: String,
    created_at: String,
}

impl UserRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            email: row.get(1)?,
            name: row.get(2)?,
            streak: row.get(3)?,
            last_completed_on: row.get(4)?,
            theme: row.get(5)?,
            task_spacing: row.get(6)?,
            property_visibility: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn into_user(self) -> Result<User> {
        let last_completed_on = self
            .last_completed_on
            .as_deref()
            .map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d"))
            .transpose()
            .context("Failed to parse last_completed_on")?;
        let theme = Theme::from_str(&self.theme)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse theme")?;
        let task_spacing = TaskSpacing::from_str(&self.task_spacing)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse task spacing")?;
        let property_visibility: BTreeMap<String, bool> =
            serde_json::from_str(&self.property_visibility)
                .context("Failed to parse property visibility JSON")?;

        Ok(User {
            id: self.id,
            email: self.email,
            name: self.name,
            streak: self.streak,
            last_completed_on,
            settings: UserSettings {
                theme,
                task_spacing,
                property_visibility,
            },
            created_at: self.created_at,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn new_task(title: &str, duration: i64) -> NewTask {
        NewTask {
            title: title.to_string(),
            duration,
            properties: Vec::new(),
        }
    }

    fn user(db: &BoardDb, email: &str) -> User {
        db.upsert_user(email, Some("Test")).unwrap().0
    }

    #[test]
    fn test_create_database_and_run_migrations() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let tables: Vec<String> = db
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        for t in ["default_properties", "properties", "sessions", "tasks", "users"] {
            assert!(tables.contains(&t.to_string()), "missing table {}", t);
        }
        // Migrations are idempotent.
        db.run_migrations()?;
        Ok(())
    }

    #[test]
    fn test_new_user_gets_starter_tasks() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let (u, created) = db.upsert_user("  Alice@Example.com ", Some("Alice"))?;
        assert!(created);
        assert_eq!(u.email, "alice@example.com");
        assert_eq!(u.streak, 0);
        assert_eq!(u.settings, UserSettings::default());

        let lists = db.list_tasks(&u.id)?;
        assert_eq!(lists.active.len(), 3);
        assert!(lists.completed.is_empty());
        let durations: Vec<i64> = lists.active.iter().map(|t| t.duration).collect();
        assert_eq!(durations.iter().sum::<i64>(), 90);

        let (again, created) = db.upsert_user("alice@example.com", None)?;
        assert!(!created);
        assert_eq!(again.id, u.id);
        assert_eq!(again.name.as_deref(), Some("Alice"));
        assert_eq!(db.list_tasks(&u.id)?.active.len(), 3);
        Ok(())
    }

    #[test]
    fn test_sessions_resolve_and_expire() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let u = user(&db, "s@example.com");
        db.create_session(&u.id, "hash-1", 1_000)?;

        assert_eq!(db.user_for_session("hash-1", 999)?.map(|u| u.id), Some(u.id.clone()));
        assert!(db.user_for_session("hash-1", 1_000)?.is_none());
        assert!(db.user_for_session("unknown", 0)?.is_none());

        assert_eq!(db.purge_expired_sessions(1_000)?, 1);
        assert!(!db.delete_session("hash-1")?);
        Ok(())
    }

    #[test]
    fn test_create_and_list_tasks_newest_first() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let u = user(&db, "t@example.com");
        let a = db.create_task(&u.id, &new_task("first", 10))?;
        let b = db.create_task(&u.id, &new_task("second", 20))?;
        assert_eq!(a.title, "first");
        assert!(!a.completed);

        let lists = db.list_tasks(&u.id)?;
        assert_eq!(lists.active[0].id, b.id);
        assert_eq!(lists.active[1].id, a.id);
        Ok(())
    }

    #[test]
    fn test_task_properties_persist() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let u = user(&db, "p@example.com");
        let mut t = new_task("with props", 25);
        t.properties = vec![TaskProperty {
            id: "p1".into(),
            name: "Effort".into(),
            kind: PropertyType::Number,
            value: json!(3),
            options: None,
        }];
        let created = db.create_task(&u.id, &t)?;
        let fetched = db.get_task(&u.id, created.id)?.expect("task should exist");
        assert_eq!(fetched.properties, t.properties);
        Ok(())
    }

    #[test]
    fn test_tasks_are_scoped_to_owner() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let alice = user(&db, "alice@example.com");
        let bob = user(&db, "bob@example.com");
        let t = db.create_task(&alice.id, &new_task("private", 10))?;

        assert!(db.get_task(&bob.id, t.id)?.is_none());
        assert!(db.update_task(&bob.id, t.id, &TaskPatch::default())?.is_none());
        assert!(db.set_task_completed(&bob.id, t.id, true, date(2026, 3, 1))?.is_none());
        assert!(!db.delete_task(&bob.id, t.id)?);
        assert!(db.get_task(&alice.id, t.id)?.is_some());
        Ok(())
    }

    #[test]
    fn test_update_task_fields() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let u = user(&db, "u@example.com");
        let t = db.create_task(&u.id, &new_task("old", 10))?;
        let patch = TaskPatch {
            title: Some("new".into()),
            duration: None,
            properties: Some(vec![]),
        };
        let updated = db.update_task(&u.id, t.id, &patch)?.expect("task should exist");
        assert_eq!(updated.title, "new");
        assert_eq!(updated.duration, 10);
        Ok(())
    }

    #[test]
    fn test_complete_task_advances_streak() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let u = user(&db, "c@example.com");
        let t1 = db.create_task(&u.id, &new_task("one", 10))?;
        let t2 = db.create_task(&u.id, &new_task("two", 10))?;
        let t3 = db.create_task(&u.id, &new_task("three", 10))?;

        let done = db
            .set_task_completed(&u.id, t1.id, true, date(2026, 3, 1))?
            .expect("task should exist");
        assert!(done.task.completed);
        assert!(done.task.completed_at.is_some());
        assert_eq!(done.streak, 1);

        // Same day: unchanged.
        let done = db.set_task_completed(&u.id, t2.id, true, date(2026, 3, 1))?.unwrap();
        assert_eq!(done.streak, 1);

        // Next day: extended.
        let done = db.set_task_completed(&u.id, t3.id, true, date(2026, 3, 2))?.unwrap();
        assert_eq!(done.streak, 2);

        let stored = db.get_user(&u.id)?.unwrap();
        assert_eq!(stored.streak, 2);
        assert_eq!(stored.last_completed_on, Some(date(2026, 3, 2)));

        let lists = db.list_tasks(&u.id)?;
        assert_eq!(lists.completed.len(), 3);
        Ok(())
    }

    #[test]
    fn test_recompleting_or_reopening_keeps_streak() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let u = user(&db, "r@example.com");
        let t = db.create_task(&u.id, &new_task("one", 10))?;

        db.set_task_completed(&u.id, t.id, true, date(2026, 3, 1))?;
        // Completing again two days later is a no-op.
        let again = db.set_task_completed(&u.id, t.id, true, date(2026, 3, 3))?.unwrap();
        assert_eq!(again.streak, 0);
        assert_eq!(db.get_user(&u.id)?.unwrap().streak, 1);

        let reopened = db.set_task_completed(&u.id, t.id, false, date(2026, 3, 1))?.unwrap();
        assert!(!reopened.task.completed);
        assert!(reopened.task.completed_at.is_none());
        assert_eq!(reopened.streak, 1);
        Ok(())
    }

    #[test]
    fn test_gap_resets_streak() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let u = user(&db, "g@example.com");
        let t1 = db.create_task(&u.id, &new_task("one", 10))?;
        let t2 = db.create_task(&u.id, &new_task("two", 10))?;
        db.set_task_completed(&u.id, t1.id, true, date(2026, 3, 1))?;
        let done = db.set_task_completed(&u.id, t2.id, true, date(2026, 3, 4))?.unwrap();
        assert_eq!(done.streak, 1);
        Ok(())
    }

    #[test]
    fn test_delete_task() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let u = user(&db, "d@example.com");
        let t = db.create_task(&u.id, &new_task("bye", 10))?;
        assert!(db.delete_task(&u.id, t.id)?);
        assert!(db.get_task(&u.id, t.id)?.is_none());
        assert!(!db.delete_task(&u.id, t.id)?);
        Ok(())
    }

    #[test]
    fn test_property_definitions_sorted_by_name() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let u = user(&db, "pd@example.com");
        db.create_property_definition(&u.id, "Zone", PropertyType::Select)?;
        let created = db.create_property_definition(&u.id, "Area", PropertyType::Text)?;
        assert_eq!(created.kind, PropertyType::Text);
        let names: Vec<_> = db
            .list_property_definitions(&u.id)?
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["Area", "Zone"]);
        Ok(())
    }

    #[test]
    fn test_replace_default_properties() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let u = user(&db, "dp@example.com");
        let first = vec![
            NewDefaultProperty {
                name: "Priority".into(),
                kind: PropertyType::Select,
                options: vec![SelectOption {
                    id: "o1".into(),
                    name: "High".into(),
                    color: None,
                }],
            },
            NewDefaultProperty {
                name: "Notes".into(),
                kind: PropertyType::Text,
                options: vec![],
            },
        ];
        let saved = db.replace_default_properties(&u.id, &first)?;
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0].name, "Priority");
        assert_eq!(saved[0].order, 0);
        assert_eq!(saved[0].options.len(), 1);
        assert_eq!(saved[1].order, 1);

        let second = vec![NewDefaultProperty {
            name: "Due".into(),
            kind: PropertyType::Date,
            options: vec![],
        }];
        let saved = db.replace_default_properties(&u.id, &second)?;
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].name, "Due");

        assert!(db.replace_default_properties(&u.id, &[])?.is_empty());
        Ok(())
    }

    #[test]
    fn test_update_settings() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let u = user(&db, "set@example.com");

        let vis = BTreeMap::from([("Notes".to_string(), false)]);
        let saved = db.update_visibility(&u.id, &vis)?.expect("user should exist");
        assert_eq!(saved, vis);

        let appearance = db
            .update_appearance(&u.id, Some(Theme::Dark), None)?
            .expect("user should exist");
        assert_eq!(appearance.theme, Theme::Dark);
        assert_eq!(appearance.task_spacing, TaskSpacing::Default);

        let appearance = db
            .update_appearance(&u.id, None, Some(TaskSpacing::Comfortable))?
            .unwrap();
        assert_eq!(appearance.theme, Theme::Dark);
        assert_eq!(appearance.task_spacing, TaskSpacing::Comfortable);

        assert!(db.update_visibility("nobody", &vis)?.is_none());
        Ok(())
    }

    #[test]
    fn test_deleting_user_cascades() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let u = user(&db, "x@example.com");
        db.create_session(&u.id, "h", i64::MAX)?;
        db.conn.execute("DELETE FROM users WHERE id = ?1", params![u.id])?;
        let remaining: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))?;
        assert_eq!(remaining, 0);
        assert!(db.user_for_session("h", 0)?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_db_handle_runs_on_blocking_pool() -> Result<()> {
        let handle = DbHandle::new(BoardDb::new_in_memory()?);
        let (u, _) = handle
            .call(|db| db.upsert_user("h@example.com", None))
            .await?;
        let id = u.id.clone();
        let lists = handle.call(move |db| db.list_tasks(&id)).await?;
        assert_eq!(lists.active.len(), 3);
        assert!(handle.lock_sync()?.get_user(&u.id)?.is_some());
        Ok(())
    }
}
