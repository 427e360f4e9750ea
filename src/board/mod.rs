//! Task board back-end.
//!
//! ## Overview
//!
//! Users own tasks that carry a duration in minutes and an open-ended list
//! of typed properties. Completing a task advances a daily streak. Each user
//! also keeps display settings and a template of default properties that is
//! attached to every new task.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐   HTTP   ┌──────────────────────────────────────────────────┐
//! │  Client  │ ───────> │  server.rs  (axum Router, TraceLayer, CORS)      │
//! │          │ <─────── │    └─ api.rs  (route handlers, AppState)         │
//! └──────────┘   JSON   │         │  auth.rs  (Bearer token → AuthUser)    │
//!                       │         │                                        │
//!                       │         ├─ properties.rs  (value validation)     │
//!                       │         ├─ layout.rs      (dashboard, sorting)   │
//!                       │         ├─ recommend.rs   (LLM + rate limiter)   │
//!                       │         v                                        │
//!                       │  db.rs  (BoardDb via DbHandle, SQLite)           │
//!                       │         └─ streak.rs  (applied on completion)    │
//!                       └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Typical Request Flow (complete a task)
//!
//! 1. `PUT /api/tasks` with `{id, completed: true}` → `AuthUser` resolves the
//!    session token to the user.
//! 2. `api` computes "today" in the configured UTC offset and calls
//!    `BoardDb::set_task_completed` on the blocking pool.
//! 3. Inside one transaction the task is marked complete and, if it was
//!    active before, `StreakState::record_completion` updates the user.
//! 4. The response carries the task and the streak as currently displayed.

pub mod api;
pub mod auth;
pub mod db;
pub mod layout;
pub mod models;
pub mod properties;
pub mod recommend;
pub mod server;
pub mod streak;
