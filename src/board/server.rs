use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::api::{self, AppState};
use super::db::{BoardDb, DbHandle};
use super::recommend::GeminiRecommender;
use crate::config::TaskboardConfig;

/// Open (creating if needed) the database file and its parent directory.
pub fn open_database(path: &Path) -> Result<BoardDb> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create database directory: {}", parent.display())
        })?;
    }
    BoardDb::new(path)
        .with_context(|| format!("Failed to initialize database at {}", path.display()))
}

/// Build the full application router: API routes plus request tracing.
pub fn build_router(state: Arc<AppState>) -> Router {
    api::api_router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the taskboard server and run until Ctrl+C.
pub async fn start_server(config: TaskboardConfig) -> Result<()> {
    let db = open_database(&config.database.path)?;
    let purged = db.purge_expired_sessions(chrono::Utc::now().timestamp())?;
    if purged > 0 {
        info!(purged, "Removed expired sessions");
    }

    if config.recommender.api_key.is_none() {
        warn!("No recommender API key configured; duration suggestions use the fallback");
    }
    let recommender = Arc::new(GeminiRecommender::from_config(&config.recommender)?);
    let state = Arc::new(AppState::from_config(
        DbHandle::new(db),
        recommender,
        &config,
    )?);

    let mut app = build_router(state);
    if config.server.dev {
        app = app.layer(CorsLayer::permissive());
    }

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    info!(
        addr = %local_addr,
        db = %config.database.path.display(),
        dev = config.server.dev,
        "Taskboard running at http://{}",
        local_addr
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("Shutting down...");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_router(allow_dev_sign_in: bool) -> Router {
        let db = BoardDb::new_in_memory().unwrap();
        let mut config = TaskboardConfig::default();
        config.auth.allow_dev_sign_in = allow_dev_sign_in;
        let recommender = Arc::new(GeminiRecommender::from_config(&config.recommender).unwrap());
        let state = AppState::from_config(DbHandle::new(db), recommender, &config).unwrap();
        build_router(Arc::new(state))
    }

    #[tokio::test]
    async fn test_health_via_full_router() {
        let app = test_router(false);
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let app = test_router(false);
        let req = Request::builder()
            .uri("/api/nope")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_wrong_method_is_rejected() {
        let app = test_router(false);
        let req = Request::builder()
            .method("DELETE")
            .uri("/api/tasks")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_recommend_without_key_returns_fallback() {
        let app = test_router(true);
        let req = Request::builder()
            .method("POST")
            .uri("/api/auth/sign-in")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({"email": "srv@example.com"}).to_string(),
            ))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let token = body["token"].as_str().unwrap().to_string();

        let req = Request::builder()
            .method("POST")
            .uri("/api/ai/recommend")
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {}", token))
            .body(Body::from(
                serde_json::json!({"title": "water the plants"}).to_string(),
            ))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let rec: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(rec["duration"], 30);
        assert_eq!(rec["confidence"], 0.5);
        assert_eq!(rec["choices"], serde_json::json!([20, 30, 40]));
    }

    #[test]
    fn test_open_database_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("board.db");
        open_database(&path).unwrap();
        assert!(path.exists());
    }
}
