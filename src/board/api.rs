use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    extract::{FromRequest, Path, Query, Request, State, rejection::JsonRejection},
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
};
use chrono::{FixedOffset, NaiveDate};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info};

use super::auth::{AuthUser, hash_token, new_session_token, session_expiry};
use super::db::DbHandle;
#[cfg(test)]
use super::db::BoardDb;
use super::layout::{SortKey, SortOrder, build_dashboard};
use super::models::*;
use super::properties::{
    apply_type_changes, clean_options, from_default, is_email, validate_name,
    validate_properties,
};
use super::recommend::{
    DurationRecommender, MAX_DURATION_MINUTES, MIN_TITLE_LEN, UserRateLimiter,
    recommend_or_fallback,
};
use super::streak::{self, StreakState};
use crate::config::TaskboardConfig;
use crate::errors::BoardError;

pub const MAX_TITLE_LEN: usize = 200;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub recommender: Arc<dyn DurationRecommender>,
    pub rate_limiter: Mutex<UserRateLimiter>,
    pub utc_offset: FixedOffset,
    pub session_ttl_hours: u32,
    pub allow_dev_sign_in: bool,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn from_config(
        db: DbHandle,
        recommender: Arc<dyn DurationRecommender>,
        config: &TaskboardConfig,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            db,
            recommender,
            rate_limiter: Mutex::new(UserRateLimiter::from_config(&config.recommender)),
            utc_offset: config.streak.offset()?,
            session_ttl_hours: config.auth.session_ttl_hours,
            allow_dev_sign_in: config.auth.allow_dev_sign_in,
        })
    }

    /// The calendar date streaks are counted against.
    pub fn today(&self) -> NaiveDate {
        streak::today(self.utc_offset)
    }
}

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub name: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateTaskRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub duration: Value,
    pub properties: Option<Vec<TaskProperty>>,
}

#[derive(Deserialize)]
pub struct CompleteTaskRequest {
    pub id: i64,
    pub completed: bool,
}

#[derive(Deserialize)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub duration: Option<Value>,
    pub properties: Option<Vec<TaskProperty>>,
}

#[derive(Deserialize)]
pub struct CreatePropertyRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppearanceRequest {
    pub theme: Option<String>,
    pub task_spacing: Option<String>,
}

#[derive(Deserialize)]
pub struct RecommendRequest {
    #[serde(default)]
    pub title: String,
}

#[derive(Deserialize)]
pub struct DashboardQuery {
    pub sort: Option<String>,
    pub order: Option<String>,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized,
    Forbidden(String),
    TooManyRequests { retry_after_secs: u64 },
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::TooManyRequests { retry_after_secs } => {
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({"error": "Too many requests"})),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
                return response;
            }
            ApiError::Internal(msg) => {
                error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        (status, Json(json!({"error": message}))).into_response()
    }
}

impl From<BoardError> for ApiError {
    fn from(err: BoardError) -> Self {
        match err {
            BoardError::TaskNotFound { .. } | BoardError::UserNotFound { .. } => {
                ApiError::NotFound(err.to_string())
            }
            BoardError::Unauthorized => ApiError::Unauthorized,
            BoardError::BadRequest(msg) => ApiError::BadRequest(msg),
            BoardError::InvalidProperty { .. } => ApiError::BadRequest(err.to_string()),
            BoardError::RateLimited { retry_after_secs } => {
                ApiError::TooManyRequests { retry_after_secs }
            }
            BoardError::LockPoisoned => ApiError::Internal(err.to_string()),
            BoardError::Other(e) => ApiError::Internal(format!("{:#}", e)),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// `Json` body extractor whose rejections use the `{"error": ...}` shape.
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(ApiJson(value))
    }
}

fn internal(e: anyhow::Error) -> ApiError {
    BoardError::Other(e).into()
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/auth/sign-in", post(sign_in))
        .route("/api/auth/sign-out", post(sign_out))
        .route("/api/me", get(me))
        .route(
            "/api/tasks",
            get(list_tasks).post(create_task).put(set_task_completed),
        )
        .route("/api/tasks/{id}", patch(update_task).delete(delete_task))
        .route(
            "/api/properties",
            get(list_properties).post(create_property),
        )
        .route("/api/settings", get(get_settings))
        .route(
            "/api/settings/default-properties",
            get(list_default_properties).put(replace_default_properties),
        )
        .route("/api/settings/update-visibility", put(update_visibility))
        .route("/api/settings/appearance", put(update_appearance))
        .route(
            "/api/settings/appearance/toggle-theme",
            post(toggle_theme),
        )
        .route("/api/ai/recommend", post(recommend))
        .route("/api/dashboard", get(dashboard))
        .route("/health", get(health_check))
}

// ── Helpers ───────────────────────────────────────────────────────────

fn validate_title(raw: &str) -> Result<String, ApiError> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(ApiError::BadRequest("Title is required".to_string()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(ApiError::BadRequest(format!(
            "Title must be at most {} characters",
            MAX_TITLE_LEN
        )));
    }
    Ok(title.to_string())
}

/// Leading integer of a string, the way a browser's `parseInt` reads it:
/// `"45 minutes"` is 45, `"abc"` is nothing.
fn parse_leading_int(raw: &str) -> Option<i64> {
    let s = raw.trim_start();
    let (sign, rest) = match s.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, s.strip_prefix('+').unwrap_or(s)),
    };
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse::<i64>().ok().map(|n| sign * n)
}

fn parse_duration(value: &Value) -> Result<i64, ApiError> {
    let minutes = match value {
        Value::Number(n) => n.as_f64().map(|f| f.trunc() as i64),
        Value::String(s) => parse_leading_int(s),
        _ => None,
    };
    match minutes {
        Some(m) if (1..=MAX_DURATION_MINUTES).contains(&m) => Ok(m),
        Some(_) => Err(ApiError::BadRequest(format!(
            "Duration must be between 1 and {} minutes",
            MAX_DURATION_MINUTES
        ))),
        None => Err(ApiError::BadRequest(
            "Duration must be a whole number of minutes".to_string(),
        )),
    }
}

fn profile(user: User, today: NaiveDate) -> Profile {
    let streak = StreakState {
        streak: user.streak,
        last_completed_on: user.last_completed_on,
    }
    .current(today);
    Profile {
        id: user.id,
        email: user.email,
        name: user.name,
        streak,
        last_completed_on: user.last_completed_on,
        settings: user.settings,
    }
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn sign_in(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<SignInRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.allow_dev_sign_in {
        return Err(ApiError::Forbidden(
            "Direct sign-in is disabled".to_string(),
        ));
    }
    let email = req.email.trim().to_lowercase();
    if !is_email(&email) {
        return Err(ApiError::BadRequest("A valid email is required".to_string()));
    }
    let name = req
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());

    let token = new_session_token();
    let token_hash = hash_token(&token);
    let expires_at = session_expiry(chrono::Utc::now().timestamp(), state.session_ttl_hours);

    let (user, created) = state
        .db
        .call(move |db| {
            let (user, created) = db.upsert_user(&email, name.as_deref())?;
            db.create_session(&user.id, &token_hash, expires_at)?;
            Ok((user, created))
        })
        .await
        .map_err(internal)?;

    info!(user_id = %user.id, new_user = created, "User signed in");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "token": token,
            "user": profile(user, state.today()),
            "isNewUser": created,
        })),
    ))
}

async fn sign_out(
    State(state): State<SharedState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let hash = auth.token_hash;
    state
        .db
        .call(move |db| db.delete_session(&hash))
        .await
        .map_err(internal)?;
    info!(user_id = %auth.user.id, "User signed out");
    Ok(StatusCode::NO_CONTENT)
}

async fn me(State(state): State<SharedState>, auth: AuthUser) -> Json<Profile> {
    Json(profile(auth.user, state.today()))
}

async fn list_tasks(
    State(state): State<SharedState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = auth.user.id;
    let lists = state
        .db
        .call(move |db| db.list_tasks(&user_id))
        .await
        .map_err(internal)?;
    Ok(Json(lists))
}

async fn create_task(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiJson(req): ApiJson<CreateTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let title = validate_title(&req.title)?;
    let duration = parse_duration(&req.duration)?;
    let properties = req.properties.map(validate_properties).transpose()?;

    let user_id = auth.user.id;
    let task = state
        .db
        .call(move |db| {
            let properties = match properties {
                Some(p) => p,
                None => db
                    .list_default_properties(&user_id)?
                    .iter()
                    .map(from_default)
                    .collect(),
            };
            db.create_task(
                &user_id,
                &NewTask {
                    title,
                    duration,
                    properties,
                },
            )
        })
        .await
        .map_err(internal)?;

    info!(task_id = task.id, duration = task.duration, "Task created");
    Ok((StatusCode::CREATED, Json(task)))
}

async fn set_task_completed(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiJson(req): ApiJson<CompleteTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let today = state.today();
    let user_id = auth.user.id;
    let CompleteTaskRequest { id, completed } = req;
    let result = state
        .db
        .call(move |db| db.set_task_completed(&user_id, id, completed, today))
        .await
        .map_err(internal)?
        .ok_or(BoardError::TaskNotFound { id })?;

    info!(task_id = id, completed, streak = result.streak, "Task completion updated");
    Ok(Json(result))
}

async fn update_task(
    State(state): State<SharedState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<UpdateTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = auth.user.id;
    let properties = match req.properties {
        Some(incoming) => {
            let owner = user_id.clone();
            let stored = state
                .db
                .call(move |db| db.get_task(&owner, id))
                .await
                .map_err(internal)?
                .ok_or(BoardError::TaskNotFound { id })?;
            Some(validate_properties(apply_type_changes(
                &stored.properties,
                incoming,
            ))?)
        }
        None => None,
    };
    let patch = TaskPatch {
        title: req.title.as_deref().map(validate_title).transpose()?,
        duration: req.duration.as_ref().map(parse_duration).transpose()?,
        properties,
    };
    let task = state
        .db
        .call(move |db| db.update_task(&user_id, id, &patch))
        .await
        .map_err(internal)?
        .ok_or(BoardError::TaskNotFound { id })?;
    Ok(Json(task))
}

async fn delete_task(
    State(state): State<SharedState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = auth.user.id;
    let deleted = state
        .db
        .call(move |db| db.delete_task(&user_id, id))
        .await
        .map_err(internal)?;
    if !deleted {
        return Err(BoardError::TaskNotFound { id }.into());
    }
    info!(task_id = id, "Task deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn list_properties(
    State(state): State<SharedState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = auth.user.id;
    let defs = state
        .db
        .call(move |db| db.list_property_definitions(&user_id))
        .await
        .map_err(internal)?;
    Ok(Json(defs))
}

async fn create_property(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiJson(req): ApiJson<CreatePropertyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = validate_name(&req.name)?;
    let kind = PropertyType::from_str(&req.kind).map_err(ApiError::BadRequest)?;
    let user_id = auth.user.id;
    let def = state
        .db
        .call(move |db| db.create_property_definition(&user_id, &name, kind))
        .await
        .map_err(internal)?;
    Ok((StatusCode::CREATED, Json(def)))
}

async fn get_settings(auth: AuthUser) -> Json<UserSettings> {
    Json(auth.user.settings)
}

async fn list_default_properties(
    State(state): State<SharedState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = auth.user.id;
    let props = state
        .db
        .call(move |db| db.list_default_properties(&user_id))
        .await
        .map_err(internal)?;
    Ok(Json(props))
}

async fn replace_default_properties(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiJson(req): ApiJson<Vec<NewDefaultProperty>>,
) -> Result<impl IntoResponse, ApiError> {
    let mut template = Vec::with_capacity(req.len());
    for prop in req {
        let name = validate_name(&prop.name)?;
        let options = if prop.kind.has_options() {
            clean_options(&name, prop.options)?
        } else {
            Vec::new()
        };
        template.push(NewDefaultProperty {
            name,
            kind: prop.kind,
            options,
        });
    }

    let user_id = auth.user.id;
    let saved = state
        .db
        .call(move |db| db.replace_default_properties(&user_id, &template))
        .await
        .map_err(internal)?;
    info!(count = saved.len(), "Default properties replaced");
    Ok(Json(saved))
}

async fn update_visibility(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiJson(visibility): ApiJson<BTreeMap<String, bool>>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = auth.user.id;
    let lookup_id = user_id.clone();
    let saved = state
        .db
        .call(move |db| db.update_visibility(&lookup_id, &visibility))
        .await
        .map_err(internal)?
        .ok_or(BoardError::UserNotFound { id: user_id })?;
    Ok(Json(json!({"success": true, "propertyVisibility": saved})))
}

async fn save_appearance(
    state: &SharedState,
    user_id: String,
    theme: Option<Theme>,
    spacing: Option<TaskSpacing>,
) -> Result<Json<Value>, ApiError> {
    let lookup_id = user_id.clone();
    let appearance = state
        .db
        .call(move |db| db.update_appearance(&lookup_id, theme, spacing))
        .await
        .map_err(internal)?
        .ok_or(BoardError::UserNotFound { id: user_id })?;
    Ok(Json(json!({"success": true, "user": appearance})))
}

async fn update_appearance(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiJson(req): ApiJson<AppearanceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let theme = req
        .theme
        .as_deref()
        .map(Theme::from_str)
        .transpose()
        .map_err(ApiError::BadRequest)?;
    let spacing = req
        .task_spacing
        .as_deref()
        .map(TaskSpacing::from_str)
        .transpose()
        .map_err(ApiError::BadRequest)?;
    save_appearance(&state, auth.user.id, theme, spacing).await
}

async fn toggle_theme(
    State(state): State<SharedState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let theme = auth.user.settings.theme.toggled();
    save_appearance(&state, auth.user.id, Some(theme), None).await
}

async fn recommend(
    State(state): State<SharedState>,
    auth: AuthUser,
    ApiJson(req): ApiJson<RecommendRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let title = req.title.trim();
    if title.chars().count() < MIN_TITLE_LEN {
        return Err(ApiError::BadRequest(
            "A valid title is required".to_string(),
        ));
    }

    {
        let mut limiter = state
            .rate_limiter
            .lock()
            .map_err(|_| BoardError::LockPoisoned)?;
        limiter
            .try_acquire(&auth.user.id)
            .map_err(|retry_after_secs| BoardError::RateLimited { retry_after_secs })?;
    }

    let rec = recommend_or_fallback(state.recommender.as_ref(), title).await;
    Ok(Json(json!({
        "duration": rec.duration,
        "confidence": rec.confidence,
        "choices": rec.choices(),
    })))
}

async fn dashboard(
    State(state): State<SharedState>,
    auth: AuthUser,
    Query(query): Query<DashboardQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let order = query
        .order
        .as_deref()
        .map(SortOrder::from_str)
        .transpose()
        .map_err(ApiError::BadRequest)?
        .unwrap_or_default();
    let sort = query
        .sort
        .filter(|s| !s.trim().is_empty())
        .map(|s| (SortKey::parse(s.trim()), order));

    let user = auth.user;
    let streak = StreakState {
        streak: user.streak,
        last_completed_on: user.last_completed_on,
    }
    .current(state.today());

    let user_id = user.id.clone();
    let lists = state
        .db
        .call(move |db| db.list_tasks(&user_id))
        .await
        .map_err(internal)?;
    Ok(Json(build_dashboard(&user, lists, streak, sort)))
}

// ── Tests ─────────────────────────────────────────────────────────────
