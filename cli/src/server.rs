use std::sync::{Arc, Mutex};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use tower_http::limit::RequestBodyLimitLayer;

use ritual_core::models::{
    HABIT_COLORS, HabitDetail, HabitEntry, HabitStatus, NewHabit, UpdateHabit,
    validate_conditions_met,
};
use ritual_core::service::HabitService;

const BODY_LIMIT: usize = 1024 * 1024; // 1 MB

#[derive(Clone)]
struct AppState {
    svc: Arc<Mutex<HabitService>>,
    api_key: Option<String>,
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct CreateHabitRequest {
    name: String,
    color: Option<String>,
    reminder_time: Option<String>,
    #[serde(default)]
    conditions: Vec<String>,
}

fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

#[derive(Deserialize)]
#[allow(clippy::option_option)]
struct UpdateHabitRequest {
    name: Option<String>,
    color: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    reminder_time: Option<Option<String>>,
    conditions: Option<Vec<String>>,
}

/// The authoritative entry upsert. Habits are addressed by uuid so any
/// client replica can submit the same write.
#[derive(Deserialize)]
struct UpsertEntryRequest {
    habit_id: String,
    date: String,
    completed: bool,
    #[serde(default)]
    conditions_met: Vec<bool>,
}

#[derive(Serialize)]
struct EntryResponse {
    entry: HabitEntry,
    streak_current: i64,
    streak_best: i64,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Internal(err) => {
                eprintln!("Internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected_key);

        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or missing API key".to_string(),
                }),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Handlers ---

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn list_habits(State(state): State<AppState>) -> Result<Json<Vec<HabitStatus>>, ApiError> {
    let svc = state
        .svc
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let statuses = svc.list_with_status().context("database error")?;
    Ok(Json(statuses))
}

async fn create_habit(
    State(state): State<AppState>,
    Json(req): Json<CreateHabitRequest>,
) -> Result<(StatusCode, Json<HabitDetail>), ApiError> {
    let new_habit = NewHabit {
        name: req.name,
        color: req.color.unwrap_or_else(|| HABIT_COLORS[0].to_string()),
        reminder_time: req.reminder_time,
        conditions: req.conditions,
    };

    let svc = state
        .svc
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let habit = svc
        .create_habit(&new_habit)
        .map_err(|e| ApiError::BadRequest(format!("{e}")))?;
    let detail = svc
        .get_habit_detail(habit.id)
        .context("failed to load created habit")?;
    Ok((StatusCode::CREATED, Json(detail)))
}

async fn get_habit(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<HabitDetail>, ApiError> {
    let svc = state
        .svc
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let detail = svc
        .get_habit_detail(id)
        .map_err(|_| ApiError::NotFound(format!("Habit {id} not found")))?;
    Ok(Json(detail))
}

async fn update_habit(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateHabitRequest>,
) -> Result<Json<HabitDetail>, ApiError> {
    if req.name.is_none()
        && req.color.is_none()
        && req.reminder_time.is_none()
        && req.conditions.is_none()
    {
        return Err(ApiError::BadRequest(
            "At least one field must be provided".to_string(),
        ));
    }

    let svc = state
        .svc
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    svc.db()
        .get_habit_by_id(id)
        .map_err(|_| ApiError::NotFound(format!("Habit {id} not found")))?;

    let update = UpdateHabit {
        name: req.name,
        color: req.color,
        reminder_time: req.reminder_time,
        conditions: req.conditions,
    };
    svc.update_habit(id, &update)
        .map_err(|e| ApiError::BadRequest(format!("{e}")))?;
    let detail = svc
        .get_habit_detail(id)
        .context("failed to load updated habit")?;
    Ok(Json(detail))
}

async fn delete_habit(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let svc = state
        .svc
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    svc.db()
        .get_habit_by_id(id)
        .map_err(|_| ApiError::NotFound(format!("Habit {id} not found")))?;
    svc.delete_habit(id).context("failed to delete habit")?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_entries(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<HabitEntry>>, ApiError> {
    let svc = state
        .svc
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    svc.db()
        .get_habit_by_id(id)
        .map_err(|_| ApiError::NotFound(format!("Habit {id} not found")))?;
    let entries = svc
        .db()
        .get_entries_for_habit(id)
        .context("database error")?;
    Ok(Json(entries))
}

async fn upsert_entry(
    State(state): State<AppState>,
    Json(req): Json<UpsertEntryRequest>,
) -> Result<(StatusCode, Json<EntryResponse>), ApiError> {
    let date = NaiveDate::parse_from_str(&req.date, "%Y-%m-%d").map_err(|_| {
        ApiError::BadRequest(format!("Invalid date '{}'. Use YYYY-MM-DD", req.date))
    })?;

    let svc = state
        .svc
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let habit = svc
        .db()
        .get_habit_by_uuid(&req.habit_id)
        .context("database error")?
        .ok_or_else(|| ApiError::NotFound(format!("Habit '{}' not found", req.habit_id)))?;

    let conditions = svc.db().get_conditions(habit.id).context("database error")?;
    validate_conditions_met(&req.conditions_met, conditions.len())
        .map_err(|e| ApiError::BadRequest(format!("{e}")))?;

    let entry = svc
        .db()
        .upsert_entry(habit.id, date, req.completed, &req.conditions_met)
        .context("failed to upsert entry")?;

    // Streaks are recomputed on every write, completed or not, so clearing
    // a day never leaves stale values behind.
    let today = chrono::Local::now().date_naive();
    let streaks = svc
        .recompute_streaks_at(habit.id, today)
        .context("failed to recompute streaks")?;

    Ok((
        StatusCode::CREATED,
        Json(EntryResponse {
            entry,
            streak_current: streaks.current,
            streak_best: streaks.best,
        }),
    ))
}

// --- Router builder ---

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/habits", get(list_habits).post(create_habit))
        .route(
            "/api/habits/{id}",
            get(get_habit).put(update_habit).delete(delete_habit),
        )
        .route("/api/habits/{id}/entries", get(list_entries))
        .route("/api/entries", post(upsert_entry))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        // Health stays open so clients can probe reachability before auth.
        .route("/api/health", get(health))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(
    svc: HabitService,
    port: u16,
    bind: &str,
    api_key: Option<String>,
) -> anyhow::Result<()> {
    let state = AppState {
        svc: Arc::new(Mutex::new(svc)),
        api_key: api_key.clone(),
    };

    let app = build_router(state);

    if let Some(ref key) = api_key {
        eprintln!(
            "API key: {}...{} (see api_key file in data directory)",
            &key[..4],
            &key[key.len() - 4..],
        );
    } else {
        eprintln!("Warning: Authentication disabled (--no-auth). API is open to anyone.");
    }

    if bind != "127.0.0.1" && bind != "localhost" && api_key.is_none() {
        eprintln!(
            "Warning: Listening on {bind} with no authentication. Any device on your network can access this API."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}")).await?;
    eprintln!("Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}
