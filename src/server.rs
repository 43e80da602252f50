//! HTTP surface for the front end: chat, task list, account, health.

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::anthropic::AnthropicClient;
use crate::chat::{SessionStore, ToolCallSummary, TurnConfig, run_turn};
use crate::config::Config;
use crate::engine::{EngineApi, EngineClient, EngineError};
use crate::error::TurnError;
use crate::tools::Dispatcher;
use crate::tracker::{Job, JobState, JobTracker, PollConfig, TrackerConfig};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub model: Arc<AnthropicClient>,
    pub engine: Arc<EngineClient>,
    pub dispatcher: Arc<Dispatcher>,
    pub tracker: JobTracker,
    pub sessions: Arc<SessionStore>,
    pub turn: TurnConfig,
    engine_configured: bool,
    model_configured: bool,
}

impl AppState {
    pub fn new(model: AnthropicClient, engine: EngineClient, config: &Config) -> Self {
        let engine = Arc::new(engine);
        let tracker = JobTracker::new(engine.clone() as Arc<dyn EngineApi>, tracker_config(config));
        let dispatcher = Arc::new(Dispatcher::new(
            tracker.clone(),
            engine.clone() as Arc<dyn EngineApi>,
            std::time::Duration::from_secs(config.dispatch_budget_secs),
        ));

        Self {
            model: Arc::new(model),
            engine,
            dispatcher,
            tracker,
            sessions: Arc::new(SessionStore::new(config.history_cap)),
            turn: TurnConfig {
                model: config.model.clone(),
                max_tokens: 4096,
                max_tool_rounds: config.max_tool_rounds,
            },
            engine_configured: !config.engine_api_key.is_empty(),
            model_configured: !config.anthropic_api_key.is_empty(),
        }
    }
}

fn tracker_config(config: &Config) -> TrackerConfig {
    TrackerConfig {
        poll: PollConfig {
            initial_ms: config.poll_initial_ms,
            max_ms: config.poll_max_ms,
            jitter: config.poll_jitter,
            max_consecutive_failures: config.max_poll_failures,
        },
        max_job_wait: std::time::Duration::from_secs(config.max_job_wait_secs),
        retention: std::time::Duration::from_secs(config.retention_secs),
        max_concurrent_calls: config.max_engine_concurrency,
    }
}

/// Build the service router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat))
        .route("/api/tasks", get(list_tasks))
        .route("/api/tasks/:id", get(get_task))
        .route("/api/account", get(account))
        .route("/api/clear", post(clear))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// API error response body.
#[derive(Serialize)]
struct ApiError {
    error: String,
    code: String,
}

/// Request-level failures; everything job-related is folded into tool
/// results long before it could reach here.
enum AppError {
    BadRequest(String),
    NotFound(String),
    Upstream(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            AppError::Upstream(msg) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", msg),
        };

        (
            status,
            Json(ApiError {
                error: message,
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

impl From<TurnError> for AppError {
    fn from(err: TurnError) -> Self {
        tracing::error!("model invocation failed: {err}");
        AppError::Upstream("the assistant is unavailable, please try again".to_string())
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        tracing::error!("engine call failed: {err}");
        AppError::Upstream(err.to_string())
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    engine_configured: bool,
    model_configured: bool,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        engine_configured: state.engine_configured,
        model_configured: state.model_configured,
    })
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    session_id: Option<String>,
    user_id: Option<String>,
}

#[derive(Serialize)]
struct ChatResponse {
    reply: String,
    tool_calls: Vec<ToolCallSummary>,
    session_id: String,
}

/// One full conversation-loop cycle.
async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    if req.message.trim().is_empty() {
        return Err(AppError::BadRequest("message must not be empty".into()));
    }

    let hint = req
        .session_id
        .or_else(|| req.user_id.map(|user| format!("user-{user}")));
    let session_id = state.sessions.ensure(hint).await;

    let outcome = run_turn(
        state.model.as_ref(),
        &state.dispatcher,
        &state.sessions,
        &session_id,
        &req.message,
        &state.turn,
    )
    .await?;

    Ok(Json(ChatResponse {
        reply: outcome.reply,
        tool_calls: outcome.tool_calls,
        session_id,
    }))
}

#[derive(Debug, Deserialize)]
struct TasksQuery {
    session_id: String,
}

#[derive(Serialize)]
struct TaskView {
    job_id: String,
    kind: String,
    state: JobState,
    submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<Job> for TaskView {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.id,
            kind: job.kind.to_string(),
            state: job.state,
            submitted_at: job.submitted_at,
            error: job.error,
        }
    }
}

/// Non-blocking snapshot sweep across the session's jobs.
async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<TasksQuery>,
) -> Json<Vec<TaskView>> {
    let ids = state.sessions.job_ids(&query.session_id).await;
    let mut views: Vec<TaskView> = state
        .tracker
        .query_many(&ids)
        .await
        .into_iter()
        .map(Into::into)
        .collect();
    views.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at));
    Json(views)
}

async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TaskView>, AppError> {
    let job = state
        .tracker
        .query(&id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("task {id} is not tracked")))?;
    Ok(Json(job.into()))
}

/// Synchronous engine passthrough: tariff, balance, validity.
async fn account(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    Ok(Json(state.engine.account_info().await?))
}

#[derive(Debug, Deserialize)]
struct ClearRequest {
    session_id: String,
}

#[derive(Serialize)]
struct ClearResponse {
    status: &'static str,
    released_jobs: usize,
}

/// Tear a session down. In-flight jobs keep polling fire-and-forget; their
/// results are simply routed nowhere.
async fn clear(
    State(state): State<AppState>,
    Json(req): Json<ClearRequest>,
) -> Json<ClearResponse> {
    let released = state.sessions.clear(&req.session_id).await;
    state.tracker.release(&released).await;
    Json(ClearResponse {
        status: "ok",
        released_jobs: released.len(),
    })
}
