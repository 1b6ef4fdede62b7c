//! Comfort Assistant - fan and light automation API server

use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use comfort_core::SensorReading;
use comfort_engine::presets::{all_presets, preset};
use comfort_engine::{ComfortEngine, EngineError, EngineSettings, Intent, RuleSetName};
use comfort_engine::{ScheduleRequest, ScheduledAction};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod websocket;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ComfortEngine>,
}

/// API response wrapper using serde_json::Value for flexibility
#[derive(Serialize)]
struct ApiResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ApiResponse {
    fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: Some(serde_json::to_value(data).unwrap_or(serde_json::Value::Null)),
            error: None,
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

type ApiResult = (StatusCode, Json<ApiResponse>);

fn ok<T: Serialize>(data: T) -> ApiResult {
    (StatusCode::OK, Json(ApiResponse::success(data)))
}

/// HTTP status for an engine error
fn error_status(error: &EngineError) -> StatusCode {
    match error {
        EngineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        EngineError::DuplicateScheduleId(_) => StatusCode::CONFLICT,
        EngineError::RuleNotFound { .. } | EngineError::UnknownPreset(_) => StatusCode::NOT_FOUND,
        EngineError::InvalidTimeFormat(_)
        | EngineError::InvalidRuleSet(_)
        | EngineError::EmptyBatch => StatusCode::BAD_REQUEST,
    }
}

fn engine_error(error: EngineError) -> ApiResult {
    if matches!(error, EngineError::Store(_)) {
        tracing::error!("Request failed: {}", error);
    }
    (error_status(&error), Json(ApiResponse::error(error.to_string())))
}

fn respond<T: Serialize>(result: Result<T, EngineError>) -> ApiResult {
    match result {
        Ok(data) => ok(data),
        Err(e) => engine_error(e),
    }
}

/// Optional schedule for a preset, as query parameters
#[derive(Deserialize)]
struct PresetQuery {
    delay_seconds: Option<u64>,
    at: Option<String>,
}

impl PresetQuery {
    fn schedule(self) -> Option<ScheduleRequest> {
        match (self.delay_seconds, self.at) {
            (_, Some(at)) => Some(ScheduleRequest::AbsoluteTime(at)),
            (Some(seconds), None) => Some(ScheduleRequest::DelaySeconds(seconds)),
            (None, None) => None,
        }
    }
}

/// Active rule set change request
#[derive(Deserialize)]
struct RuleSetRequest {
    rule_set: String,
}

/// Rule time range change request; `null` clears it
#[derive(Deserialize)]
struct RuleTimeRequest {
    #[serde(default)]
    time: Option<String>,
}

#[derive(Serialize)]
struct PresetInfo {
    name: &'static str,
    description: String,
    actions: Vec<comfort_engine::ActionDelta>,
}

#[derive(Serialize)]
struct CancelResult {
    cancelled: Vec<ScheduledAction>,
}

/// Get the persisted document (sensors and device state)
async fn get_state(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.engine.document().await))
}

/// Replace the sensor readings
async fn put_sensors(
    State(state): State<AppState>,
    Json(sensors): Json<SensorReading>,
) -> impl IntoResponse {
    respond(state.engine.update_sensors(sensors).await)
}

/// Get the last poller status
async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.engine.status().await))
}

/// Apply or schedule a structured intent
async fn submit_intent(
    State(state): State<AppState>,
    Json(intent): Json<Intent>,
) -> impl IntoResponse {
    respond(state.engine.submit(intent).await)
}

/// List presets
async fn list_presets() -> impl IntoResponse {
    let presets: Vec<PresetInfo> = all_presets()
        .into_iter()
        .map(|(name, actions)| PresetInfo {
            name,
            description: comfort_engine::describe::describe_actions(&actions),
            actions,
        })
        .collect();
    Json(ApiResponse::success(presets))
}

/// Run a preset, now or on a schedule
async fn run_preset(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<PresetQuery>,
) -> impl IntoResponse {
    let actions = match preset(&name) {
        Ok(actions) => actions,
        Err(e) => return engine_error(e),
    };
    let intent = Intent {
        actions,
        schedule: query.schedule(),
    };
    respond(state.engine.submit(intent).await)
}

/// List scheduled actions
async fn list_scheduled(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.engine.scheduled().await))
}

/// Cancel every scheduled action
async fn cancel_all_scheduled(State(state): State<AppState>) -> impl IntoResponse {
    respond(
        state
            .engine
            .cancel_all()
            .await
            .map(|cancelled| CancelResult { cancelled }),
    )
}

/// Cancel one scheduled action
async fn cancel_scheduled(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.engine.cancel(&id).await {
        Ok(Some(cancelled)) => ok(cancelled),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!(
                "Scheduled action not found: {id}"
            ))),
        ),
        Err(e) => engine_error(e),
    }
}

/// Get the active rule set
async fn get_rule_set(State(state): State<AppState>) -> impl IntoResponse {
    let active = state.engine.active_rule_set().await;
    Json(ApiResponse::success(serde_json::json!({
        "rule_set": active,
        "label": active.label(),
    })))
}

/// Switch the active rule set
async fn put_rule_set(
    State(state): State<AppState>,
    Json(req): Json<RuleSetRequest>,
) -> impl IntoResponse {
    let name = match req.rule_set.parse::<RuleSetName>() {
        Ok(name) => name,
        Err(e) => return engine_error(e),
    };
    respond(
        state
            .engine
            .set_active_rule_set(name)
            .await
            .map(|()| serde_json::json!({ "rule_set": name })),
    )
}

/// Get both rule collections
async fn get_rules(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.engine.rules().await))
}

/// Reset the learned preferences
async fn reset_rules(State(state): State<AppState>) -> impl IntoResponse {
    respond(state.engine.reset_preferences().await)
}

/// Set or clear the time range of a preference rule
async fn put_rule_time(
    State(state): State<AppState>,
    Path((sensor, label)): Path<(String, String)>,
    Json(req): Json<RuleTimeRequest>,
) -> impl IntoResponse {
    respond(state.engine.set_rule_time(&sensor, &label, req.time).await)
}

/// Take the pending notifications
async fn drain_updates(State(state): State<AppState>) -> impl IntoResponse {
    respond(state.engine.drain_updates().await)
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| websocket::handle_socket(socket, state))
}

/// Health check
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/state", get(get_state))
        .route("/api/v1/sensors", put(put_sensors))
        .route("/api/v1/status", get(get_status))
        .route("/api/v1/intents", post(submit_intent))
        .route("/api/v1/presets", get(list_presets))
        .route("/api/v1/presets/:name", post(run_preset))
        .route(
            "/api/v1/schedule",
            get(list_scheduled).delete(cancel_all_scheduled),
        )
        .route("/api/v1/schedule/:id", delete(cancel_scheduled))
        .route("/api/v1/rule-set", get(get_rule_set).put(put_rule_set))
        .route("/api/v1/rules", get(get_rules))
        .route("/api/v1/rules/reset", post(reset_rules))
        .route("/api/v1/rules/:sensor/:label/time", put(put_rule_time))
        .route("/api/v1/updates/drain", post(drain_updates))
        // WebSocket
        .route("/ws", get(ws_handler))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "comfort_api=debug,comfort_engine=debug,info".into()),
        )
        .init();

    tracing::info!("Starting Comfort Assistant API server");

    let settings = EngineSettings::from_env();
    tracing::info!("Data directory: {:?}", settings.data_dir);

    let engine = Arc::new(ComfortEngine::new(settings).await?);
    engine.start().await;

    let scheduled = engine.scheduled().await.len();
    if scheduled > 0 {
        tracing::info!("{} scheduled actions pending", scheduled);
    }

    let state = AppState { engine };
    let app = router(state);

    // Start server
    let bind = std::env::var("COMFORT_BIND").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let addr: SocketAddr = bind.parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
