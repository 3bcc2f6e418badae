//! HTTP surface of the agent host

use axum::{
    Json, Router,
    extract::{Path, Request, State},
    http::header,
    middleware::{self, Next},
    response::{
        Response,
        sse::{Event, KeepAlive, KeepAliveStream, Sse},
    },
    routing::{get, post},
};
use futures::StreamExt;
use parley_schema::{
    ChatHistory, ChatHistoryInput, ChatMessage, Feedback, FeedbackResponse, ServiceMetadata,
    StreamInput, UserInput,
};
use std::convert::Infallible;
use std::pin::Pin;
use std::time::Duration;
use tokio_stream::Stream;
use tower_http::trace::TraceLayer;

use crate::{
    convert::to_chat_message,
    dispatch::{invoke_turn, prepare_turn, stream_turn},
    error::ApiError,
    state::AppState,
};

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Build the router. Everything except `/health` sits behind the bearer check.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/info", get(info))
        .route("/invoke", post(invoke_default))
        .route("/stream", post(stream_default))
        .route("/{agent_id}/invoke", post(invoke))
        .route("/{agent_id}/stream", post(stream))
        .route("/history", post(history))
        .route("/feedback", post(feedback))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn require_bearer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(secret) = state.config.auth_secret.as_deref() {
        let token = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if token != Some(secret) {
            return Err(ApiError::Unauthorized);
        }
    }
    Ok(next.run(request).await)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn info(State(state): State<AppState>) -> Json<ServiceMetadata> {
    Json(ServiceMetadata {
        agents: state.registry.agent_info(),
        models: state.config.model_names(),
        default_agent: state.config.default_agent.clone(),
        default_model: state.config.default_model.clone(),
    })
}

async fn invoke_default(
    State(state): State<AppState>,
    Json(input): Json<UserInput>,
) -> Result<Json<ChatMessage>, ApiError> {
    let agent_id = state.config.default_agent.clone();
    run_invoke(&state, &agent_id, input).await
}

async fn invoke(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Json(input): Json<UserInput>,
) -> Result<Json<ChatMessage>, ApiError> {
    run_invoke(&state, &agent_id, input).await
}

async fn run_invoke(state: &AppState, agent_id: &str, input: UserInput) -> Result<Json<ChatMessage>, ApiError> {
    let turn = prepare_turn(&state.registry, agent_id, &input).await?;
    Ok(Json(invoke_turn(turn).await?))
}

type EventStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;
type SseResponse = Sse<KeepAliveStream<EventStream>>;

async fn stream_default(
    State(state): State<AppState>,
    Json(input): Json<StreamInput>,
) -> Result<SseResponse, ApiError> {
    let agent_id = state.config.default_agent.clone();
    run_stream(&state, &agent_id, input).await
}

async fn stream(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Json(input): Json<StreamInput>,
) -> Result<SseResponse, ApiError> {
    run_stream(&state, &agent_id, input).await
}

async fn run_stream(state: &AppState, agent_id: &str, input: StreamInput) -> Result<SseResponse, ApiError> {
    let turn = prepare_turn(&state.registry, agent_id, &input.input).await?;
    let units = stream_turn(turn, state.config.translator.clone(), input.stream_tokens);
    let events: EventStream = Box::pin(units.map(|unit| Ok(Event::default().data(unit.to_data()))));
    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL)))
}

async fn history(
    State(state): State<AppState>,
    Json(input): Json<ChatHistoryInput>,
) -> Result<Json<ChatHistory>, ApiError> {
    let thread = state.registry.checkpointer().load(&input.thread_id).await?;
    let messages = thread
        .map(|t| t.messages.iter().map(to_chat_message).collect())
        .unwrap_or_default();
    Ok(Json(ChatHistory { messages }))
}

async fn feedback(
    State(state): State<AppState>,
    Json(feedback): Json<Feedback>,
) -> Result<Json<FeedbackResponse>, ApiError> {
    state.feedback.record(&feedback).await.map_err(ApiError::Internal)?;
    Ok(Json(FeedbackResponse::default()))
}
