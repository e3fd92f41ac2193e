use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use transcription_queue::{ModelName, QueueStatus, SubmitRequest, Task};

use crate::error::ApiError;
use crate::{websocket, AppState};

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
	pub queue_id: String,
	pub position: usize,
	pub status: QueueStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
	#[serde(default)]
	pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CancelResponse {
	pub cancelled: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueueSnapshot {
	pub pending: Vec<Task>,
	pub current: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResultResponse {
	pub queue_id: String,
	pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelsResponse {
	pub models: Vec<String>,
	pub default: String,
}

#[must_use]
pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/queue", post(submit).get(queue_status))
		.route("/cancel", post(cancel))
		.route("/results/:queue_id", get(result))
		.route("/models", get(models))
		.route("/metrics", get(metrics))
		.route("/ws/:session_id", get(websocket::handler))
		.layer(TraceLayer::new_for_http())
		.with_state(state)
}

// Queue operations touch the store on disk, so they run off the async workers.
async fn submit(State(state): State<AppState>, Json(request): Json<SubmitRequest>) -> Result<Json<SubmitResponse>, ApiError> {
	let queue_id = request.queue_id.clone();
	let manager = state.manager.clone();
	let position = tokio::task::spawn_blocking(move || manager.submit(request)).await??;

	Ok(Json(SubmitResponse {
		queue_id,
		position,
		status: QueueStatus::Queued,
	}))
}

async fn cancel(State(state): State<AppState>, Json(request): Json<CancelRequest>) -> Result<Json<CancelResponse>, ApiError> {
	let manager = state.manager.clone();
	let cancelled = tokio::task::spawn_blocking(move || manager.cancel(request.session_id.as_deref())).await?;
	Ok(Json(CancelResponse { cancelled }))
}

async fn queue_status(State(state): State<AppState>) -> Result<Json<QueueSnapshot>, ApiError> {
	let manager = state.manager.clone();
	let snapshot = tokio::task::spawn_blocking(move || QueueSnapshot {
		pending: manager.store().list_pending(),
		current: manager.current(),
	})
	.await?;
	Ok(Json(snapshot))
}

async fn result(State(state): State<AppState>, Path(queue_id): Path<String>) -> Result<Json<ResultResponse>, ApiError> {
	let manager = state.manager.clone();
	let lookup = queue_id.clone();
	let text = tokio::task::spawn_blocking(move || manager.result(&lookup)).await?;

	match text {
		Some(text) => Ok(Json(ResultResponse { queue_id, text })),
		None => Err(ApiError::ResultNotFound(queue_id)),
	}
}

async fn models() -> Json<ModelsResponse> {
	Json(ModelsResponse {
		models: ModelName::names().into_iter().map(String::from).collect(),
		default: ModelName::default().to_string(),
	})
}

async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
	let encoder = TextEncoder::new();
	let mut buffer = Vec::new();
	encoder.encode(&state.registry.gather(), &mut buffer)?;
	Ok(([(CONTENT_TYPE, encoder.format_type().to_string())], buffer))
}
