use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;
use transcription_queue::{QueueError, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
	#[error(transparent)]
	Queue(#[from] QueueError),

	#[error("no transcript stored for queue id {0}")]
	ResultNotFound(String),

	#[error("failed to encode metrics: {0}")]
	Metrics(#[from] prometheus::Error),

	#[error("background task failed: {0}")]
	Join(#[from] tokio::task::JoinError),
}

impl ApiError {
	const fn status_code(&self) -> StatusCode {
		match self {
			Self::Queue(QueueError::Validation(ValidationError::DuplicateQueueId(_))) => StatusCode::CONFLICT,
			Self::Queue(QueueError::Validation(_)) => StatusCode::BAD_REQUEST,
			Self::ResultNotFound(_) => StatusCode::NOT_FOUND,
			Self::Queue(_) | Self::Metrics(_) | Self::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}

impl From<ValidationError> for ApiError {
	fn from(e: ValidationError) -> Self {
		Self::Queue(e.into())
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let status = self.status_code();
		if status.is_server_error() {
			error!(error = %self, "request failed");
		}
		(status, Json(json!({ "error": self.to_string() }))).into_response()
	}
}
