use std::io;
use thiserror::Error;

use crate::task::ModelName;

/// Rejected submissions. Raised before any queue or store mutation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
	#[error("missing required field: {0}")]
	EmptyField(&'static str),

	#[error("invalid model name '{0}', must be one of: {}", ModelName::names().join(", "))]
	UnknownModel(String),

	#[error("queue id {0} is already queued or processing")]
	DuplicateQueueId(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
	#[error("storage io error: {0}")]
	Io(#[from] io::Error),

	#[error("storage record is not valid JSON: {0}")]
	Json(#[from] serde_json::Error),

	#[error("failed to replace storage record: {0}")]
	Persist(#[from] tempfile::PersistError),
}

#[derive(Error, Debug)]
pub enum EngineError {
	#[error("transcription failed: {0}")]
	Failed(String),

	#[error("engine io error: {0}")]
	Io(#[from] io::Error),

	#[error("transcription was cancelled")]
	Cancelled,

	#[error("engine panicked: {0}")]
	Panicked(String),

	#[error("unsupported media: {0}")]
	UnsupportedMedia(String),

	#[error("model not available: {0}")]
	ModelUnavailable(String),
}

#[derive(Error, Debug)]
pub enum QueueError {
	#[error(transparent)]
	Validation(#[from] ValidationError),

	#[error(transparent)]
	Store(#[from] StoreError),

	#[error("metrics registration failed: {0}")]
	Metrics(#[from] prometheus::Error),

	#[error("worker loop is already running")]
	WorkerAlreadyStarted,

	#[error("failed to spawn worker thread: {0}")]
	WorkerSpawn(#[source] io::Error),
}

impl QueueError {
	#[must_use]
	pub const fn is_validation(&self) -> bool {
		matches!(self, Self::Validation(_))
	}
}
