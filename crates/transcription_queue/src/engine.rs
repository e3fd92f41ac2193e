mod command;
#[cfg(feature = "whisper")]
mod whisper;

pub use command::CommandEngine;
#[cfg(feature = "whisper")]
pub use whisper::WhisperEngine;

use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::events::QueueEvent;
use crate::notify::Notifier;
use crate::task::{ModelName, Task};

/// What the engine is asked to transcribe.
#[derive(Debug, Clone, Copy)]
pub struct TranscriptionRequest<'a> {
	pub file_path: &'a Path,
	pub model: ModelName,
	pub queue_id: &'a str,
}

impl<'a> From<&'a Task> for TranscriptionRequest<'a> {
	fn from(task: &'a Task) -> Self {
		Self {
			file_path: &task.file_path,
			model: task.model_name,
			queue_id: &task.queue_id,
		}
	}
}

/// Per-call handles passed to the engine: progress reporting and a
/// cancellation token the engine should check between internal steps.
#[derive(Clone)]
pub struct EngineContext {
	session_id: String,
	notifier: Arc<dyn Notifier>,
	cancel: CancellationToken,
}

impl EngineContext {
	#[must_use]
	pub fn new(session_id: impl Into<String>, notifier: Arc<dyn Notifier>, cancel: CancellationToken) -> Self {
		Self {
			session_id: session_id.into(),
			notifier,
			cancel,
		}
	}

	#[must_use]
	pub fn session_id(&self) -> &str {
		&self.session_id
	}

	/// Sends `transcription_progress` to the session. `fraction` is in `0..=1`.
	pub fn report_progress(&self, fraction: f32) {
		self.notifier.notify(&self.session_id, QueueEvent::progress(fraction));
	}

	#[must_use]
	pub fn is_cancelled(&self) -> bool {
		self.cancel.is_cancelled()
	}

	#[must_use]
	pub const fn cancellation_token(&self) -> &CancellationToken {
		&self.cancel
	}

	/// # Errors
	/// Returns [`EngineError::Cancelled`] once cancellation was requested.
	pub fn check_cancelled(&self) -> Result<(), EngineError> {
		if self.is_cancelled() {
			Err(EngineError::Cancelled)
		} else {
			Ok(())
		}
	}
}

/// Turns one media file into text. May block for minutes.
pub trait TranscriptionEngine: Send + Sync {
	/// # Errors
	/// Returns an [`EngineError`] when the media cannot be transcribed or the
	/// call was cancelled through the context.
	fn transcribe(&self, request: &TranscriptionRequest<'_>, ctx: &EngineContext) -> Result<String, EngineError>;
}

impl<F> TranscriptionEngine for F
where
	F: Fn(&TranscriptionRequest<'_>, &EngineContext) -> Result<String, EngineError> + Send + Sync,
{
	fn transcribe(&self, request: &TranscriptionRequest<'_>, ctx: &EngineContext) -> Result<String, EngineError> {
		self(request, ctx)
	}
}
