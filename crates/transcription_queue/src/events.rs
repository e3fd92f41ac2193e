use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
	Queued,
	Processing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueUpdate {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub position: Option<usize>,
	pub status: QueueStatus,
	pub queue_id: String,
}

/// Everything a session hears about its tasks.
///
/// Serializes as `{"event": "<name>", "data": {..}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum QueueEvent {
	QueueUpdate(QueueUpdate),
	TranscriptionProgress { progress: f32 },
	TranscriptionComplete { text: String, queue_id: String },
	Error { message: String, queue_id: String },
	TaskCancelled { queue_id: String },
}

impl QueueEvent {
	#[must_use]
	pub fn queued(queue_id: impl Into<String>, position: usize) -> Self {
		Self::QueueUpdate(QueueUpdate {
			position: Some(position),
			status: QueueStatus::Queued,
			queue_id: queue_id.into(),
		})
	}

	#[must_use]
	pub fn processing(queue_id: impl Into<String>) -> Self {
		Self::QueueUpdate(QueueUpdate {
			position: None,
			status: QueueStatus::Processing,
			queue_id: queue_id.into(),
		})
	}

	/// `fraction` is clamped to `0..=1` and reported as a percentage.
	#[must_use]
	pub fn progress(fraction: f32) -> Self {
		let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
		Self::TranscriptionProgress { progress: fraction * 100.0 }
	}

	#[must_use]
	pub fn complete(queue_id: impl Into<String>, text: impl Into<String>) -> Self {
		Self::TranscriptionComplete {
			text: text.into(),
			queue_id: queue_id.into(),
		}
	}

	#[must_use]
	pub fn error(queue_id: impl Into<String>, message: impl Into<String>) -> Self {
		Self::Error {
			message: message.into(),
			queue_id: queue_id.into(),
		}
	}

	#[must_use]
	pub fn cancelled(queue_id: impl Into<String>) -> Self {
		Self::TaskCancelled { queue_id: queue_id.into() }
	}

	/// Wire name of the event.
	#[must_use]
	pub const fn name(&self) -> &'static str {
		match self {
			Self::QueueUpdate(_) => "queue_update",
			Self::TranscriptionProgress { .. } => "transcription_progress",
			Self::TranscriptionComplete { .. } => "transcription_complete",
			Self::Error { .. } => "error",
			Self::TaskCancelled { .. } => "task_cancelled",
		}
	}

	/// The task this event is about, when the payload names one.
	#[must_use]
	pub fn queue_id(&self) -> Option<&str> {
		match self {
			Self::QueueUpdate(update) => Some(&update.queue_id),
			Self::TranscriptionComplete { queue_id, .. } | Self::Error { queue_id, .. } | Self::TaskCancelled { queue_id } => Some(queue_id),
			Self::TranscriptionProgress { .. } => None,
		}
	}
}
