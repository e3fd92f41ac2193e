use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ValidationError;

/// Supported transcription models.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelName {
	#[serde(rename = "tiny")]
	Tiny,
	#[serde(rename = "tiny.en")]
	TinyEn,
	#[default]
	#[serde(rename = "base")]
	Base,
	#[serde(rename = "base.en")]
	BaseEn,
	#[serde(rename = "small")]
	Small,
	#[serde(rename = "small.en")]
	SmallEn,
	#[serde(rename = "medium")]
	Medium,
	#[serde(rename = "medium.en")]
	MediumEn,
	#[serde(rename = "large-v1")]
	LargeV1,
	#[serde(rename = "large-v2")]
	LargeV2,
	#[serde(rename = "large-v3")]
	LargeV3,
	#[serde(rename = "large")]
	Large,
	#[serde(rename = "turbo")]
	Turbo,
}

impl ModelName {
	pub const ALL: [Self; 13] = [
		Self::Tiny,
		Self::TinyEn,
		Self::Base,
		Self::BaseEn,
		Self::Small,
		Self::SmallEn,
		Self::Medium,
		Self::MediumEn,
		Self::LargeV1,
		Self::LargeV2,
		Self::LargeV3,
		Self::Large,
		Self::Turbo,
	];

	#[must_use]
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Tiny => "tiny",
			Self::TinyEn => "tiny.en",
			Self::Base => "base",
			Self::BaseEn => "base.en",
			Self::Small => "small",
			Self::SmallEn => "small.en",
			Self::Medium => "medium",
			Self::MediumEn => "medium.en",
			Self::LargeV1 => "large-v1",
			Self::LargeV2 => "large-v2",
			Self::LargeV3 => "large-v3",
			Self::Large => "large",
			Self::Turbo => "turbo",
		}
	}

	/// Stem of the ggml weights file, `ggml-<stem>.bin`.
	///
	/// The bare `large` alias resolves to the newest large checkpoint.
	#[must_use]
	pub const fn ggml_stem(self) -> &'static str {
		match self {
			Self::Large => "large-v3",
			Self::Turbo => "large-v3-turbo",
			other => other.as_str(),
		}
	}

	#[must_use]
	pub fn names() -> Vec<&'static str> {
		Self::ALL.iter().map(|m| m.as_str()).collect()
	}
}

impl FromStr for ModelName {
	type Err = ValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::ALL.into_iter().find(|m| m.as_str() == s).ok_or_else(|| ValidationError::UnknownModel(s.to_string()))
	}
}

impl fmt::Display for ModelName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// One transcription job, as held in memory and mirrored to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
	pub queue_id: String,
	pub session_id: String,
	pub model_name: ModelName,
	pub file_path: PathBuf,
	#[serde(default = "Utc::now")]
	pub submitted_at: DateTime<Utc>,
}

impl Task {
	#[must_use]
	pub fn new(queue_id: impl Into<String>, session_id: impl Into<String>, model_name: ModelName, file_path: impl Into<PathBuf>) -> Self {
		Self {
			queue_id: queue_id.into(),
			session_id: session_id.into(),
			model_name,
			file_path: file_path.into(),
			submitted_at: Utc::now(),
		}
	}

	#[must_use]
	pub fn belongs_to(&self, session_filter: Option<&str>) -> bool {
		match session_filter {
			Some(session) => self.session_id == session,
			None => true,
		}
	}
}

impl fmt::Display for Task {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} [{}] {} ({})", self.queue_id, self.model_name, self.file_path.display(), self.session_id)
	}
}

fn default_model() -> String {
	ModelName::default().as_str().to_string()
}

/// Unvalidated submission as received from a producer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitRequest {
	#[serde(default)]
	pub file_path: PathBuf,
	#[serde(default)]
	pub session_id: String,
	#[serde(default = "default_model", alias = "model")]
	pub model_name: String,
	#[serde(default)]
	pub queue_id: String,
}

impl SubmitRequest {
	#[must_use]
	pub fn new(file_path: impl Into<PathBuf>, session_id: impl Into<String>, model_name: impl Into<String>, queue_id: impl Into<String>) -> Self {
		Self {
			file_path: file_path.into(),
			session_id: session_id.into(),
			model_name: model_name.into(),
			queue_id: queue_id.into(),
		}
	}

	/// Checks every field and builds the task.
	///
	/// # Errors
	/// Returns a [`ValidationError`] naming the first missing field or the unknown model.
	pub fn validate(self) -> Result<Task, ValidationError> {
		if self.file_path.as_os_str().is_empty() {
			return Err(ValidationError::EmptyField("file_path"));
		}
		if self.session_id.trim().is_empty() {
			return Err(ValidationError::EmptyField("session_id"));
		}
		if self.queue_id.trim().is_empty() {
			return Err(ValidationError::EmptyField("queue_id"));
		}
		let model_name = self.model_name.parse::<ModelName>()?;

		Ok(Task::new(self.queue_id, self.session_id, model_name, self.file_path))
	}
}
