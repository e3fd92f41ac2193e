pub mod config;
pub mod error;
pub mod observability;
pub mod routes;
pub mod websocket;

use anyhow::Result;
use prometheus::Registry;
use std::sync::Arc;
use transcription_queue::{CommandEngine, QueueManager, RoomHub, TranscriptionEngine};

use crate::config::{Config, EngineKind};

/// Handles shared by every request.
#[derive(Clone)]
pub struct AppState {
	pub manager: Arc<QueueManager>,
	pub hub: Arc<RoomHub>,
	pub registry: Registry,
}

impl AppState {
	#[must_use]
	pub const fn new(manager: Arc<QueueManager>, hub: Arc<RoomHub>, registry: Registry) -> Self {
		Self { manager, hub, registry }
	}
}

/// Builds the transcription backend selected in `config`.
///
/// # Errors
/// Returns an error when the in-process engine is requested but not compiled in.
pub fn build_engine(config: &Config) -> Result<Arc<dyn TranscriptionEngine>> {
	match config.engine {
		EngineKind::Command => Ok(Arc::new(CommandEngine::new(&config.whisper_command, &config.models_dir).with_language(&config.language))),
		EngineKind::Whisper => whisper_engine(config),
	}
}

#[cfg(feature = "whisper")]
#[allow(clippy::unnecessary_wraps)]
fn whisper_engine(config: &Config) -> Result<Arc<dyn TranscriptionEngine>> {
	Ok(Arc::new(transcription_queue::WhisperEngine::new(&config.models_dir, &config.language, config.whisper_threads)))
}

#[cfg(not(feature = "whisper"))]
fn whisper_engine(_config: &Config) -> Result<Arc<dyn TranscriptionEngine>> {
	anyhow::bail!("engine 'whisper' requires building with the `whisper` feature")
}
