use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use transcription_queue::QueueConfig;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
	/// Run an external whisper.cpp binary per task
	Command,
	/// In-process whisper-rs inference (needs the `whisper` feature)
	Whisper,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "transcribe-server")]
#[command(about = "Queued speech-to-text service with per-session progress updates", long_about = None)]
pub struct Config {
	/// Address to bind the HTTP server to
	#[arg(long, env = "HOST", default_value = "0.0.0.0")]
	pub host: String,

	/// Port to listen on
	#[arg(long, env = "PORT", default_value = "5001")]
	pub port: u16,

	/// Emit logs as JSON
	#[arg(long, env = "LOG_JSON")]
	pub log_json: bool,

	/// Log filter directives
	#[arg(long, env = "RUST_LOG", default_value = "info")]
	pub rust_log: String,

	/// Transcription backend
	#[arg(long, env = "TRANSCRIBE_ENGINE", value_enum, default_value = "command")]
	pub engine: EngineKind,

	/// whisper.cpp CLI used by the command engine
	#[arg(long, env = "WHISPER_COMMAND", default_value = "whisper-cli")]
	pub whisper_command: PathBuf,

	/// Directory holding ggml-<model>.bin files
	#[arg(long, env = "WHISPER_MODELS_DIR", default_value = "models")]
	pub models_dir: PathBuf,

	/// Spoken language passed to whisper
	#[arg(long, env = "WHISPER_LANGUAGE", default_value = "en")]
	pub language: String,

	/// Number of threads for in-process whisper
	#[arg(long, env = "WHISPER_THREADS", default_value = "2")]
	pub whisper_threads: i32,

	/// Events buffered per session before the oldest is dropped
	#[arg(long, env = "ROOM_CAPACITY", default_value = "100")]
	pub room_capacity: usize,

	#[command(flatten)]
	pub queue: QueueConfig,
}

impl Config {
	/// Validate configuration values
	///
	/// # Errors
	/// Returns a description of the first invalid value.
	pub fn validate(&self) -> Result<(), String> {
		if self.whisper_threads < 1 {
			return Err("whisper_threads must be at least 1".to_string());
		}

		if self.language.trim().is_empty() {
			return Err("language must not be empty".to_string());
		}

		if self.room_capacity == 0 {
			return Err("room_capacity must be greater than 0".to_string());
		}

		if self.engine == EngineKind::Whisper && !cfg!(feature = "whisper") {
			return Err("engine 'whisper' requires building with the `whisper` feature".to_string());
		}

		self.queue.validate()
	}

	#[must_use]
	pub fn bind_addr(&self) -> String {
		format!("{}:{}", self.host, self.port)
	}
}
