use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{EngineContext, TranscriptionEngine, TranscriptionRequest};
use crate::error::EngineError;
use crate::task::ModelName;

const CHILD_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// whisper.cpp CLI flags: model, language, no timestamps, input file.
pub const DEFAULT_ARGS: [&str; 7] = ["-m", "{model}", "-l", "{language}", "-nt", "-f", "{file}"];

/// Runs an external transcriber per task and reads the transcript from stdout.
///
/// Arguments are a template; `{model}`, `{language}` and `{file}` are
/// substituted per call. Cancellation kills the child process.
#[derive(Debug, Clone)]
pub struct CommandEngine {
	program: PathBuf,
	args: Vec<String>,
	models_dir: PathBuf,
	language: String,
}

impl CommandEngine {
	#[must_use]
	pub fn new(program: impl Into<PathBuf>, models_dir: impl Into<PathBuf>) -> Self {
		Self {
			program: program.into(),
			args: DEFAULT_ARGS.iter().map(ToString::to_string).collect(),
			models_dir: models_dir.into(),
			language: "en".to_string(),
		}
	}

	#[must_use]
	pub fn with_language(mut self, language: impl Into<String>) -> Self {
		self.language = language.into();
		self
	}

	#[must_use]
	pub fn with_args<I, S>(mut self, args: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.args = args.into_iter().map(Into::into).collect();
		self
	}

	#[must_use]
	pub fn model_path(&self, model: ModelName) -> PathBuf {
		self.models_dir.join(format!("ggml-{}.bin", model.ggml_stem()))
	}

	fn render_args(&self, model_path: &Path, file: &Path) -> Vec<String> {
		let model = model_path.to_string_lossy();
		let file = file.to_string_lossy();
		self
			.args
			.iter()
			.map(|arg| arg.replace("{model}", &model).replace("{language}", &self.language).replace("{file}", &file))
			.collect()
	}

	fn wait(child: &mut Child, ctx: &EngineContext) -> Result<ExitStatus, EngineError> {
		loop {
			if ctx.is_cancelled() {
				warn!(pid = child.id(), "cancellation requested, killing transcriber process");
				if let Err(e) = child.kill() {
					debug!(error = %e, "kill failed, process already exited");
				}
				let _ = child.wait();
				return Err(EngineError::Cancelled);
			}

			if let Some(status) = child.try_wait()? {
				return Ok(status);
			}

			thread::sleep(CHILD_POLL_INTERVAL);
		}
	}
}

// Pipes are drained on their own threads so a chatty child never blocks on a full pipe.
fn collect<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
	thread::spawn(move || {
		let mut buf = Vec::new();
		if let Some(mut pipe) = pipe {
			let _ = pipe.read_to_end(&mut buf);
		}
		String::from_utf8_lossy(&buf).into_owned()
	})
}

fn join_output(handle: JoinHandle<String>) -> String {
	handle.join().unwrap_or_default()
}

impl TranscriptionEngine for CommandEngine {
	fn transcribe(&self, request: &TranscriptionRequest<'_>, ctx: &EngineContext) -> Result<String, EngineError> {
		let model_path = self.model_path(request.model);
		if !model_path.is_file() {
			return Err(EngineError::ModelUnavailable(model_path.display().to_string()));
		}
		if !request.file_path.is_file() {
			return Err(EngineError::UnsupportedMedia(format!("{} is not a readable file", request.file_path.display())));
		}
		ctx.check_cancelled()?;

		let args = self.render_args(&model_path, request.file_path);
		info!(queue_id = request.queue_id, program = %self.program.display(), model = %request.model, "starting transcriber process");
		ctx.report_progress(0.1);

		let mut child = Command::new(&self.program).args(&args).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped()).spawn()?;
		let stdout = collect(child.stdout.take());
		let stderr = collect(child.stderr.take());

		// On cancel the readers are left detached: a grandchild holding the pipes
		// would otherwise keep us waiting until it exits.
		let status = Self::wait(&mut child, ctx)?;
		let stdout = join_output(stdout);
		let stderr = join_output(stderr);

		if !status.success() {
			let detail = stderr.trim();
			let message = if detail.is_empty() { format!("transcriber exited with {status}") } else { detail.to_string() };
			return Err(EngineError::Failed(message));
		}

		ctx.report_progress(1.0);
		Ok(stdout.trim().to_string())
	}
}
