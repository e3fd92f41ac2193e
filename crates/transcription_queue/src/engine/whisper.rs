use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{info, warn};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use super::{EngineContext, TranscriptionEngine, TranscriptionRequest};
use crate::error::EngineError;
use crate::task::ModelName;

pub const WHISPER_SAMPLE_RATE: u32 = 16_000;

/// In-process whisper.cpp inference through `whisper-rs`.
///
/// Input must be a WAV file. Models are loaded on first use and kept for
/// the life of the engine.
pub struct WhisperEngine {
	models_dir: PathBuf,
	language: String,
	threads: i32,
	contexts: Mutex<HashMap<ModelName, Arc<WhisperContext>>>,
}

impl WhisperEngine {
	#[must_use]
	pub fn new(models_dir: impl Into<PathBuf>, language: impl Into<String>, threads: i32) -> Self {
		Self {
			models_dir: models_dir.into(),
			language: language.into(),
			threads: threads.max(1),
			contexts: Mutex::new(HashMap::new()),
		}
	}

	#[must_use]
	pub fn model_path(&self, model: ModelName) -> PathBuf {
		self.models_dir.join(format!("ggml-{}.bin", model.ggml_stem()))
	}

	fn context(&self, model: ModelName) -> Result<Arc<WhisperContext>, EngineError> {
		let mut contexts = self.contexts.lock().unwrap_or_else(PoisonError::into_inner);
		if let Some(ctx) = contexts.get(&model) {
			return Ok(Arc::clone(ctx));
		}

		let path = self.model_path(model);
		if !path.is_file() {
			return Err(EngineError::ModelUnavailable(path.display().to_string()));
		}

		info!(model = %model, path = %path.display(), "loading whisper model");
		let start = Instant::now();
		let ctx = WhisperContext::new_with_params(&path.to_string_lossy(), WhisperContextParameters::default())
			.map_err(|e| EngineError::ModelUnavailable(format!("{}: {e}", path.display())))?;
		info!(model = %model, load_time_ms = start.elapsed().as_millis(), threads = self.threads, "whisper model loaded");

		let ctx = Arc::new(ctx);
		contexts.insert(model, Arc::clone(&ctx));
		Ok(ctx)
	}

	fn params(&self, ctx: &EngineContext) -> FullParams<'_, 'static> {
		let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
		params.set_language(Some(self.language.as_str()));
		params.set_translate(false);
		params.set_print_special(false);
		params.set_print_progress(false);
		params.set_print_realtime(false);
		params.set_print_timestamps(false);
		params.set_n_threads(self.threads);

		let progress = ctx.clone();
		params.set_progress_callback_safe(move |percent: i32| {
			// whisper reports 0..=100; keep the 10% floor reported at start
			#[allow(clippy::cast_precision_loss)]
			let fraction = 0.1 + 0.9 * (percent.clamp(0, 100) as f32 / 100.0);
			progress.report_progress(fraction);
		});

		let token = ctx.cancellation_token().clone();
		params.set_abort_callback_safe(move || token.is_cancelled());

		params
	}
}

/// Reads a WAV file as mono f32 samples at 16 kHz.
///
/// # Errors
/// Returns [`EngineError::UnsupportedMedia`] when the file is not a PCM or float WAV.
pub fn load_wav(path: &Path) -> Result<Vec<f32>, EngineError> {
	let unsupported = |e: hound::Error| EngineError::UnsupportedMedia(format!("{}: {e}", path.display()));
	let mut reader = hound::WavReader::open(path).map_err(unsupported)?;
	let spec = reader.spec();

	let samples: Vec<f32> = match spec.sample_format {
		hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>().map_err(unsupported)?,
		hound::SampleFormat::Int => {
			#[allow(clippy::cast_precision_loss)]
			let scale = (1_i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
			reader.samples::<i32>().map(|s| s.map(|s| s as f32 / scale)).collect::<Result<_, _>>().map_err(unsupported)?
		}
	};

	let mono = downmix(&samples, spec.channels);
	Ok(resample(&mono, spec.sample_rate, WHISPER_SAMPLE_RATE))
}

#[allow(clippy::cast_precision_loss)]
fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
	if channels <= 1 {
		return samples.to_vec();
	}
	let channels = usize::from(channels);
	samples.chunks(channels).map(|frame| frame.iter().sum::<f32>() / frame.len() as f32).collect()
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
	if from_rate == to_rate || from_rate == 0 {
		return samples.to_vec();
	}

	let ratio = from_rate as f32 / to_rate as f32;
	let output_len = (samples.len() as f32 / ratio) as usize;

	(0..output_len)
		.map(|i| {
			let src_idx = (i as f32 * ratio) as usize;
			samples.get(src_idx).copied().unwrap_or(0.0)
		})
		.collect()
}

impl TranscriptionEngine for WhisperEngine {
	fn transcribe(&self, request: &TranscriptionRequest<'_>, ctx: &EngineContext) -> Result<String, EngineError> {
		ctx.report_progress(0.1);
		let whisper = self.context(request.model)?;
		let audio = load_wav(request.file_path)?;
		ctx.check_cancelled()?;

		let mut state = whisper.create_state().map_err(|e| EngineError::Failed(format!("failed to create whisper state: {e}")))?;
		let start = Instant::now();
		let outcome = state.full(self.params(ctx), &audio);
		if ctx.is_cancelled() {
			return Err(EngineError::Cancelled);
		}
		outcome.map_err(|e| EngineError::Failed(e.to_string()))?;

		let num_segments = state.full_n_segments();
		if num_segments == 0 {
			warn!(queue_id = request.queue_id, "no segments extracted, audio may be silence");
		}

		let mut segments = Vec::new();
		for i in 0..num_segments {
			if let Some(segment) = state.get_segment(i) {
				if let Ok(text) = segment.to_str() {
					let trimmed = text.trim();
					if !trimmed.is_empty() {
						segments.push(trimmed.to_string());
					}
				}
			}
		}

		info!(queue_id = request.queue_id, segments = segments.len(), elapsed_ms = start.elapsed().as_millis(), "whisper transcription finished");
		ctx.report_progress(1.0);
		Ok(segments.join(" "))
	}
}
