use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::engine::{EngineContext, TranscriptionRequest};
use crate::error::EngineError;
use crate::events::QueueEvent;
use crate::manager::{log_store_failure, InFlight, Shared};
use crate::task::Task;

enum Outcome {
	Completed(String),
	Failed(String),
	/// The engine stopped on a [`crate::QueueManager::cancel`]; the session already heard about it.
	Cancelled,
}

/// Worker thread body. Returns once `stop` is cancelled, after the task in hand finishes.
pub(crate) fn run(shared: &Shared, stop: &CancellationToken) {
	info!("worker loop running");

	while !stop.is_cancelled() {
		if !shared.queue.wait_ready(shared.poll_interval) {
			continue;
		}

		// holds the claimed task until its terminal event is out
		let mut unreported = None;
		if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| run_once(shared, stop, &mut unreported))) {
			let reason = panic_message(payload.as_ref());
			error!(reason = %reason, "worker iteration panicked, continuing");
			let mut state = shared.lock();
			state.current = None;
			if let Some(task) = unreported {
				report_panic(shared, &task, &reason);
			}
			drop(state);
		}
	}

	info!("worker loop exiting");
}

fn run_once(shared: &Shared, stop: &CancellationToken, unreported: &mut Option<Task>) {
	let Some((task, token)) = claim(shared, stop, unreported) else {
		return;
	};

	let ctx = EngineContext::new(task.session_id.clone(), Arc::clone(&shared.notifier), token);
	let started = Instant::now();
	let result = panic::catch_unwind(AssertUnwindSafe(|| shared.engine.transcribe(&TranscriptionRequest::from(&task), &ctx)))
		.unwrap_or_else(|payload| Err(EngineError::Panicked(panic_message(payload.as_ref()))));

	finish(shared, &task, result, started.elapsed(), unreported);
}

// Takes the next task under the manager lock, so a concurrent cancel either
// removes it from the queue or sees it as current.
fn claim(shared: &Shared, stop: &CancellationToken, unreported: &mut Option<Task>) -> Option<(Task, CancellationToken)> {
	let mut state = shared.lock();
	if stop.is_cancelled() {
		return None;
	}
	let task = shared.queue.try_pop()?;
	*unreported = Some(task.clone());
	// only cancel and clear fire this; shutdown lets the task finish
	let token = CancellationToken::new();

	// removed before the engine runs, so a crash from here on never replays it
	log_store_failure("remove_pending", Some(&task.queue_id), shared.store.remove_pending(&task.queue_id));
	shared.notifier.notify(&task.session_id, QueueEvent::processing(&task.queue_id));
	shared.metrics.set_queue_depth(shared.queue.len());
	info!(queue_id = %task.queue_id, session_id = %task.session_id, model = %task.model_name, file = %task.file_path.display(), "processing task");

	state.current = Some(InFlight {
		task: task.clone(),
		cancel: token.clone(),
		cancelled_by_request: false,
	});
	Some((task, token))
}

fn finish(shared: &Shared, task: &Task, result: Result<String, EngineError>, elapsed: Duration, unreported: &mut Option<Task>) {
	let mut state = shared.lock();
	let cancelled_by_request = state.current.take().is_some_and(|current| current.cancelled_by_request);

	// cancel is advisory: a transcript the engine still produced is kept
	let outcome = match result {
		Ok(text) => Outcome::Completed(text),
		Err(EngineError::Cancelled) if cancelled_by_request => Outcome::Cancelled,
		Err(e) => Outcome::Failed(e.to_string()),
	};

	match outcome {
		Outcome::Completed(text) => {
			log_store_failure("put_result", Some(&task.queue_id), shared.store.put_result(&task.queue_id, &text));
			info!(queue_id = %task.queue_id, chars = text.len(), elapsed_ms = elapsed.as_millis(), cancelled_by_request, "transcription complete");
			shared.metrics.task_completed(elapsed);
			shared.notifier.notify(&task.session_id, QueueEvent::complete(&task.queue_id, text));
		}
		Outcome::Failed(message) => {
			error!(queue_id = %task.queue_id, error = %message, elapsed_ms = elapsed.as_millis(), "transcription failed");
			shared.metrics.task_failed(elapsed);
			shared.notifier.notify(&task.session_id, QueueEvent::error(&task.queue_id, message));
		}
		Outcome::Cancelled => {
			info!(queue_id = %task.queue_id, elapsed_ms = elapsed.as_millis(), "cancelled task stopped");
		}
	}
	*unreported = None;

	shared.broadcast_positions(&state);
	info!(remaining = shared.queue.len(), "worker ready for next task");
}

// The notifier may be what panicked, so a second panic is swallowed here.
fn report_panic(shared: &Shared, task: &Task, reason: &str) {
	shared.metrics.task_failed(Duration::ZERO);
	let message = format!("worker panicked: {reason}");
	let sent = panic::catch_unwind(AssertUnwindSafe(|| shared.notifier.notify(&task.session_id, QueueEvent::error(&task.queue_id, message))));
	if sent.is_err() {
		error!(queue_id = %task.queue_id, "could not report worker panic to session");
	}
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
	payload
		.downcast_ref::<&str>()
		.map(|s| (*s).to_string())
		.or_else(|| payload.downcast_ref::<String>().cloned())
		.unwrap_or_else(|| "unknown panic".to_string())
}
