use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::QueueConfig;
use crate::engine::TranscriptionEngine;
use crate::error::{QueueError, StoreError, ValidationError};
use crate::events::QueueEvent;
use crate::metrics::QueueMetrics;
use crate::notify::Notifier;
use crate::queue::TaskQueue;
use crate::store::{DurableStore, JsonFileStore};
use crate::task::{SubmitRequest, Task};
use crate::worker;

pub const WORKER_THREAD_NAME: &str = "transcription-worker";

/// The task being transcribed right now.
pub(crate) struct InFlight {
	pub(crate) task: Task,
	pub(crate) cancel: CancellationToken,
	pub(crate) cancelled_by_request: bool,
}

#[derive(Default)]
pub(crate) struct State {
	pub(crate) current: Option<InFlight>,
}

/// Everything the worker thread needs, handed over explicitly at start.
pub(crate) struct Shared {
	state: Mutex<State>,
	pub(crate) queue: TaskQueue,
	pub(crate) store: Arc<dyn DurableStore>,
	pub(crate) notifier: Arc<dyn Notifier>,
	pub(crate) engine: Arc<dyn TranscriptionEngine>,
	pub(crate) metrics: QueueMetrics,
	pub(crate) poll_interval: Duration,
}

impl Shared {
	/// The manager lock. Queue mutations, the current task and every store write happen under it.
	pub(crate) fn lock(&self) -> MutexGuard<'_, State> {
		self.state.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// Sends every waiting task its current 1-based position. Caller holds the manager lock.
	pub(crate) fn broadcast_positions(&self, _state: &State) {
		let pending = self.queue.snapshot();
		self.metrics.set_queue_depth(pending.len());
		for (index, task) in pending.iter().enumerate() {
			self.notifier.notify(&task.session_id, QueueEvent::queued(&task.queue_id, index + 1));
		}
	}
}

/// Store writes never abort processing: the in-memory queue stays authoritative.
pub(crate) fn log_store_failure<T>(operation: &str, queue_id: Option<&str>, result: Result<T, StoreError>) {
	if let Err(e) = result {
		error!(operation, queue_id, error = %e, "storage write failed, continuing with in-memory state");
	}
}

enum WorkerSlot {
	Idle,
	Running(JoinHandle<()>),
	Stopped,
}

/// Serializes transcription work: many producers submit, one worker thread
/// processes tasks strictly in arrival order.
///
/// Pending tasks are mirrored to a [`DurableStore`] and replayed on
/// construction. A task that was being processed when the process died is
/// not replayed.
pub struct QueueManager {
	shared: Arc<Shared>,
	stop: CancellationToken,
	worker: Mutex<WorkerSlot>,
}

impl QueueManager {
	/// Builds a manager and seeds its queue from `store`. The worker is not started.
	#[must_use]
	pub fn new(store: Arc<dyn DurableStore>, notifier: Arc<dyn Notifier>, engine: Arc<dyn TranscriptionEngine>, config: &QueueConfig, metrics: QueueMetrics) -> Self {
		let recovered = store.list_pending();
		if !recovered.is_empty() {
			info!(count = recovered.len(), "replaying pending tasks from storage");
		}
		metrics.set_queue_depth(recovered.len());

		let shared = Shared {
			state: Mutex::new(State::default()),
			queue: TaskQueue::with_tasks(recovered),
			store,
			notifier,
			engine,
			metrics,
			poll_interval: config.poll_interval,
		};

		Self {
			shared: Arc::new(shared),
			stop: CancellationToken::new(),
			worker: Mutex::new(WorkerSlot::Idle),
		}
	}

	/// Opens a [`JsonFileStore`] in `config.storage_dir` and builds a manager on it.
	///
	/// # Errors
	/// Returns an error if the storage directory cannot be prepared.
	pub fn open(config: &QueueConfig, notifier: Arc<dyn Notifier>, engine: Arc<dyn TranscriptionEngine>, metrics: QueueMetrics) -> Result<Self, QueueError> {
		let store = JsonFileStore::open(&config.storage_dir)?;
		Ok(Self::new(Arc::new(store), notifier, engine, config, metrics))
	}

	/// Spawns the worker thread.
	///
	/// # Errors
	/// Returns [`QueueError::WorkerAlreadyStarted`] on a second call and
	/// [`QueueError::WorkerSpawn`] if the OS refuses a new thread.
	pub fn start(&self) -> Result<(), QueueError> {
		let mut slot = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
		if !matches!(*slot, WorkerSlot::Idle) {
			return Err(QueueError::WorkerAlreadyStarted);
		}

		let shared = Arc::clone(&self.shared);
		let stop = self.stop.clone();
		let handle = thread::Builder::new()
			.name(WORKER_THREAD_NAME.to_string())
			.spawn(move || worker::run(&shared, &stop))
			.map_err(QueueError::WorkerSpawn)?;

		*slot = WorkerSlot::Running(handle);
		info!(poll_interval_ms = self.shared.poll_interval.as_millis(), "transcription worker started");
		Ok(())
	}

	/// Validates and enqueues a task. Returns its 1-based position.
	///
	/// # Errors
	/// Returns [`QueueError::Validation`] for a missing field, an unknown model
	/// or a `queue_id` that is pending or in flight. Nothing is mutated or
	/// emitted in that case.
	pub fn submit(&self, request: SubmitRequest) -> Result<usize, QueueError> {
		let task = request.validate()?;

		let state = self.shared.lock();
		let in_flight = state.current.as_ref().is_some_and(|current| current.task.queue_id == task.queue_id);
		if in_flight || self.shared.queue.contains(&task.queue_id) {
			return Err(ValidationError::DuplicateQueueId(task.queue_id).into());
		}

		let position = self.shared.queue.push(task.clone());
		log_store_failure("append_pending", Some(&task.queue_id), self.shared.store.append_pending(&task));
		self.shared.notifier.notify(&task.session_id, QueueEvent::queued(&task.queue_id, position));
		self.shared.metrics.set_queue_depth(position);
		drop(state);

		self.shared.metrics.task_submitted();
		info!(queue_id = %task.queue_id, session_id = %task.session_id, model = %task.model_name, position, "task queued");
		Ok(position)
	}

	/// Cancels pending tasks of `session_id`, or of every session when `None`.
	///
	/// A matching in-flight task gets `task_cancelled` and its engine call is
	/// asked to stop; a transcript the engine returns anyway is still kept.
	/// Remaining tasks are renumbered. Returns how many tasks were cancelled.
	pub fn cancel(&self, session_id: Option<&str>) -> usize {
		let mut state = self.shared.lock();
		let cancelled = self.cancel_matching(&mut state, session_id);
		let retained = self.shared.queue.snapshot();
		log_store_failure("replace_pending", None, self.shared.store.replace_pending(&retained));
		cancelled
	}

	/// Cancels everything and empties the stored pending list.
	pub fn clear(&self) -> usize {
		let mut state = self.shared.lock();
		let cancelled = self.cancel_matching(&mut state, None);
		log_store_failure("clear_pending", None, self.shared.store.clear_pending());
		cancelled
	}

	fn cancel_matching(&self, state: &mut State, session_id: Option<&str>) -> usize {
		let mut cancelled = 0;

		if let Some(current) = state.current.as_mut() {
			if current.task.belongs_to(session_id) && !current.cancelled_by_request {
				current.cancelled_by_request = true;
				current.cancel.cancel();
				self.shared.notifier.notify(&current.task.session_id, QueueEvent::cancelled(&current.task.queue_id));
				info!(queue_id = %current.task.queue_id, session_id = %current.task.session_id, "in-flight task cancelled");
				cancelled += 1;
			}
		}

		let removed = self.shared.queue.remove_where(|task| task.belongs_to(session_id));
		for task in &removed {
			self.shared.notifier.notify(&task.session_id, QueueEvent::cancelled(&task.queue_id));
			debug!(queue_id = %task.queue_id, session_id = %task.session_id, "pending task cancelled");
		}
		cancelled += removed.len();

		if !removed.is_empty() {
			self.shared.broadcast_positions(state);
		}
		if cancelled > 0 {
			self.shared.metrics.tasks_cancelled(cancelled);
			info!(session_id, cancelled, remaining = self.shared.queue.len(), "cancel finished");
		}
		cancelled
	}

	/// Stops the worker after its current task and waits for the thread to exit. Idempotent.
	///
	/// A task already in flight runs to completion and its result is kept;
	/// tasks still waiting stay in the store for the next start.
	pub fn shutdown(&self) {
		self.stop.cancel();

		let previous = {
			let mut slot = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
			std::mem::replace(&mut *slot, WorkerSlot::Stopped)
		};

		if let WorkerSlot::Running(handle) = previous {
			info!("waiting for transcription worker to exit");
			if handle.join().is_err() {
				warn!("transcription worker thread panicked");
			}
			info!("transcription worker stopped");
		}
	}

	#[must_use]
	pub fn is_running(&self) -> bool {
		matches!(*self.worker.lock().unwrap_or_else(PoisonError::into_inner), WorkerSlot::Running(_))
	}

	/// Waiting tasks, oldest first.
	#[must_use]
	pub fn pending(&self) -> Vec<Task> {
		self.shared.queue.snapshot()
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.shared.queue.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.shared.queue.is_empty()
	}

	/// `queue_id` of the task being transcribed, if any.
	#[must_use]
	pub fn current(&self) -> Option<String> {
		self.shared.lock().current.as_ref().map(|current| current.task.queue_id.clone())
	}

	#[must_use]
	pub fn result(&self, queue_id: &str) -> Option<String> {
		self.shared.store.result(queue_id)
	}

	/// Lock-free access for status pages. May be momentarily stale.
	#[must_use]
	pub fn store(&self) -> &Arc<dyn DurableStore> {
		&self.shared.store
	}

	#[must_use]
	pub fn metrics(&self) -> &QueueMetrics {
		&self.shared.metrics
	}
}

impl Drop for QueueManager {
	fn drop(&mut self) {
		self.shutdown();
	}
}
