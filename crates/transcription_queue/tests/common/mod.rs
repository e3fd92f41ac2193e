#![allow(dead_code)]

use prometheus::Registry;
use std::io;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use transcription_queue::{DurableStore, EngineContext, EngineError, JsonFileStore, Notifier, QueueConfig, QueueEvent, QueueManager, QueueMetrics, StoreError, SubmitRequest, Task, TranscriptionEngine, TranscriptionRequest};

pub const WAIT: Duration = Duration::from_secs(10);
pub const POLL: Duration = Duration::from_millis(20);

/// Captures every `(room, event)` pair in emission order.
#[derive(Default)]
pub struct Recorder {
	events: Mutex<Vec<(String, QueueEvent)>>,
	changed: Condvar,
}

impl Notifier for Recorder {
	fn notify(&self, room: &str, event: QueueEvent) {
		self.events.lock().unwrap().push((room.to_string(), event));
		self.changed.notify_all();
	}
}

impl Recorder {
	pub fn all(&self) -> Vec<(String, QueueEvent)> {
		self.events.lock().unwrap().clone()
	}

	pub fn room(&self, room: &str) -> Vec<QueueEvent> {
		self.all().into_iter().filter(|(r, _)| r == room).map(|(_, e)| e).collect()
	}

	pub fn for_task(&self, queue_id: &str) -> Vec<QueueEvent> {
		self.all().into_iter().map(|(_, e)| e).filter(|e| e.queue_id() == Some(queue_id)).collect()
	}

	pub fn is_empty(&self) -> bool {
		self.events.lock().unwrap().is_empty()
	}

	/// Blocks until `seen` holds for the recorded events.
	pub fn wait_for(&self, mut seen: impl FnMut(&[(String, QueueEvent)]) -> bool) -> Vec<(String, QueueEvent)> {
		let deadline = Instant::now() + WAIT;
		let mut events = self.events.lock().unwrap();
		while !seen(&events) {
			let left = deadline.checked_duration_since(Instant::now()).expect("timed out waiting for events");
			events = self.changed.wait_timeout(events, left).unwrap().0;
		}
		events.clone()
	}

	pub fn wait_for_event(&self, wanted: &QueueEvent) {
		self.wait_for(|events| events.iter().any(|(_, e)| e == wanted));
	}
}

pub enum Step {
	Reply(Result<String, String>),
	Panic(&'static str),
}

/// Engine driven from the test: announces each call, then waits for a step.
///
/// A call waiting for its step returns `Cancelled` once its token fires.
pub struct ScriptedEngine {
	started: Mutex<Sender<String>>,
	steps: Mutex<Receiver<Step>>,
}

pub struct Script {
	pub started: Receiver<String>,
	pub steps: Sender<Step>,
}

impl Script {
	pub fn expect_start(&self) -> String {
		self.started.recv_timeout(WAIT).expect("engine was never called")
	}

	pub fn reply(&self, text: &str) {
		self.steps.send(Step::Reply(Ok(text.to_string()))).unwrap();
	}

	pub fn fail(&self, message: &str) {
		self.steps.send(Step::Reply(Err(message.to_string()))).unwrap();
	}
}

pub fn scripted() -> (Arc<ScriptedEngine>, Script) {
	let (started_tx, started_rx) = mpsc::channel();
	let (steps_tx, steps_rx) = mpsc::channel();
	let engine = ScriptedEngine {
		started: Mutex::new(started_tx),
		steps: Mutex::new(steps_rx),
	};
	(Arc::new(engine), Script { started: started_rx, steps: steps_tx })
}

impl TranscriptionEngine for ScriptedEngine {
	fn transcribe(&self, request: &TranscriptionRequest<'_>, ctx: &EngineContext) -> Result<String, EngineError> {
		let _ = self.started.lock().unwrap_or_else(PoisonError::into_inner).send(request.queue_id.to_string());
		// a scripted panic poisons the lock; later calls keep working
		let steps = self.steps.lock().unwrap_or_else(PoisonError::into_inner);
		loop {
			ctx.check_cancelled()?;
			match steps.recv_timeout(POLL) {
				Ok(Step::Reply(Ok(text))) => return Ok(text),
				Ok(Step::Reply(Err(message))) => return Err(EngineError::Failed(message)),
				Ok(Step::Panic(message)) => panic!("{message}"),
				Err(RecvTimeoutError::Timeout) => {}
				Err(RecvTimeoutError::Disconnected) => return Err(EngineError::Failed("script ended".to_string())),
			}
		}
	}
}

/// A store whose disk is gone: reads come back empty and every write fails.
pub struct BrokenStore;

fn disk_gone() -> StoreError {
	StoreError::Io(io::Error::other("disk gone"))
}

impl DurableStore for BrokenStore {
	fn list_pending(&self) -> Vec<Task> {
		Vec::new()
	}

	fn append_pending(&self, _task: &Task) -> Result<(), StoreError> {
		Err(disk_gone())
	}

	fn remove_pending(&self, _queue_id: &str) -> Result<Option<Task>, StoreError> {
		Err(disk_gone())
	}

	fn replace_pending(&self, _tasks: &[Task]) -> Result<(), StoreError> {
		Err(disk_gone())
	}

	fn list_results(&self) -> transcription_queue::store::Results {
		transcription_queue::store::Results::new()
	}

	fn put_result(&self, _queue_id: &str, _text: &str) -> Result<(), StoreError> {
		Err(disk_gone())
	}
}

/// Wraps a closure so its signature is inferred against the engine trait.
pub fn engine_fn<F>(f: F) -> Arc<dyn TranscriptionEngine>
where
	F: Fn(&TranscriptionRequest<'_>, &EngineContext) -> Result<String, EngineError> + Send + Sync + 'static,
{
	Arc::new(f)
}

pub fn echo_engine() -> Arc<dyn TranscriptionEngine> {
	engine_fn(|request, _| Ok(format!("text of {}", request.queue_id)))
}

// fields drop in order: the manager stops before its directory goes away
pub struct Harness {
	pub manager: QueueManager,
	pub store: Arc<JsonFileStore>,
	pub recorder: Arc<Recorder>,
	pub registry: Registry,
	pub dir: TempDir,
}

pub fn config(dir: &TempDir) -> QueueConfig {
	QueueConfig::new(dir.path()).with_poll_interval(POLL)
}

pub fn manager_on(dir: &TempDir, recorder: &Arc<Recorder>, engine: Arc<dyn TranscriptionEngine>) -> (Arc<JsonFileStore>, QueueManager) {
	let store = Arc::new(JsonFileStore::open(dir.path()).unwrap());
	let metrics = QueueMetrics::new(&Registry::new()).unwrap();
	let manager = QueueManager::new(store.clone(), recorder.clone(), engine, &config(dir), metrics);
	(store, manager)
}

pub fn harness(engine: Arc<dyn TranscriptionEngine>) -> Harness {
	let dir = TempDir::new().unwrap();
	let recorder = Arc::new(Recorder::default());
	let registry = Registry::new();
	let store = Arc::new(JsonFileStore::open(dir.path()).unwrap());
	let metrics = QueueMetrics::new(&registry).unwrap();
	let manager = QueueManager::new(store.clone(), recorder.clone(), engine, &config(&dir), metrics);
	Harness {
		manager,
		store,
		recorder,
		registry,
		dir,
	}
}

pub fn request(queue_id: &str, session_id: &str) -> SubmitRequest {
	SubmitRequest::new(format!("/uploads/{queue_id}.wav"), session_id, "base", queue_id)
}

pub fn pending_ids(store: &dyn DurableStore) -> Vec<String> {
	store.list_pending().into_iter().map(|t| t.queue_id).collect()
}

pub fn wait_until(mut done: impl FnMut() -> bool) {
	let deadline = Instant::now() + WAIT;
	while !done() {
		assert!(Instant::now() < deadline, "condition not reached in time");
		std::thread::sleep(POLL);
	}
}
