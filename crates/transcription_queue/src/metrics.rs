use prometheus::{Counter, Gauge, Histogram, HistogramOpts, Registry};
use std::time::Duration;

/// Queue counters registered on a caller-owned registry.
#[derive(Clone)]
pub struct QueueMetrics {
	submitted: Counter,
	completed: Counter,
	failed: Counter,
	cancelled: Counter,
	queue_depth: Gauge,
	processing_seconds: Histogram,
}

impl QueueMetrics {
	/// # Errors
	/// Returns an error if a metric with the same name is already registered.
	pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
		let submitted = Counter::new("transcription_tasks_submitted_total", "Tasks accepted by submit")?;
		let completed = Counter::new("transcription_tasks_completed_total", "Tasks transcribed successfully")?;
		let failed = Counter::new("transcription_tasks_failed_total", "Tasks whose transcription failed")?;
		let cancelled = Counter::new("transcription_tasks_cancelled_total", "Tasks removed or interrupted by cancel")?;
		let queue_depth = Gauge::new("transcription_queue_depth", "Tasks waiting in the queue")?;
		let processing_seconds = Histogram::with_opts(
			HistogramOpts::new("transcription_processing_seconds", "Wall time of one engine call").buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0]),
		)?;

		registry.register(Box::new(submitted.clone()))?;
		registry.register(Box::new(completed.clone()))?;
		registry.register(Box::new(failed.clone()))?;
		registry.register(Box::new(cancelled.clone()))?;
		registry.register(Box::new(queue_depth.clone()))?;
		registry.register(Box::new(processing_seconds.clone()))?;

		Ok(Self {
			submitted,
			completed,
			failed,
			cancelled,
			queue_depth,
			processing_seconds,
		})
	}

	pub(crate) fn task_submitted(&self) {
		self.submitted.inc();
	}

	pub(crate) fn task_completed(&self, elapsed: Duration) {
		self.completed.inc();
		self.processing_seconds.observe(elapsed.as_secs_f64());
	}

	pub(crate) fn task_failed(&self, elapsed: Duration) {
		self.failed.inc();
		self.processing_seconds.observe(elapsed.as_secs_f64());
	}

	#[allow(clippy::cast_precision_loss)]
	pub(crate) fn tasks_cancelled(&self, count: usize) {
		self.cancelled.inc_by(count as f64);
	}

	#[allow(clippy::cast_precision_loss)]
	pub(crate) fn set_queue_depth(&self, depth: usize) {
		self.queue_depth.set(depth as f64);
	}

	#[must_use]
	pub fn submitted(&self) -> f64 {
		self.submitted.get()
	}

	#[must_use]
	pub fn completed(&self) -> f64 {
		self.completed.get()
	}

	#[must_use]
	pub fn failed(&self) -> f64 {
		self.failed.get()
	}

	#[must_use]
	pub fn cancelled(&self) -> f64 {
		self.cancelled.get()
	}

	#[must_use]
	pub fn queue_depth(&self) -> f64 {
		self.queue_depth.get()
	}
}
