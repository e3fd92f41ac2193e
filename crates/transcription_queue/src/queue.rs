use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::task::Task;

/// Thread-safe FIFO of pending tasks.
///
/// Producers `push`; a consumer blocks in `pop_blocking` with a timeout so it
/// can periodically look at its stop signal. The manager's worker uses
/// `wait_ready` + `try_pop` instead so the pop happens under its own lock.
#[derive(Debug, Default)]
pub struct TaskQueue {
	items: Mutex<VecDeque<Task>>,
	ready: Condvar,
}

impl TaskQueue {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Seeds a queue in the given order, e.g. from the durable store.
	#[must_use]
	pub fn with_tasks(tasks: impl IntoIterator<Item = Task>) -> Self {
		Self {
			items: Mutex::new(tasks.into_iter().collect()),
			ready: Condvar::new(),
		}
	}

	fn items(&self) -> MutexGuard<'_, VecDeque<Task>> {
		self.items.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// Appends a task and returns its 1-based position.
	pub fn push(&self, task: Task) -> usize {
		let position = {
			let mut items = self.items();
			items.push_back(task);
			items.len()
		};
		self.ready.notify_one();
		position
	}

	/// Removes the oldest task, waiting up to `timeout` for one to arrive.
	#[must_use]
	pub fn pop_blocking(&self, timeout: Duration) -> Option<Task> {
		let items = self.items();
		let (mut items, _) = self.ready.wait_timeout_while(items, timeout, |items| items.is_empty()).unwrap_or_else(PoisonError::into_inner);
		items.pop_front()
	}

	/// Waits up to `timeout` until the queue is non-empty, without taking anything.
	#[must_use]
	pub fn wait_ready(&self, timeout: Duration) -> bool {
		let items = self.items();
		let (items, _) = self.ready.wait_timeout_while(items, timeout, |items| items.is_empty()).unwrap_or_else(PoisonError::into_inner);
		!items.is_empty()
	}

	#[must_use]
	pub fn try_pop(&self) -> Option<Task> {
		self.items().pop_front()
	}

	/// Copy of the current contents, oldest first. Never observes a half-applied push or pop.
	#[must_use]
	pub fn snapshot(&self) -> Vec<Task> {
		self.items().iter().cloned().collect()
	}

	/// Removes every task matching `predicate` in one step. Survivors keep their relative order.
	pub fn remove_where(&self, mut predicate: impl FnMut(&Task) -> bool) -> Vec<Task> {
		let mut items = self.items();
		let (removed, retained): (VecDeque<Task>, VecDeque<Task>) = items.drain(..).partition(|t| predicate(t));
		*items = retained;
		removed.into()
	}

	#[must_use]
	pub fn contains(&self, queue_id: &str) -> bool {
		self.items().iter().any(|t| t.queue_id == queue_id)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.items().len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.items().is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::task::ModelName;
	use std::sync::Arc;
	use std::thread;
	use std::time::Instant;

	fn task(id: &str) -> Task {
		Task::new(id, "session", ModelName::Tiny, "/tmp/file.wav")
	}

	#[test]
	fn test_push_returns_position() {
		let queue = TaskQueue::new();
		assert_eq!(queue.push(task("a")), 1);
		assert_eq!(queue.push(task("b")), 2);
		assert_eq!(queue.len(), 2);
		assert!(queue.contains("b"));
		assert!(!queue.contains("c"));
	}

	#[test]
	fn test_fifo_order() {
		let queue = TaskQueue::with_tasks(vec![task("a"), task("b")]);
		queue.push(task("c"));

		let order: Vec<String> = std::iter::from_fn(|| queue.try_pop()).map(|t| t.queue_id).collect();
		assert_eq!(order, vec!["a", "b", "c"]);
		assert!(queue.is_empty());
	}

	#[test]
	fn test_pop_blocking_times_out_when_empty() {
		let queue = TaskQueue::new();
		let start = Instant::now();

		assert!(queue.pop_blocking(Duration::from_millis(30)).is_none());
		assert!(start.elapsed() >= Duration::from_millis(30));
	}

	#[test]
	fn test_pop_blocking_wakes_on_push() {
		let queue = Arc::new(TaskQueue::new());
		let producer = {
			let queue = Arc::clone(&queue);
			thread::spawn(move || {
				thread::sleep(Duration::from_millis(20));
				queue.push(task("late"));
			})
		};

		let popped = queue.pop_blocking(Duration::from_secs(5));
		producer.join().unwrap();
		assert_eq!(popped.map(|t| t.queue_id), Some("late".to_string()));
	}

	#[test]
	fn test_wait_ready_does_not_consume() {
		let queue = TaskQueue::new();
		assert!(!queue.wait_ready(Duration::from_millis(5)));

		queue.push(task("a"));
		assert!(queue.wait_ready(Duration::from_millis(5)));
		assert_eq!(queue.len(), 1);
	}

	#[test]
	fn test_snapshot_is_non_destructive() {
		let queue = TaskQueue::with_tasks(vec![task("a"), task("b")]);
		let snapshot: Vec<String> = queue.snapshot().into_iter().map(|t| t.queue_id).collect();

		assert_eq!(snapshot, vec!["a", "b"]);
		assert_eq!(queue.len(), 2);
	}

	#[test]
	fn test_remove_where_keeps_survivor_order() {
		let queue = TaskQueue::with_tasks(vec![task("a"), task("b"), task("c"), task("d")]);
		let removed = queue.remove_where(|t| t.queue_id == "b" || t.queue_id == "d");

		let removed: Vec<String> = removed.into_iter().map(|t| t.queue_id).collect();
		let left: Vec<String> = queue.snapshot().into_iter().map(|t| t.queue_id).collect();
		assert_eq!(removed, vec!["b", "d"]);
		assert_eq!(left, vec!["a", "c"]);
	}

	#[test]
	fn test_concurrent_producers_lose_nothing() {
		let queue = Arc::new(TaskQueue::new());
		let handles: Vec<_> = (0..8)
			.map(|p| {
				let queue = Arc::clone(&queue);
				thread::spawn(move || {
					for i in 0..50 {
						queue.push(task(&format!("{p}-{i}")));
					}
				})
			})
			.collect();
		for handle in handles {
			handle.join().unwrap();
		}

		let tasks: Vec<Task> = std::iter::from_fn(|| queue.try_pop()).collect();
		assert_eq!(tasks.len(), 400);
		assert!(queue.is_empty());
		// per-producer order survives interleaving
		for p in 0..8 {
			let seen: Vec<usize> = tasks
				.iter()
				.filter_map(|t| t.queue_id.strip_prefix(&format!("{p}-")).and_then(|i| i.parse().ok()))
				.collect();
			assert_eq!(seen, (0..50).collect::<Vec<_>>());
		}
	}
}
