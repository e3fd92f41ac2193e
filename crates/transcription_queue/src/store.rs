use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tempfile::NamedTempFile;
use tracing::{debug, error, warn};

use crate::error::StoreError;
use crate::task::Task;

pub const QUEUE_FILE: &str = "queue.json";
pub const RESULTS_FILE: &str = "results.json";

pub type Results = BTreeMap<String, String>;

/// Crash-recovery mirror of pending tasks and finished transcripts.
///
/// Reads never fail: a missing or unreadable record is reported and
/// replaced by an empty default. Every write replaces the whole record;
/// the queue manager serializes its own writes under its lock.
pub trait DurableStore: Send + Sync {
	fn list_pending(&self) -> Vec<Task>;

	/// # Errors
	/// Returns an error if the pending record cannot be rewritten.
	fn append_pending(&self, task: &Task) -> Result<(), StoreError>;

	/// Removes the first pending task with `queue_id`.
	///
	/// # Errors
	/// Returns an error if the pending record cannot be rewritten.
	fn remove_pending(&self, queue_id: &str) -> Result<Option<Task>, StoreError>;

	/// # Errors
	/// Returns an error if the pending record cannot be rewritten.
	fn replace_pending(&self, tasks: &[Task]) -> Result<(), StoreError>;

	/// # Errors
	/// Returns an error if the pending record cannot be rewritten.
	fn clear_pending(&self) -> Result<(), StoreError> {
		self.replace_pending(&[])
	}

	fn list_results(&self) -> Results;

	/// # Errors
	/// Returns an error if the results record cannot be rewritten.
	fn put_result(&self, queue_id: &str, text: &str) -> Result<(), StoreError>;

	fn result(&self, queue_id: &str) -> Option<String> {
		self.list_results().remove(queue_id)
	}
}

/// Two pretty-printed JSON documents in one directory: `queue.json` (ordered
/// list) and `results.json` (`queue_id -> text`).
///
/// Read-modify-write cycles hold an internal lock, so callers outside the
/// manager (status routes, tests) cannot lose an update.
#[derive(Debug)]
pub struct JsonFileStore {
	dir: PathBuf,
	queue_file: PathBuf,
	results_file: PathBuf,
	writes: Mutex<()>,
}

impl JsonFileStore {
	/// Opens (and if needed creates) the storage directory.
	///
	/// Records that are absent are created empty. Existing records are left
	/// alone, even when they are unreadable, so a damaged file can still be
	/// inspected by hand until the next write replaces it.
	///
	/// # Errors
	/// Returns an error if the directory or an initial empty record cannot be created.
	pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
		let dir = dir.as_ref().to_path_buf();
		fs::create_dir_all(&dir)?;

		let store = Self {
			queue_file: dir.join(QUEUE_FILE),
			results_file: dir.join(RESULTS_FILE),
			dir,
			writes: Mutex::new(()),
		};

		if !store.queue_file.exists() {
			store.write_record(&store.queue_file, &Vec::<Task>::new())?;
		}
		if !store.results_file.exists() {
			store.write_record(&store.results_file, &Results::new())?;
		}

		debug!(dir = %store.dir.display(), "storage ready");
		Ok(store)
	}

	#[must_use]
	pub fn dir(&self) -> &Path {
		&self.dir
	}

	#[must_use]
	pub fn queue_file(&self) -> &Path {
		&self.queue_file
	}

	#[must_use]
	pub fn results_file(&self) -> &Path {
		&self.results_file
	}

	fn read_record<T>(path: &Path) -> T
	where
		T: DeserializeOwned + Default,
	{
		let raw = match fs::read(path) {
			Ok(raw) => raw,
			Err(e) if e.kind() == io::ErrorKind::NotFound => {
				warn!(path = %path.display(), "storage record missing, using empty default");
				return T::default();
			}
			Err(e) => {
				error!(path = %path.display(), error = %e, "failed to read storage record, using empty default");
				return T::default();
			}
		};

		serde_json::from_slice(&raw).unwrap_or_else(|e| {
			error!(path = %path.display(), error = %e, "corrupt storage record, using empty default");
			T::default()
		})
	}

	// Write to a sibling temp file and rename over the record so a crash never leaves a torn file.
	fn write_record<T>(&self, path: &Path, value: &T) -> Result<(), StoreError>
	where
		T: Serialize + ?Sized,
	{
		let mut tmp = NamedTempFile::new_in(&self.dir)?;
		{
			let mut writer = BufWriter::new(tmp.as_file_mut());
			serde_json::to_writer_pretty(&mut writer, value)?;
			writer.flush()?;
		}
		tmp.as_file().sync_all()?;
		tmp.persist(path)?;
		Ok(())
	}

	fn pending(&self) -> Vec<Task> {
		Self::read_record(&self.queue_file)
	}

	fn write_lock(&self) -> MutexGuard<'_, ()> {
		self.writes.lock().unwrap_or_else(PoisonError::into_inner)
	}
}

impl DurableStore for JsonFileStore {
	fn list_pending(&self) -> Vec<Task> {
		self.pending()
	}

	fn append_pending(&self, task: &Task) -> Result<(), StoreError> {
		let _writes = self.write_lock();
		let mut tasks = self.pending();
		tasks.push(task.clone());
		self.write_record(&self.queue_file, &tasks)
	}

	fn remove_pending(&self, queue_id: &str) -> Result<Option<Task>, StoreError> {
		let _writes = self.write_lock();
		let mut tasks = self.pending();
		let Some(index) = tasks.iter().position(|t| t.queue_id == queue_id) else {
			return Ok(None);
		};
		let removed = tasks.remove(index);
		self.write_record(&self.queue_file, &tasks)?;
		Ok(Some(removed))
	}

	fn replace_pending(&self, tasks: &[Task]) -> Result<(), StoreError> {
		let _writes = self.write_lock();
		self.write_record(&self.queue_file, tasks)
	}

	fn list_results(&self) -> Results {
		Self::read_record(&self.results_file)
	}

	fn put_result(&self, queue_id: &str, text: &str) -> Result<(), StoreError> {
		let _writes = self.write_lock();
		let mut results = self.list_results();
		results.insert(queue_id.to_string(), text.to_string());
		self.write_record(&self.results_file, &results)
	}
}
