use clap::Args;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Args, Clone, Debug, Serialize, Deserialize)]
pub struct QueueConfig {
	#[arg(long, env = "STORAGE_DIR", default_value = "storage", help = "Directory holding queue.json and results.json")]
	pub storage_dir: PathBuf,

	#[arg(
        long = "poll-interval-ms",
        env = "QUEUE_POLL_INTERVAL_MS",
        default_value = "1000",
        value_parser = parse_millis,
        help = "How long the worker waits for a task before re-checking the stop signal"
    )]
	pub poll_interval: Duration,
}

impl Default for QueueConfig {
	fn default() -> Self {
		Self {
			storage_dir: PathBuf::from("storage"),
			poll_interval: DEFAULT_POLL_INTERVAL,
		}
	}
}

impl QueueConfig {
	#[must_use]
	pub fn new(storage_dir: impl Into<PathBuf>) -> Self {
		Self {
			storage_dir: storage_dir.into(),
			..Self::default()
		}
	}

	#[must_use]
	pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
		self.poll_interval = poll_interval;
		self
	}

	/// Validate configuration values
	///
	/// # Errors
	/// Returns a description of the first invalid value.
	pub fn validate(&self) -> Result<(), String> {
		if self.storage_dir.as_os_str().is_empty() {
			return Err("storage_dir must not be empty".to_string());
		}

		if self.poll_interval.is_zero() {
			return Err("poll_interval must be greater than 0".to_string());
		}

		Ok(())
	}
}

fn parse_millis(s: &str) -> Result<Duration, std::num::ParseIntError> {
	s.parse::<u64>().map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
	use super::*;
	use clap::Parser;

	#[derive(Parser, Debug)]
	struct Cli {
		#[command(flatten)]
		queue: QueueConfig,
	}

	#[test]
	fn test_default_config() {
		let config = QueueConfig::default();
		assert_eq!(config.storage_dir, PathBuf::from("storage"));
		assert_eq!(config.poll_interval, Duration::from_secs(1));
		assert!(config.validate().is_ok());
	}

	#[test]
	fn test_parse_millis() {
		assert_eq!(parse_millis("250").unwrap(), Duration::from_millis(250));
		assert!(parse_millis("soon").is_err());
	}

	#[test]
	fn test_config_parser() {
		let args = vec!["program", "--storage-dir", "/var/lib/transcribe", "--poll-interval-ms", "50"];

		let cli = Cli::try_parse_from(args).unwrap();
		assert_eq!(cli.queue.storage_dir, PathBuf::from("/var/lib/transcribe"));
		assert_eq!(cli.queue.poll_interval, Duration::from_millis(50));
	}

	#[test]
	fn test_validate_rejects_zero_poll_interval() {
		let config = QueueConfig::new("storage").with_poll_interval(Duration::ZERO);
		assert!(config.validate().is_err());
		assert!(QueueConfig::new("").validate().is_err());
	}
}
