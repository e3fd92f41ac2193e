//! Durable, single-flight transcription queue.
//!
//! Producers submit tasks to a [`QueueManager`]; one worker thread runs them
//! through a [`TranscriptionEngine`] in arrival order and reports progress to
//! the submitting session through a [`Notifier`].

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod manager;
pub mod metrics;
pub mod notify;
pub mod queue;
pub mod store;
pub mod task;
mod worker;

pub use config::QueueConfig;
pub use engine::{CommandEngine, EngineContext, TranscriptionEngine, TranscriptionRequest};
#[cfg(feature = "whisper")]
pub use engine::WhisperEngine;
pub use error::{EngineError, QueueError, StoreError, ValidationError};
pub use events::{QueueEvent, QueueStatus, QueueUpdate};
pub use manager::QueueManager;
pub use metrics::QueueMetrics;
pub use notify::{Notifier, RoomHub, RoomReceiver};
pub use queue::TaskQueue;
pub use store::{DurableStore, JsonFileStore};
pub use task::{ModelName, SubmitRequest, Task};
