pub mod config;
pub mod export;
pub mod job;
pub mod provider;
pub mod queue;

pub use config::{Config, ConfigError, MAX_WORKERS, MIN_WORKERS, OutputFormat};
pub use export::{ExportError, write_transcript};
pub use job::{Job, JobFailure, JobId, JobStatus, QueueStats, TranscriptionResult};
pub use provider::{
    MAX_FILE_SIZE, SUPPORTED_EXTENSIONS, TranscribeError, TranscribeRequest,
    TranscriptionBackend, TranscriptionOutput, TranscriptionStage, WhisperClient,
};
pub use queue::{EnqueueError, ProcessingManager, QueueError, QueueEvent};
