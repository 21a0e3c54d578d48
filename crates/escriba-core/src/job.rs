//! Job model for the transcription queue.
//!
//! A [`Job`] tracks one queued audio file from enqueue to a terminal state.
//! Jobs are owned by the queue and handed out to the interface layer as
//! snapshots; all mutation happens inside the queue's locked update path.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::export::ExportError;
use crate::provider::TranscribeError;

/// Identifier assigned to a job when it is enqueued. Unique per queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub(crate) u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a queued file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Complete,
    Error,
    Cancelled,
}

impl JobStatus {
    /// Whether no further transition can occur without a re-enqueue.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Complete | JobStatus::Error | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Complete => "complete",
            JobStatus::Error => "error",
            JobStatus::Cancelled => "cancelled",
        };
        write!(f, "{label}")
    }
}

/// Why a job ended in [`JobStatus::Error`].
///
/// Transcription and export failures stay distinguishable: an export failure
/// means the remote call succeeded but the transcript could not be written.
#[derive(Debug, Clone, PartialEq)]
pub enum JobFailure {
    Transcribe(TranscribeError),
    Export(ExportError),
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobFailure::Transcribe(err) => write!(f, "{err}"),
            JobFailure::Export(err) => write!(f, "{err}"),
        }
    }
}

/// The finished transcript and its metadata, as written by the JSON exporter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub source_file: PathBuf,
    pub transcription: String,
    /// When the transcription finished, ISO-8601.
    pub timestamp: DateTime<Utc>,
    /// Audio duration in seconds, as reported by the API.
    pub duration: f64,
    /// Detected language, when the API reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// One queued audio file and its transcription lifecycle state.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    /// Canonicalized absolute path; duplicates are detected against this.
    pub source_path: PathBuf,
    /// File name captured at enqueue, for display.
    pub file_name: String,
    /// File size in bytes captured at enqueue, for display.
    pub file_size: u64,
    pub status: JobStatus,
    pub result: Option<TranscriptionResult>,
    pub failure: Option<JobFailure>,
    /// Where the transcript was written, once complete.
    pub output_path: Option<PathBuf>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub(crate) fn new(id: JobId, source_path: PathBuf, file_size: u64) -> Self {
        let file_name = source_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            id,
            source_path,
            file_name,
            file_size,
            status: JobStatus::Pending,
            result: None,
            failure: None,
            output_path: None,
            started_at: None,
            finished_at: None,
        }
    }
}

/// Per-status counts, for the interface layer's summary line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub errors: usize,
    pub cancelled: usize,
}

impl QueueStats {
    pub(crate) fn from_jobs(jobs: &[Job]) -> Self {
        let mut stats = QueueStats {
            total: jobs.len(),
            ..QueueStats::default()
        };
        for job in jobs {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Complete => stats.completed += 1,
                JobStatus::Error => stats.errors += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Complete.is_terminal());
        assert!(JobStatus::Error.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_result_json_round_trip() {
        let result = TranscriptionResult {
            source_file: PathBuf::from("/audio/interview.mp3"),
            transcription: "hola mundo".to_string(),
            timestamp: Utc::now(),
            duration: 12.5,
            language: Some("es".to_string()),
        };
        let json = serde_json::to_string(&result).unwrap();
        let parsed: TranscriptionResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.source_file, result.source_file);
        assert_eq!(parsed.transcription, result.transcription);
        assert_eq!(parsed.duration, result.duration);
        assert_eq!(parsed.language, result.language);
    }

    #[test]
    fn test_result_json_omits_unknown_language() {
        let result = TranscriptionResult {
            source_file: PathBuf::from("/audio/a.wav"),
            transcription: String::new(),
            timestamp: Utc::now(),
            duration: 0.0,
            language: None,
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(!json.contains("language"));
    }

    #[test]
    fn test_stats_counts_by_status() {
        let mut jobs = vec![
            Job::new(JobId(1), PathBuf::from("/a.mp3"), 10),
            Job::new(JobId(2), PathBuf::from("/b.mp3"), 10),
            Job::new(JobId(3), PathBuf::from("/c.mp3"), 10),
        ];
        jobs[1].status = JobStatus::Complete;
        jobs[2].status = JobStatus::Error;

        let stats = QueueStats::from_jobs(&jobs);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.processing, 0);
        assert_eq!(stats.cancelled, 0);
    }
}
