//! Bounded-concurrency processing queue.
//!
//! [`ProcessingManager`] owns the job list and a fixed pool of worker
//! threads. Workers share one mutex-guarded FIFO: each claims the first
//! `Pending` job, runs the transcription call, exports the result, and goes
//! back for more. One job's failure never touches its siblings. Stopping is
//! cooperative: pending jobs are cancelled and in-flight calls finish
//! naturally.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use chrono::Utc;
use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::{error, info, warn};

use crate::config::{Config, MAX_WORKERS, MIN_WORKERS};
use crate::export;
use crate::job::{Job, JobFailure, JobId, JobStatus, QueueStats, TranscriptionResult};
use crate::provider::{self, TranscribeRequest, TranscriptionBackend, TranscriptionStage};

/// Rejected queue control operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("processing is already running")]
    AlreadyRunning,
    #[error("the queue is busy; stop processing first")]
    QueueBusy,
    #[error("no API key configured; add one in settings before starting")]
    NoApiKey,
    #[error("no pending files to process")]
    EmptyQueue,
    #[error("job {0} is currently processing and cannot be removed")]
    JobBusy(JobId),
    #[error("no job with id {0}")]
    UnknownJob(JobId),
}

/// Rejected enqueue. Validation is local; nothing here reaches the network.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnqueueError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("not a regular file: {}", .0.display())]
    NotAFile(PathBuf),
    #[error("unsupported file extension: {}", .0.display())]
    UnsupportedExtension(PathBuf),
    #[error("file is already queued: {}", .0.display())]
    Duplicate(PathBuf),
}

/// Notification for the interface layer. Consume via
/// [`ProcessingManager::events`].
#[derive(Debug, Clone)]
pub enum QueueEvent {
    /// A job changed status.
    JobUpdated { id: JobId, status: JobStatus },
    /// An in-flight call advanced a stage.
    JobProgress { id: JobId, stage: TranscriptionStage },
    /// The worker pool drained or was stopped; the queue is idle again.
    RunFinished { stats: QueueStats },
}

struct QueueInner {
    jobs: Mutex<Vec<Job>>,
    config: Mutex<Config>,
    running: AtomicBool,
    stop_requested: AtomicBool,
    next_id: AtomicU64,
    events: Sender<QueueEvent>,
}

impl QueueInner {
    fn send(&self, event: QueueEvent) {
        // Receiver is held by the manager, so this only fails after drop.
        let _ = self.events.send(event);
    }
}

/// Owns the job queue, the worker pool, and the start/stop/clear controls.
///
/// All methods take `&self`; the manager is meant to be shared with the
/// interface layer behind an `Arc`.
pub struct ProcessingManager {
    inner: Arc<QueueInner>,
    backend: Arc<dyn TranscriptionBackend>,
    events_rx: Receiver<QueueEvent>,
    monitor: Mutex<Option<thread::JoinHandle<()>>>,
}

impl ProcessingManager {
    pub fn new(config: Config, backend: Arc<dyn TranscriptionBackend>) -> Self {
        let (events, events_rx) = unbounded();
        Self {
            inner: Arc::new(QueueInner {
                jobs: Mutex::new(Vec::new()),
                config: Mutex::new(config),
                running: AtomicBool::new(false),
                stop_requested: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
                events,
            }),
            backend,
            events_rx,
            monitor: Mutex::new(None),
        }
    }

    /// Status-change notification stream. Events are delivered to one
    /// receiver; keep a single consumer.
    pub fn events(&self) -> Receiver<QueueEvent> {
        self.events_rx.clone()
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> Config {
        self.inner.config.lock().unwrap().clone()
    }

    /// Replace the configuration. Rejected while a run is active so worker
    /// count and output settings cannot change under a live pool.
    pub fn set_config(&self, config: Config) -> Result<(), QueueError> {
        if self.is_running() {
            return Err(QueueError::QueueBusy);
        }
        *self.inner.config.lock().unwrap() = config;
        Ok(())
    }

    /// Validate and append one file as a `Pending` job.
    ///
    /// Paths are canonicalized before the duplicate check, so two spellings
    /// of the same file cannot both be queued.
    pub fn enqueue(&self, path: impl AsRef<Path>) -> Result<JobId, EnqueueError> {
        let original = path.as_ref();
        let path = std::fs::canonicalize(original)
            .map_err(|_| EnqueueError::NotFound(original.to_path_buf()))?;
        let metadata =
            std::fs::metadata(&path).map_err(|_| EnqueueError::NotFound(path.clone()))?;
        if !metadata.is_file() {
            return Err(EnqueueError::NotAFile(path));
        }
        if !provider::is_supported_extension(&path) {
            warn!(path = %path.display(), "rejected file with unsupported extension");
            return Err(EnqueueError::UnsupportedExtension(path));
        }

        let id = {
            let mut jobs = self.inner.jobs.lock().unwrap();
            if jobs.iter().any(|job| job.source_path == path) {
                return Err(EnqueueError::Duplicate(path));
            }
            let id = JobId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
            jobs.push(Job::new(id, path.clone(), metadata.len()));
            id
        };
        info!(%id, path = %path.display(), "file queued");
        self.inner.send(QueueEvent::JobUpdated {
            id,
            status: JobStatus::Pending,
        });
        Ok(id)
    }

    /// Enqueue a batch (multi-select, folder scan, drag-and-drop). Returns
    /// the per-path outcome; failures don't stop the rest.
    pub fn enqueue_all<I, P>(&self, paths: I) -> Vec<(PathBuf, Result<JobId, EnqueueError>)>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        paths
            .into_iter()
            .map(|path| {
                let path = path.as_ref().to_path_buf();
                let outcome = self.enqueue(&path);
                (path, outcome)
            })
            .collect()
    }

    /// Spin up the worker pool over the pending jobs.
    pub fn start(&self) -> Result<(), QueueError> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Err(QueueError::AlreadyRunning);
        }
        match self.spawn_run() {
            Ok(()) => Ok(()),
            Err(err) => {
                self.inner.running.store(false, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    fn spawn_run(&self) -> Result<(), QueueError> {
        let config = Arc::new(self.inner.config.lock().unwrap().clone());
        if config.api_key.trim().is_empty() {
            return Err(QueueError::NoApiKey);
        }
        let pending = self
            .inner
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|job| job.status == JobStatus::Pending)
            .count();
        if pending == 0 {
            return Err(QueueError::EmptyQueue);
        }

        self.inner.stop_requested.store(false, Ordering::SeqCst);
        let worker_count = config.max_workers.clamp(MIN_WORKERS, MAX_WORKERS).min(pending);
        info!(
            workers = worker_count,
            pending,
            backend = self.backend.name(),
            "starting processing run"
        );

        let mut handles = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let inner = Arc::clone(&self.inner);
            let backend = Arc::clone(&self.backend);
            let config = Arc::clone(&config);
            handles.push(thread::spawn(move || worker_loop(&inner, &*backend, &config)));
        }

        // The monitor flips the queue back to idle once every worker exits.
        let inner = Arc::clone(&self.inner);
        let monitor = thread::spawn(move || {
            for handle in handles {
                let _ = handle.join();
            }
            finalize_run(&inner);
        });
        *self.monitor.lock().unwrap() = Some(monitor);
        Ok(())
    }

    /// Cancel every pending job and wait for in-flight calls to settle.
    /// No-op when idle.
    pub fn stop(&self) {
        if !self.is_running() {
            return;
        }
        info!("stop requested; cancelling pending jobs");
        self.inner.stop_requested.store(true, Ordering::SeqCst);
        self.cancel_pending();
        if let Some(monitor) = self.monitor.lock().unwrap().take() {
            let _ = monitor.join();
        }
    }

    fn cancel_pending(&self) {
        let mut cancelled = Vec::new();
        {
            let mut jobs = self.inner.jobs.lock().unwrap();
            for job in jobs.iter_mut().filter(|job| job.status == JobStatus::Pending) {
                job.status = JobStatus::Cancelled;
                job.finished_at = Some(Utc::now());
                cancelled.push(job.id);
            }
        }
        for id in cancelled {
            self.inner.send(QueueEvent::JobUpdated {
                id,
                status: JobStatus::Cancelled,
            });
        }
    }

    /// Remove one job, unless a worker currently owns it.
    pub fn remove(&self, id: JobId) -> Result<(), QueueError> {
        let mut jobs = self.inner.jobs.lock().unwrap();
        let index = jobs
            .iter()
            .position(|job| job.id == id)
            .ok_or(QueueError::UnknownJob(id))?;
        if jobs[index].status == JobStatus::Processing {
            return Err(QueueError::JobBusy(id));
        }
        jobs.remove(index);
        Ok(())
    }

    /// Drop every job in a terminal state. No-op when there are none.
    pub fn clear_completed(&self) {
        let mut jobs = self.inner.jobs.lock().unwrap();
        let before = jobs.len();
        jobs.retain(|job| !job.status.is_terminal());
        let removed = before - jobs.len();
        if removed > 0 {
            info!(removed, "cleared finished jobs");
        }
    }

    /// Empty the queue unconditionally. Rejected while running.
    pub fn clear_all(&self) -> Result<(), QueueError> {
        if self.is_running() {
            return Err(QueueError::QueueBusy);
        }
        self.inner.jobs.lock().unwrap().clear();
        Ok(())
    }

    /// Snapshot of the queue in enqueue order, for rendering.
    pub fn jobs(&self) -> Vec<Job> {
        self.inner.jobs.lock().unwrap().clone()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats::from_jobs(&self.inner.jobs.lock().unwrap())
    }
}

/// Claim-process loop for one worker thread.
fn worker_loop(inner: &Arc<QueueInner>, backend: &dyn TranscriptionBackend, config: &Config) {
    while !inner.stop_requested.load(Ordering::SeqCst) {
        let Some((id, path)) = claim_next(inner) else {
            break;
        };
        process_job(inner, backend, config, id, path);
    }
}

/// Mark the first pending job `Processing` and hand it to the caller.
/// This is the single dispatch point, so FIFO order and the worker-count
/// bound both fall out of it.
fn claim_next(inner: &Arc<QueueInner>) -> Option<(JobId, PathBuf)> {
    let claimed = {
        let mut jobs = inner.jobs.lock().unwrap();
        let job = jobs.iter_mut().find(|job| job.status == JobStatus::Pending)?;
        job.status = JobStatus::Processing;
        job.started_at = Some(Utc::now());
        (job.id, job.source_path.clone())
    };
    inner.send(QueueEvent::JobUpdated {
        id: claimed.0,
        status: JobStatus::Processing,
    });
    Some(claimed)
}

fn process_job(
    inner: &Arc<QueueInner>,
    backend: &dyn TranscriptionBackend,
    config: &Config,
    id: JobId,
    path: PathBuf,
) {
    let events = inner.events.clone();
    let request = TranscribeRequest {
        path: path.clone(),
        language: config.language_hint().map(str::to_owned),
        progress: Some(Box::new(move |stage| {
            let _ = events.send(QueueEvent::JobProgress { id, stage });
        })),
    };

    match backend.transcribe(&config.api_key, request) {
        Ok(output) => {
            let result = TranscriptionResult {
                source_file: path.clone(),
                transcription: output.text,
                timestamp: Utc::now(),
                duration: output.duration.unwrap_or(0.0),
                language: output.language,
            };
            match export::write_transcript(&result, config) {
                Ok(output_path) => {
                    info!(%id, path = %path.display(), "job complete");
                    settle_job(inner, id, |job| {
                        job.status = JobStatus::Complete;
                        job.result = Some(result);
                        job.output_path = Some(output_path);
                    });
                }
                Err(err) => {
                    // Transcription succeeded but the transcript could not
                    // be written; the job still fails, distinguishably.
                    error!(%id, path = %path.display(), %err, "export failed");
                    settle_job(inner, id, |job| {
                        job.status = JobStatus::Error;
                        job.failure = Some(JobFailure::Export(err));
                    });
                }
            }
        }
        Err(err) => {
            error!(
                %id,
                path = %path.display(),
                kind = err.kind(),
                %err,
                "transcription failed"
            );
            settle_job(inner, id, |job| {
                job.status = JobStatus::Error;
                job.failure = Some(JobFailure::Transcribe(err));
            });
        }
    }
}

/// Apply a terminal transition under the queue lock and notify.
fn settle_job(inner: &Arc<QueueInner>, id: JobId, apply: impl FnOnce(&mut Job)) {
    let status = {
        let mut jobs = inner.jobs.lock().unwrap();
        let Some(job) = jobs.iter_mut().find(|job| job.id == id) else {
            return;
        };
        apply(job);
        job.finished_at = Some(Utc::now());
        job.status
    };
    inner.send(QueueEvent::JobUpdated { id, status });
}

fn finalize_run(inner: &Arc<QueueInner>) {
    inner.running.store(false, Ordering::SeqCst);
    let stats = QueueStats::from_jobs(&inner.jobs.lock().unwrap());
    info!(
        completed = stats.completed,
        errors = stats.errors,
        cancelled = stats.cancelled,
        "processing run finished"
    );
    inner.send(QueueEvent::RunFinished { stats });
}
