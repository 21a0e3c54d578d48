//! Transcription provider boundary.
//!
//! [`TranscriptionBackend`] is the seam between the queue and the remote
//! service: the queue hands it a file and gets back text or a classified
//! [`TranscribeError`]. Classification happens once, here; callers never see
//! the remote error vocabulary.

mod whisper;

pub use whisper::WhisperClient;

use std::path::{Path, PathBuf};

/// Upper bound the transcription API accepts for a single upload.
pub const MAX_FILE_SIZE: u64 = 25 * 1024 * 1024;

/// Request timeout for one transcription call. Long uploads on slow links
/// are the norm, so this errs high.
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// File extensions accepted for enqueue. The first block is what the API
/// documents; the rest are container/codec variants it accepts in practice.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "mp3", "mp4", "mpeg", "mpga", "m4a", "wav", "webm", "ogg", "flac",
    "oga", "opus", "aac", "wma", "aiff", "aif", "amr", "3gp", "3gpp",
];

/// Whether the path has an extension the transcription service accepts.
pub fn is_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

/// MIME type for the multipart upload, from the file extension.
pub(crate) fn mime_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp3" | "mpeg" | "mpga" => "audio/mpeg",
        "mp4" | "m4a" => "audio/mp4",
        "wav" => "audio/wav",
        "webm" => "audio/webm",
        "ogg" | "oga" | "opus" => "audio/ogg",
        "flac" => "audio/flac",
        "aac" => "audio/aac",
        "wma" => "audio/x-ms-wma",
        "aiff" | "aif" => "audio/aiff",
        "amr" => "audio/amr",
        "3gp" | "3gpp" => "audio/3gpp",
        _ => "application/octet-stream",
    }
}

/// Phase of an in-flight transcription call, reported to the interface layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptionStage {
    Uploading,
    Transcribing,
}

/// One outbound transcription call.
pub struct TranscribeRequest {
    pub path: PathBuf,
    /// Language hint for the API; `None` means auto-detect.
    pub language: Option<String>,
    /// Stage callback, invoked as the call advances.
    pub progress: Option<Box<dyn Fn(TranscriptionStage) + Send + Sync>>,
}

impl TranscribeRequest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            language: None,
            progress: None,
        }
    }

    pub(crate) fn report(&self, stage: TranscriptionStage) {
        if let Some(progress) = &self.progress {
            progress(stage);
        }
    }
}

impl std::fmt::Debug for TranscribeRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscribeRequest")
            .field("path", &self.path)
            .field("language", &self.language)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// What a successful call returns, before the queue stamps it into a
/// [`crate::TranscriptionResult`].
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionOutput {
    pub text: String,
    /// Audio duration in seconds, when the API reports it.
    pub duration: Option<f64>,
    /// Detected language, when the API reports it.
    pub language: Option<String>,
}

/// Classified transcription failure. The closed set every caller sees;
/// messages are written for direct display in the interface.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TranscribeError {
    /// Caught locally, before any network call.
    #[error("file is {size_mb:.1} MB; the transcription API accepts at most 25 MB")]
    FileTooLarge { size_mb: f64 },
    /// The file disappeared or became unreadable after enqueue.
    #[error("could not read audio file: {0}")]
    FileRead(String),
    #[error("invalid API key; check the key in settings")]
    InvalidApiKey,
    #[error("rate limited; wait a moment before starting again")]
    RateLimited,
    #[error("insufficient quota; check your OpenAI plan and billing")]
    InsufficientQuota,
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("audio format rejected by the API: {0}")]
    UnsupportedFormat(String),
    #[error("transcription failed: {0}")]
    Unknown(String),
}

impl TranscribeError {
    /// Short kind label for logging and status rows.
    pub fn kind(&self) -> &'static str {
        match self {
            TranscribeError::FileTooLarge { .. } => "file-too-large",
            TranscribeError::FileRead(_) => "file-read",
            TranscribeError::InvalidApiKey => "invalid-api-key",
            TranscribeError::RateLimited => "rate-limited",
            TranscribeError::InsufficientQuota => "insufficient-quota",
            TranscribeError::NetworkError(_) => "network",
            TranscribeError::UnsupportedFormat(_) => "unsupported-format",
            TranscribeError::Unknown(_) => "unknown",
        }
    }
}

/// A transcription service the queue can dispatch jobs to.
pub trait TranscriptionBackend: Send + Sync {
    /// Short identifier for logging.
    fn name(&self) -> &'static str;

    /// Perform one transcription call. Reads the file, nothing else; the
    /// size precondition is checked before any bytes go on the wire.
    fn transcribe(
        &self,
        api_key: &str,
        request: TranscribeRequest,
    ) -> Result<TranscriptionOutput, TranscribeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_extension_is_case_insensitive() {
        assert!(is_supported_extension(Path::new("/audio/take1.MP3")));
        assert!(is_supported_extension(Path::new("/audio/take1.flac")));
        assert!(!is_supported_extension(Path::new("/audio/notes.txt")));
        assert!(!is_supported_extension(Path::new("/audio/noext")));
    }

    #[test]
    fn test_mime_type_mapping() {
        assert_eq!(mime_type_for(Path::new("a.mp3")), "audio/mpeg");
        assert_eq!(mime_type_for(Path::new("a.m4a")), "audio/mp4");
        assert_eq!(mime_type_for(Path::new("a.opus")), "audio/ogg");
        assert_eq!(mime_type_for(Path::new("a.xyz")), "application/octet-stream");
    }

    #[test]
    fn test_error_kind_labels() {
        assert_eq!(TranscribeError::InvalidApiKey.kind(), "invalid-api-key");
        assert_eq!(
            TranscribeError::FileTooLarge { size_mb: 30.0 }.kind(),
            "file-too-large"
        );
    }
}
