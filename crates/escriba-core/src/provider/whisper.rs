//! OpenAI Whisper transcription provider.
//!
//! One blocking multipart POST per job: `model` and `file` fields,
//! `Authorization: Bearer` header, `verbose_json` response so the API also
//! reports duration and detected language. Works against any
//! OpenAI-compatible server via [`WhisperClient::with_api_url`].

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use super::{
    DEFAULT_TIMEOUT_SECS, MAX_FILE_SIZE, TranscribeError, TranscribeRequest,
    TranscriptionBackend, TranscriptionOutput, TranscriptionStage, mime_type_for,
};

const API_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
const MODEL: &str = "whisper-1";

/// How much of an unrecognized API error body to keep in the message.
const MAX_ERROR_LEN: usize = 120;

/// Whisper API transcription provider.
#[derive(Debug, Clone)]
pub struct WhisperClient {
    api_url: String,
}

impl WhisperClient {
    pub fn new() -> Self {
        Self {
            api_url: API_URL.to_string(),
        }
    }

    /// Point the client at a different OpenAI-compatible transcriptions
    /// endpoint (e.g. a self-hosted whisper server).
    pub fn with_api_url(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
        }
    }
}

impl Default for WhisperClient {
    fn default() -> Self {
        Self::new()
    }
}

/// `verbose_json` response shape. `duration`/`language` are absent on
/// plain-text-compatible servers, so both stay optional.
#[derive(Deserialize)]
struct VerboseResponse {
    text: String,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    language: Option<String>,
}

/// Error payload shape used by OpenAI-compatible servers.
#[derive(Deserialize, Default)]
struct ApiErrorBody {
    #[serde(default)]
    error: Option<ApiErrorDetail>,
}

#[derive(Deserialize, Default)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

impl TranscriptionBackend for WhisperClient {
    fn name(&self) -> &'static str {
        "openai-whisper"
    }

    fn transcribe(
        &self,
        api_key: &str,
        request: TranscribeRequest,
    ) -> Result<TranscriptionOutput, TranscribeError> {
        let metadata = std::fs::metadata(&request.path)
            .map_err(|err| TranscribeError::FileRead(err.to_string()))?;
        let size = metadata.len();
        if size > MAX_FILE_SIZE {
            return Err(TranscribeError::FileTooLarge {
                size_mb: size as f64 / (1024.0 * 1024.0),
            });
        }

        let audio = std::fs::read(&request.path)
            .map_err(|err| TranscribeError::FileRead(err.to_string()))?;
        let file_name = request
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());

        request.report(TranscriptionStage::Uploading);

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|err| TranscribeError::NetworkError(err.to_string()))?;

        let part = reqwest::blocking::multipart::Part::bytes(audio)
            .file_name(file_name)
            .mime_str(mime_type_for(&request.path))
            .map_err(|err| TranscribeError::Unknown(err.to_string()))?;
        let mut form = reqwest::blocking::multipart::Form::new()
            .text("model", MODEL.to_string())
            .text("response_format", "verbose_json".to_string())
            .part("file", part);
        if let Some(language) = request.language.clone() {
            form = form.text("language", language);
        }

        request.report(TranscriptionStage::Transcribing);
        debug!(path = %request.path.display(), size, "sending transcription request");

        let response = client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {api_key}"))
            .multipart(form)
            .send()
            .map_err(|err| TranscribeError::NetworkError(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let classified = classify_api_error(status.as_u16(), &body);
            warn!(
                path = %request.path.display(),
                status = status.as_u16(),
                kind = classified.kind(),
                "transcription request rejected"
            );
            return Err(classified);
        }

        let body = response
            .text()
            .map_err(|err| TranscribeError::NetworkError(err.to_string()))?;
        let parsed: VerboseResponse = serde_json::from_str(&body)
            .map_err(|err| TranscribeError::Unknown(format!("unexpected API response: {err}")))?;

        Ok(TranscriptionOutput {
            text: parsed.text,
            duration: parsed.duration,
            language: parsed.language,
        })
    }
}

/// Map an HTTP error status and body onto the closed failure set.
///
/// The body is best-effort JSON; servers under load sometimes return HTML or
/// plain text, so every field access tolerates absence.
fn classify_api_error(status: u16, body: &str) -> TranscribeError {
    let detail = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.error)
        .unwrap_or_default();
    let code = detail.code.as_deref().unwrap_or_default();
    let kind = detail.kind.as_deref().unwrap_or_default();
    let message = if detail.message.is_empty() {
        body.trim()
    } else {
        detail.message.as_str()
    };

    match status {
        401 | 403 => TranscribeError::InvalidApiKey,
        429 => {
            if code == "insufficient_quota" || kind == "insufficient_quota" {
                TranscribeError::InsufficientQuota
            } else {
                TranscribeError::RateLimited
            }
        }
        400 | 415 => {
            let lowered = message.to_lowercase();
            if lowered.contains("format") || lowered.contains("decode") {
                TranscribeError::UnsupportedFormat(truncate(message))
            } else {
                TranscribeError::Unknown(truncate(message))
            }
        }
        _ => TranscribeError::Unknown(truncate(&format!("HTTP {status}: {message}"))),
    }
}

fn truncate(message: &str) -> String {
    if message.len() <= MAX_ERROR_LEN {
        return message.to_string();
    }
    let mut end = MAX_ERROR_LEN;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &message[..end])
}
