//! Transcript export.
//!
//! Writes one output file per completed job: plain text, or the full
//! [`TranscriptionResult`] document as JSON. Never overwrites; name
//! collisions get a numeric suffix.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::{Config, OutputFormat};
use crate::job::TranscriptionResult;

/// Folder created beside the source file when no output directory is
/// configured.
const DEFAULT_OUTPUT_FOLDER: &str = "Transcripciones";

/// Export failure. Kept cloneable (messages, not sources) so it can be
/// attached to a job and handed to the interface layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExportError {
    #[error("failed to create output directory {}: {}", .path.display(), .message)]
    CreateDir { path: PathBuf, message: String },
    #[error("failed to write transcript to {}: {}", .path.display(), .message)]
    Write { path: PathBuf, message: String },
}

/// Write the transcript for one finished job. Returns the output path.
pub fn write_transcript(
    result: &TranscriptionResult,
    config: &Config,
) -> Result<PathBuf, ExportError> {
    let dir = output_dir(&result.source_file, config);
    std::fs::create_dir_all(&dir).map_err(|err| ExportError::CreateDir {
        path: dir.clone(),
        message: err.to_string(),
    })?;

    let base = result
        .source_file
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "transcript".to_string());
    let path = available_path(&dir, &base, config.output_format.extension());

    let contents = match config.output_format {
        OutputFormat::Txt => result.transcription.clone(),
        OutputFormat::Json => {
            serde_json::to_string_pretty(result).map_err(|err| ExportError::Write {
                path: path.clone(),
                message: err.to_string(),
            })?
        }
    };
    std::fs::write(&path, contents).map_err(|err| ExportError::Write {
        path: path.clone(),
        message: err.to_string(),
    })?;

    info!(path = %path.display(), "transcript saved");
    Ok(path)
}

fn output_dir(source: &Path, config: &Config) -> PathBuf {
    match &config.output_dir {
        Some(dir) if !dir.as_os_str().is_empty() => dir.clone(),
        _ => source
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(DEFAULT_OUTPUT_FOLDER),
    }
}

/// First free `<base>_transcript[_N].<ext>` path in `dir`.
fn available_path(dir: &Path, base: &str, extension: &str) -> PathBuf {
    let mut path = dir.join(format!("{base}_transcript.{extension}"));
    let mut counter = 1;
    while path.exists() {
        path = dir.join(format!("{base}_transcript_{counter}.{extension}"));
        counter += 1;
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use chrono::Utc;

    fn result_for(source: &Path) -> TranscriptionResult {
        TranscriptionResult {
            source_file: source.to_path_buf(),
            transcription: "buenos días".to_string(),
            timestamp: Utc::now(),
            duration: 3.25,
            language: Some("es".to_string()),
        }
    }

    #[test]
    fn test_txt_export_writes_plain_text() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("meeting.mp3");
        let config = Config {
            output_dir: Some(dir.path().join("out")),
            ..Config::default()
        };

        let path = write_transcript(&result_for(&source), &config)?;
        assert_eq!(path, dir.path().join("out").join("meeting_transcript.txt"));
        assert_eq!(std::fs::read_to_string(&path)?, "buenos días");
        Ok(())
    }

    #[test]
    fn test_json_export_round_trips() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("meeting.mp3");
        let config = Config {
            output_dir: Some(dir.path().to_path_buf()),
            output_format: OutputFormat::Json,
            ..Config::default()
        };

        let result = result_for(&source);
        let path = write_transcript(&result, &config)?;
        let read_back: TranscriptionResult =
            serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        assert_eq!(read_back.source_file, result.source_file);
        assert_eq!(read_back.transcription, result.transcription);
        assert_eq!(read_back.duration, result.duration);
        Ok(())
    }

    #[test]
    fn test_default_folder_beside_source() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("audio").join("note.wav");
        std::fs::create_dir_all(source.parent().unwrap())?;

        let path = write_transcript(&result_for(&source), &Config::default())?;
        assert_eq!(
            path,
            dir.path()
                .join("audio")
                .join(DEFAULT_OUTPUT_FOLDER)
                .join("note_transcript.txt")
        );
        Ok(())
    }

    #[test]
    fn test_collision_gets_numeric_suffix() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("take.mp3");
        let config = Config {
            output_dir: Some(dir.path().to_path_buf()),
            ..Config::default()
        };

        let first = write_transcript(&result_for(&source), &config)?;
        let second = write_transcript(&result_for(&source), &config)?;
        let third = write_transcript(&result_for(&source), &config)?;
        assert_eq!(first, dir.path().join("take_transcript.txt"));
        assert_eq!(second, dir.path().join("take_transcript_1.txt"));
        assert_eq!(third, dir.path().join("take_transcript_2.txt"));
        Ok(())
    }

    #[test]
    fn test_unwritable_destination_fails() {
        let config = Config {
            output_dir: Some(PathBuf::from("/proc/escriba-no-write")),
            ..Config::default()
        };
        let source = PathBuf::from("/tmp/a.mp3");
        let err = write_transcript(&result_for(&source), &config).unwrap_err();
        assert!(matches!(err, ExportError::CreateDir { .. }));
    }
}
