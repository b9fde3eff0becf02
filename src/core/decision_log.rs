//! Append-only decision log with file-based persistence.
//!
//! Decisions are stored as newline-delimited JSON (JSONL), one event per
//! line. Several reviewers may share a log, so appends take an exclusive
//! lock on the file.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::domain::{Attribution, DecisionEvent};

/// Errors reading or writing the decision log
#[derive(Debug, Error)]
pub enum DecisionLogError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse decision at line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize decision: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// File-based decision log using JSONL format
#[derive(Debug, Clone)]
pub struct DecisionLog {
    path: PathBuf,
}

impl DecisionLog {
    /// Open a log at `path`; the file is created on first append
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a decision with file locking
    pub async fn append(&self, event: &DecisionEvent) -> Result<(), DecisionLogError> {
        let json = serde_json::to_string(event)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || append_line(&path, &json)).await??;

        debug!(
            "Logged decision {} on {}/{}",
            event.id, event.record_id, event.label_idx
        );
        Ok(())
    }

    /// Replay all decisions in order; a missing log is empty
    pub async fn replay(&self) -> Result<Vec<DecisionEvent>, DecisionLogError> {
        let file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };

        let mut lines = BufReader::new(file).lines();
        let mut events = Vec::new();
        let mut line_no = 0;

        while let Some(line) = lines.next_line().await.map_err(|e| self.io_error(e))? {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let event: DecisionEvent = serde_json::from_str(&line)
                .map_err(|source| DecisionLogError::Parse { line: line_no, source })?;
            events.push(event);
        }

        Ok(events)
    }

    /// Current author of every live decision
    pub async fn attribution(&self) -> Result<Attribution, DecisionLogError> {
        Ok(Attribution::from_events(&self.replay().await?))
    }

    /// All decisions touching one record
    pub async fn for_record(&self, record_id: &str) -> Result<Vec<DecisionEvent>, DecisionLogError> {
        let events = self.replay().await?;
        Ok(events
            .into_iter()
            .filter(|e| e.record_id == record_id)
            .collect())
    }

    fn io_error(&self, source: std::io::Error) -> DecisionLogError {
        DecisionLogError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

fn append_line(path: &Path, json: &str) -> Result<(), DecisionLogError> {
    let io_error = |source| DecisionLogError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_error)?;

    file.lock_exclusive().map_err(io_error)?;
    writeln!(file, "{}", json).map_err(io_error)?;
    file.flush().map_err(io_error)?;

    // Lock is released when file is dropped
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Evaluation;
    use tempfile::TempDir;

    fn create_test_log() -> (DecisionLog, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let log = DecisionLog::open(temp_dir.path().join("decisions.jsonl"));
        (log, temp_dir)
    }

    #[tokio::test]
    async fn test_append_and_replay() {
        let (log, _temp) = create_test_log();

        log.append(&DecisionEvent::new("r1", "B2_2", Some(Evaluation::Yes), "ana"))
            .await
            .unwrap();
        log.append(&DecisionEvent::new("r1", "C3_3", Some(Evaluation::No), "ben"))
            .await
            .unwrap();

        let events = log.replay().await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].evaluator, "ana");
        assert_eq!(events[1].result, Some(Evaluation::No));
    }

    #[tokio::test]
    async fn test_missing_log_is_empty() {
        let (log, _temp) = create_test_log();
        assert!(log.replay().await.unwrap().is_empty());
        assert!(log.attribution().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_attribution_follows_latest() {
        let (log, _temp) = create_test_log();

        log.append(&DecisionEvent::new("r1", "B2_2", Some(Evaluation::Yes), "ana"))
            .await
            .unwrap();
        log.append(&DecisionEvent::new("r1", "B2_2", Some(Evaluation::No), "ben"))
            .await
            .unwrap();
        log.append(&DecisionEvent::new("r2", "D4_4", Some(Evaluation::Yes), "ana"))
            .await
            .unwrap();
        log.append(&DecisionEvent::new("r2", "D4_4", None, "ben"))
            .await
            .unwrap();

        let attribution = log.attribution().await.unwrap();
        assert_eq!(attribution.author_of("r1", "B2_2"), Some("ben"));
        assert_eq!(attribution.author_of("r2", "D4_4"), None);

        assert_eq!(log.for_record("r2").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_blank_lines_skipped_and_bad_lines_reported() {
        let (log, _temp) = create_test_log();
        let event = DecisionEvent::new("r1", "B2_2", Some(Evaluation::Unsure), "ana");
        let line = serde_json::to_string(&event).unwrap();
        std::fs::write(log.path(), format!("{}\n\n", line)).unwrap();
        assert_eq!(log.replay().await.unwrap().len(), 1);

        std::fs::write(log.path(), format!("{}\nnot json\n", line)).unwrap();
        let err = log.replay().await.unwrap_err();
        assert!(matches!(err, DecisionLogError::Parse { line: 2, .. }));
    }
}
