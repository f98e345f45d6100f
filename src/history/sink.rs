//! JSON-lines history file

use super::{HistoryError, HistoryRecord, HistorySink};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Appends each record as one JSON object per line
pub struct JsonlHistorySink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlHistorySink {
    /// Open (or create) the history file for appending
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, HistoryError> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        tracing::info!("History file opened: {:?}", path);

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Open the history file, retrying a fixed number of times
    pub async fn open_with_retry(
        path: impl Into<PathBuf>,
        attempts: u32,
        delay: Duration,
    ) -> Result<Self, HistoryError> {
        let path = path.into();
        let attempts = attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match Self::open(&path).await {
                Ok(sink) => return Ok(sink),
                Err(e) => {
                    tracing::warn!(
                        "Could not open history file {:?} (attempt {}/{}): {}",
                        path,
                        attempt,
                        attempts,
                        e
                    );
                    last_error = e.to_string();
                }
            }

            if attempt < attempts {
                tokio::time::sleep(delay).await;
            }
        }

        Err(HistoryError::Unavailable {
            attempts,
            reason: last_error,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl HistorySink for JsonlHistorySink {
    async fn record(&self, record: &HistoryRecord) -> Result<(), HistoryError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}
