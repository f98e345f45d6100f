//! Chat history persistence
//!
//! The relay never waits on persistence. Records are handed to a
//! [`HistoryRecorder`], which queues them and writes them to a
//! [`HistorySink`] from a background task.

mod recorder;
mod sink;

pub use recorder::HistoryRecorder;
pub use sink::JsonlHistorySink;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One persisted chat line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Identity of the sender
    pub sender: String,

    /// Message text (lossy UTF-8)
    pub body: String,

    /// When the relay received the message
    pub timestamp: DateTime<Utc>,
}

impl HistoryRecord {
    pub fn new(sender: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            body: body.into(),
            timestamp: Utc::now(),
        }
    }
}

/// History-specific errors
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("History I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize history record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("History sink unavailable after {attempts} attempts: {reason}")]
    Unavailable { attempts: u32, reason: String },
}

/// Append-only destination for chat history
#[async_trait]
pub trait HistorySink: Send + Sync {
    async fn record(&self, record: &HistoryRecord) -> Result<(), HistoryError>;
}
