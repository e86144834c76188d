//! Conversation memory
//!
//! A `Memory` stores the transcript of a session and reports when it has
//! grown past the summarization threshold. The conversation loop only talks
//! to the trait, so it behaves the same whether or not anything is stored.

use async_trait::async_trait;
use thiserror::Error;

use quill_provider::Message;

pub mod file;

pub use file::{FileMemory, StoredMessage, Transcript};

#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("memory I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("memory serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MemoryError>;

/// Result of checking a transcript against the summarization threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryCheck {
    NotNeeded { messages: usize },
    ThresholdReached { messages: usize, threshold: usize },
}

impl SummaryCheck {
    /// A threshold of zero disables the check
    pub fn evaluate(messages: usize, threshold: usize) -> Self {
        if threshold > 0 && messages >= threshold {
            SummaryCheck::ThresholdReached {
                messages,
                threshold,
            }
        } else {
            SummaryCheck::NotNeeded { messages }
        }
    }

    pub fn is_due(&self) -> bool {
        matches!(self, SummaryCheck::ThresholdReached { .. })
    }
}

/// Persistence collaborator for a conversation
#[async_trait]
pub trait Memory: Send + Sync {
    /// Stored transcript for a session, oldest first
    async fn load(&self, session_id: &str) -> Result<Vec<Message>>;

    /// Record one message at the end of a session's transcript
    async fn append(&self, session_id: &str, message: &Message) -> Result<()>;

    /// Check whether the transcript is due for summarization
    async fn maybe_summarize(&self, session_id: &str) -> Result<SummaryCheck>;
}

/// Memory that keeps nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMemory;

#[async_trait]
impl Memory for NoopMemory {
    async fn load(&self, _session_id: &str) -> Result<Vec<Message>> {
        Ok(Vec::new())
    }

    async fn append(&self, _session_id: &str, _message: &Message) -> Result<()> {
        Ok(())
    }

    async fn maybe_summarize(&self, _session_id: &str) -> Result<SummaryCheck> {
        Ok(SummaryCheck::NotNeeded { messages: 0 })
    }
}
