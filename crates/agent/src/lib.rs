//! Agent core
//!
//! Tool registry and the conversation loop that drives a user query to a
//! final answer.

use thiserror::Error;

pub mod conversation;
pub mod prompt;
pub mod tools;

pub use conversation::{Conversation, TurnOutcome, TurnStatus};
pub use tools::{register_default_tools, ToolError, ToolRegistry, ToolTrait};

/// Why a turn stopped before the model produced a final answer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    #[error("Error processing query: {0}")]
    ModelCallFailed(String),

    #[error("maximum of {0} tool iterations reached")]
    MaxIterationsReached(u32),
}

/// Agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Aborted(#[from] AbortReason),

    #[error("memory error: {0}")]
    Memory(#[from] quill_memory::MemoryError),
}

pub type Result<T> = std::result::Result<T, AgentError>;
