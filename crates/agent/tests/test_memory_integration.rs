//! Conversation persistence through FileMemory

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::{scripted, tool_call};
use quill_agent::tools::QueryChatTool;
use quill_agent::{Conversation, ToolRegistry};
use quill_memory::{FileMemory, Memory, MemoryError, SummaryCheck};
use quill_provider::{ChatResponse, Message, Role, ToolCall};
use tempfile::TempDir;

fn registry() -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    tools.register(QueryChatTool);
    tools
}

#[tokio::test]
async fn test_every_message_is_persisted() {
    let dir = TempDir::new().unwrap();
    let memory = Arc::new(FileMemory::new(dir.path(), 20));

    let provider = scripted(vec![
        Ok(tool_call("call_1", "query_chat", r#"{"query": "look this up"}"#)),
        Ok(ChatResponse::text("Found it")),
    ]);
    let mut convo = Conversation::new(Arc::new(provider), registry(), "gpt-4o")
        .with_memory(memory.clone())
        .with_session_id("story-1");

    convo.submit("look this up").await;

    let stored = memory.load("story-1").await.unwrap();
    let roles: Vec<Role> = stored.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]
    );
    assert_eq!(stored[3].text(), "Found it");
}

#[tokio::test]
async fn test_restore_continues_stored_session() {
    let dir = TempDir::new().unwrap();

    {
        let memory = Arc::new(FileMemory::new(dir.path(), 20));
        let provider = scripted(vec![Ok(ChatResponse::text("hi"))]);
        let mut convo = Conversation::new(Arc::new(provider), registry(), "gpt-4o")
            .with_memory(memory)
            .with_session_id("resume");
        convo.submit("hello").await;
    }

    let memory = Arc::new(FileMemory::new(dir.path(), 20));
    let mut mock = common::MockProvider::new();
    mock.expect_chat()
        .times(1)
        .withf(|params| {
            params.messages.len() == 4
                && params.messages[1].text() == "hello"
                && params.messages[2].text() == "hi"
        })
        .returning(|_| Ok(ChatResponse::text("welcome back")));

    let mut convo = Conversation::new(Arc::new(mock), registry(), "gpt-4o")
        .with_memory(memory)
        .with_session_id("resume");

    assert_eq!(convo.restore().await.unwrap(), 2);
    assert_eq!(convo.history()[0].role, Role::System);
    assert_eq!(convo.submit("again").await, "welcome back");
}

#[tokio::test]
async fn test_restore_drops_unfinished_tool_exchange() {
    let dir = TempDir::new().unwrap();
    let memory = Arc::new(FileMemory::new(dir.path(), 20));

    let calls = vec![ToolCall::new("a", "query_chat", r#"{"query": "x"}"#)];
    memory.append("cut", &Message::user("hello")).await.unwrap();
    memory.append("cut", &Message::assistant("hi")).await.unwrap();
    memory.append("cut", &Message::user("look")).await.unwrap();
    memory
        .append("cut", &Message::assistant_with_tool_calls(None, &calls))
        .await
        .unwrap();

    let mut convo = Conversation::new(Arc::new(common::MockProvider::new()), registry(), "gpt-4o")
        .with_memory(memory)
        .with_session_id("cut");

    assert_eq!(convo.restore().await.unwrap(), 3);
    assert_eq!(convo.history().last().map(|m| m.text()), Some("look"));
}

struct BrokenMemory;

#[async_trait]
impl Memory for BrokenMemory {
    async fn load(&self, _session_id: &str) -> Result<Vec<Message>, MemoryError> {
        Err(std::io::Error::new(std::io::ErrorKind::Other, "disk gone").into())
    }

    async fn append(&self, _session_id: &str, _message: &Message) -> Result<(), MemoryError> {
        Err(std::io::Error::new(std::io::ErrorKind::Other, "disk gone").into())
    }

    async fn maybe_summarize(&self, _session_id: &str) -> Result<SummaryCheck, MemoryError> {
        Err(std::io::Error::new(std::io::ErrorKind::Other, "disk gone").into())
    }
}

#[tokio::test]
async fn test_memory_failures_do_not_affect_reply() {
    let provider = scripted(vec![Ok(ChatResponse::text("still here"))]);
    let mut convo = Conversation::new(Arc::new(provider), registry(), "gpt-4o")
        .with_memory(Arc::new(BrokenMemory));

    assert_eq!(convo.submit("hello").await, "still here");
    assert_eq!(convo.history().len(), 3);
    assert!(convo.restore().await.is_err());
}

#[tokio::test]
async fn test_summary_threshold_reached_after_turns() {
    let dir = TempDir::new().unwrap();
    let memory = Arc::new(FileMemory::new(dir.path(), 4));

    let provider = scripted(vec![
        Ok(ChatResponse::text("one")),
        Ok(ChatResponse::text("two")),
    ]);
    let mut convo = Conversation::new(Arc::new(provider), registry(), "gpt-4o")
        .with_memory(memory.clone())
        .with_session_id("long");

    convo.submit("first").await;
    assert!(!memory.maybe_summarize("long").await.unwrap().is_due());

    convo.submit("second").await;
    assert_eq!(
        memory.maybe_summarize("long").await.unwrap(),
        SummaryCheck::ThresholdReached {
            messages: 4,
            threshold: 4
        }
    );
}

#[tokio::test]
async fn test_restore_twice_does_not_duplicate_history() {
    let dir = TempDir::new().unwrap();
    let memory = Arc::new(FileMemory::new(dir.path(), 20));
    memory.append("twice", &Message::user("hello")).await.unwrap();
    memory.append("twice", &Message::assistant("hi")).await.unwrap();

    let mut convo = Conversation::new(Arc::new(common::MockProvider::new()), registry(), "gpt-4o")
        .with_memory(memory)
        .with_session_id("twice");

    assert_eq!(convo.restore().await.unwrap(), 2);
    assert_eq!(convo.restore().await.unwrap(), 0);
    assert_eq!(convo.history().len(), 3);
}
