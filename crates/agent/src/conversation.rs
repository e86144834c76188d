//! Conversation loop
//!
//! A `Conversation` owns one session's transcript. Each `submit` appends the
//! user message, then alternates model calls and tool dispatch until the
//! model answers without tool calls or the iteration cap is hit.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use quill_config::Config;
use quill_memory::{FileMemory, Memory, NoopMemory};
use quill_provider::{ChatParams, ChatResponse, Message, Provider, Role, ToolCall, ToolChoice};

use crate::prompt;
use crate::tools::{register_default_tools, ToolRegistry};
use crate::{AbortReason, Result};

/// Reply used when the model answers with no text
pub const EMPTY_RESPONSE: &str = "The model returned an empty response.";

const NO_PARTIAL_ANSWER: &str = "nothing conclusive yet.";

/// How a turn ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnStatus {
    Completed,
    Aborted(AbortReason),
}

/// Result of one `submit_turn`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// Text returned to the user, never empty
    pub reply: String,
    pub status: TurnStatus,
    /// Tool-dispatch rounds completed during the turn
    pub iterations: u32,
}

impl TurnOutcome {
    pub fn is_completed(&self) -> bool {
        self.status == TurnStatus::Completed
    }
}

enum LoopState {
    AwaitingModel,
    DispatchingTools(Vec<ToolCall>),
    Done(String),
    Aborted(AbortReason),
}

pub struct Conversation {
    provider: Arc<dyn Provider>,
    tools: ToolRegistry,
    memory: Arc<dyn Memory>,
    session_id: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    max_iterations: u32,
    messages: Vec<Message>,
    restored: bool,
}

impl Conversation {
    /// Create a conversation with the built-in system prompt, no memory and
    /// the default iteration cap
    pub fn new(provider: Arc<dyn Provider>, tools: ToolRegistry, model: impl Into<String>) -> Self {
        let defaults = Config::default();
        Self {
            provider,
            tools,
            memory: Arc::new(NoopMemory),
            session_id: Uuid::new_v4().to_string(),
            model: model.into(),
            max_tokens: defaults.model.max_tokens,
            temperature: defaults.model.temperature,
            max_iterations: defaults.max_iterations(),
            messages: vec![Message::system(prompt::system_prompt(None))],
            restored: false,
        }
    }

    /// Wire up tools, memory and limits from the config file
    pub fn from_config(provider: Arc<dyn Provider>, config: &Config) -> Self {
        let mut tools = ToolRegistry::new();
        register_default_tools(&mut tools, Arc::clone(&provider), config);

        let mut conversation = Self::new(provider, tools, config.model_name())
            .with_max_iterations(config.max_iterations())
            .with_system_prompt(config.agent.system_prompt.as_deref().unwrap_or(""));
        conversation.max_tokens = config.model.max_tokens;
        conversation.temperature = config.model.temperature;

        if config.memory.enabled {
            conversation = conversation.with_memory(Arc::new(FileMemory::from_config(config)));
        }

        conversation
    }

    pub fn with_memory(mut self, memory: Arc<dyn Memory>) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    /// Replace the system prompt; blank falls back to the built-in one
    pub fn with_system_prompt(mut self, system_prompt: &str) -> Self {
        let message = Message::system(prompt::system_prompt(Some(system_prompt)));
        match self.messages.first_mut() {
            Some(first) if first.role == Role::System => *first = message,
            _ => self.messages.insert(0, message),
        }
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn history(&self) -> &[Message] {
        &self.messages
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Append the stored transcript of this session after the system prompt.
    ///
    /// Call before the first `submit`. A trailing tool exchange that never
    /// got all of its results is dropped. Returns the number of messages
    /// restored; only the first successful call restores anything.
    pub async fn restore(&mut self) -> Result<usize> {
        if self.restored {
            debug!("session {} already restored", self.session_id);
            return Ok(0);
        }

        let mut stored: Vec<Message> = self
            .memory
            .load(&self.session_id)
            .await?
            .into_iter()
            .filter(|m| m.role != Role::System)
            .collect();
        trim_incomplete_exchange(&mut stored);

        let count = stored.len();
        self.messages.extend(stored);
        self.restored = true;
        info!("restored {} messages for session {}", count, self.session_id);
        Ok(count)
    }

    /// Run one user turn and return the reply text
    pub async fn submit(&mut self, user_text: &str) -> String {
        self.submit_turn(user_text).await.reply
    }

    /// Run one user turn, exposing how it ended
    pub async fn submit_turn(&mut self, user_text: &str) -> TurnOutcome {
        self.record(Message::user(user_text)).await;

        let mut iterations = 0u32;
        let mut last_text: Option<String> = None;
        let mut state = LoopState::AwaitingModel;

        let outcome = loop {
            state = match state {
                LoopState::AwaitingModel if iterations >= self.max_iterations => {
                    LoopState::Aborted(AbortReason::MaxIterationsReached(self.max_iterations))
                }
                LoopState::AwaitingModel => match self.call_model().await {
                    Ok(response) => {
                        if let Some(text) = response.text_content() {
                            last_text = Some(text.to_string());
                        }

                        if response.has_tool_calls() {
                            let calls = normalize_call_ids(response.tool_calls);
                            self.record(Message::assistant_with_tool_calls(
                                response.content,
                                &calls,
                            ))
                            .await;
                            LoopState::DispatchingTools(calls)
                        } else {
                            LoopState::Done(
                                response
                                    .text_content()
                                    .map(str::to_string)
                                    .unwrap_or_else(|| EMPTY_RESPONSE.to_string()),
                            )
                        }
                    }
                    Err(e) => LoopState::Aborted(AbortReason::ModelCallFailed(e.to_string())),
                },
                LoopState::DispatchingTools(calls) => {
                    for call in &calls {
                        let result = self.tools.dispatch(call).await;
                        self.record(Message::tool(&call.id, &call.name, result))
                            .await;
                    }
                    iterations += 1;
                    debug!("completed tool round {}/{}", iterations, self.max_iterations);
                    LoopState::AwaitingModel
                }
                LoopState::Done(reply) => {
                    self.record(Message::assistant(&reply)).await;
                    break TurnOutcome {
                        reply,
                        status: TurnStatus::Completed,
                        iterations,
                    };
                }
                LoopState::Aborted(reason) => {
                    warn!("turn aborted in session {}: {}", self.session_id, reason);
                    let reply = abort_reply(&reason, last_text.as_deref());
                    self.record(Message::assistant(&reply)).await;
                    break TurnOutcome {
                        reply,
                        status: TurnStatus::Aborted(reason),
                        iterations,
                    };
                }
            };
        };

        self.check_summary().await;
        outcome
    }

    async fn call_model(&self) -> quill_provider::Result<ChatResponse> {
        let params = ChatParams {
            model: self.model.clone(),
            messages: self.messages.clone(),
            tools: self.tools.describe(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            tool_choice: ToolChoice::Auto,
        };

        debug!(
            "calling model {} with {} messages",
            self.model,
            params.messages.len()
        );
        let response = self.provider.chat(params).await?;
        debug!(
            "model replied: finish_reason={}, tool_calls={}",
            response.finish_reason,
            response.tool_calls.len()
        );
        Ok(response)
    }

    async fn record(&mut self, message: Message) {
        if let Err(e) = self.memory.append(&self.session_id, &message).await {
            warn!("failed to persist message for {}: {}", self.session_id, e);
        }
        self.messages.push(message);
    }

    async fn check_summary(&self) {
        match self.memory.maybe_summarize(&self.session_id).await {
            Ok(check) if check.is_due() => {
                info!("session {} is due for summarization: {:?}", self.session_id, check)
            }
            Ok(check) => debug!("summary check for {}: {:?}", self.session_id, check),
            Err(e) => warn!("summary check failed for {}: {}", self.session_id, e),
        }
    }
}

fn abort_reply(reason: &AbortReason, last_text: Option<&str>) -> String {
    match reason {
        AbortReason::MaxIterationsReached(cap) => format!(
            "I've reached the maximum number of tool calls ({}) without finding a complete answer. Here's what I know so far: {}",
            cap,
            last_text.unwrap_or(NO_PARTIAL_ANSWER)
        ),
        AbortReason::ModelCallFailed(_) => reason.to_string(),
    }
}

/// Give every call a unique, non-empty id
fn normalize_call_ids(calls: Vec<ToolCall>) -> Vec<ToolCall> {
    let mut seen = HashSet::new();
    calls
        .into_iter()
        .map(|mut call| {
            if call.id.trim().is_empty() || seen.contains(&call.id) {
                let generated = format!("call_{}", Uuid::new_v4().simple());
                debug!("replacing tool call id {:?} with {}", call.id, generated);
                call.id = generated;
            }
            seen.insert(call.id.clone());
            call
        })
        .collect()
}

/// Drop a trailing assistant tool request whose results were not all stored
fn trim_incomplete_exchange(messages: &mut Vec<Message>) {
    let Some(idx) = messages
        .iter()
        .rposition(|m| m.role == Role::Assistant && m.tool_calls.is_some())
    else {
        return;
    };

    let answered: HashSet<&str> = messages[idx + 1..]
        .iter()
        .filter(|m| m.role == Role::Tool)
        .filter_map(|m| m.tool_call_id.as_deref())
        .collect();
    let complete = messages[idx]
        .tool_call_ids()
        .iter()
        .all(|id| answered.contains(id));

    if !complete {
        warn!("dropping {} messages of an unfinished tool exchange", messages.len() - idx);
        messages.truncate(idx);
    }
}
