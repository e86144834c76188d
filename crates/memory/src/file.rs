//! JSON-file transcript store

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use quill_config::paths::{id_from_filename, safe_filename};
use quill_config::Config;
use quill_provider::Message;

use crate::{Memory, Result, SummaryCheck};

/// A message with the time it was recorded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    #[serde(flatten)]
    pub message: Message,
    pub timestamp: DateTime<Local>,
}

/// On-disk transcript of one session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub session_id: String,
    pub created_at: DateTime<Local>,
    pub updated_at: DateTime<Local>,
    #[serde(default)]
    pub messages: Vec<StoredMessage>,
}

impl Transcript {
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Local::now();
        Self {
            session_id: session_id.into(),
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        }
    }

    pub fn push(&mut self, message: Message) {
        let now = Local::now();
        self.messages.push(StoredMessage {
            message,
            timestamp: now,
        });
        self.updated_at = now;
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.iter().map(|m| m.message.clone()).collect()
    }
}

/// Stores one pretty-printed JSON transcript per session in a directory
pub struct FileMemory {
    dir: PathBuf,
    max_messages: usize,
    summary_length: usize,
    cache: Mutex<HashMap<String, Transcript>>,
}

impl FileMemory {
    pub fn new(dir: impl AsRef<Path>, max_messages: usize) -> Self {
        let dir = dir.as_ref().to_path_buf();
        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!("could not create session directory {:?}: {}", dir, e);
        }

        Self {
            dir,
            max_messages,
            summary_length: 0,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let mut memory = Self::new(config.storage_dir(), config.memory.max_messages);
        memory.summary_length = config.memory.summary_length;
        memory
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    pub fn summary_length(&self) -> usize {
        self.summary_length
    }

    /// Full stored transcript, if the session exists
    pub async fn transcript(&self, session_id: &str) -> Option<Transcript> {
        let cache = self.cache.lock().await;
        if let Some(transcript) = cache.get(session_id) {
            return Some(transcript.clone());
        }
        drop(cache);
        self.read(session_id).await
    }

    /// Ids of all stored sessions
    pub async fn list(&self) -> Vec<String> {
        let mut ids = Vec::new();

        if let Ok(mut entries) = tokio::fs::read_dir(&self.dir).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                if let Some(name) = entry.file_name().to_str() {
                    if let Some(id) = name.strip_suffix(".json").and_then(id_from_filename) {
                        ids.push(id);
                    }
                }
            }
        }

        ids.sort();
        ids
    }

    pub async fn delete(&self, session_id: &str) -> Result<bool> {
        self.cache.lock().await.remove(session_id);
        let path = self.path_for(session_id);
        if path.exists() {
            tokio::fs::remove_file(path).await?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", safe_filename(session_id)))
    }

    async fn read(&self, session_id: &str) -> Option<Transcript> {
        let path = self.path_for(session_id);
        if !path.exists() {
            return None;
        }

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str::<Transcript>(&content) {
                Ok(transcript) if transcript.session_id != session_id => {
                    warn!(
                        "transcript {:?} belongs to session {:?}, not {:?}; ignoring it",
                        path, transcript.session_id, session_id
                    );
                    None
                }
                Ok(transcript) => {
                    debug!("loaded transcript {}", session_id);
                    Some(transcript)
                }
                Err(e) => {
                    warn!("ignoring unreadable transcript {:?}: {}", path, e);
                    None
                }
            },
            Err(e) => {
                warn!("failed to read transcript {:?}: {}", path, e);
                None
            }
        }
    }

    async fn cached<'a>(
        &self,
        cache: &'a mut HashMap<String, Transcript>,
        session_id: &str,
    ) -> &'a mut Transcript {
        match cache.entry(session_id.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let loaded = self
                    .read(session_id)
                    .await
                    .unwrap_or_else(|| Transcript::new(session_id));
                entry.insert(loaded)
            }
        }
    }

    async fn write(&self, transcript: &Transcript) -> Result<()> {
        let path = self.path_for(&transcript.session_id);
        let content = serde_json::to_string_pretty(transcript)?;
        tokio::fs::write(path, content).await?;
        debug!("saved transcript {}", transcript.session_id);
        Ok(())
    }
}

#[async_trait]
impl Memory for FileMemory {
    async fn load(&self, session_id: &str) -> Result<Vec<Message>> {
        let mut cache = self.cache.lock().await;
        let transcript = self.cached(&mut cache, session_id).await;
        Ok(transcript.messages())
    }

    async fn append(&self, session_id: &str, message: &Message) -> Result<()> {
        let mut cache = self.cache.lock().await;
        let transcript = self.cached(&mut cache, session_id).await;
        transcript.push(message.clone());
        let snapshot = transcript.clone();
        drop(cache);

        self.write(&snapshot).await
    }

    async fn maybe_summarize(&self, session_id: &str) -> Result<SummaryCheck> {
        let cached = self
            .cache
            .lock()
            .await
            .get(session_id)
            .map(|t| t.messages.len());
        let count = match cached {
            Some(count) => count,
            None => self
                .read(session_id)
                .await
                .map(|t| t.messages.len())
                .unwrap_or(0),
        };

        Ok(SummaryCheck::evaluate(count, self.max_messages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_path_for_sanitizes_session_id() {
        let dir = TempDir::new().unwrap();
        let memory = FileMemory::new(dir.path(), 20);
        assert_eq!(
            memory.path_for("cli:story/1"),
            dir.path().join("cli%3Astory%2F1.json")
        );
    }

    #[test]
    fn test_transcript_push_updates_timestamp() {
        let mut transcript = Transcript::new("s");
        let created = transcript.created_at;
        transcript.push(Message::user("once upon a time"));

        assert_eq!(transcript.messages.len(), 1);
        assert!(transcript.updated_at >= created);
        assert_eq!(transcript.messages()[0].text(), "once upon a time");
    }

    #[test]
    fn test_stored_message_is_flat_json() {
        let stored = StoredMessage {
            message: Message::tool("call_1", "query_chat", "echo"),
            timestamp: Local::now(),
        };
        let json = serde_json::to_value(&stored).unwrap();
        assert_eq!(json["role"], "tool");
        assert_eq!(json["tool_call_id"], "call_1");
        assert!(json.get("timestamp").is_some());
    }
}
