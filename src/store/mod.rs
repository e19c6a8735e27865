//! Conversation persistence.
//!
//! The engine calls [`ConversationStore::load`] the first time a chat is
//! touched and [`ConversationStore::save`] after every run outcome, unless
//! that load failed. Tool
//! metadata is stored apart from history and survives a reset.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::sanitize::normalize::normalize_turns;
use crate::types::{ChatId, Turn};

const FILE_VERSION: u32 = 1;

/// Storage abstraction for per-chat history.
pub trait ConversationStore: Send + Sync {
    /// History for `chat_id`, empty if none was saved.
    fn load(&self, chat_id: ChatId) -> Result<Vec<Turn>, EngineError>;
    fn save(&self, chat_id: ChatId, turns: &[Turn]) -> Result<(), EngineError>;
    /// Remove the history. Metadata is kept.
    fn clear(&self, chat_id: ChatId) -> Result<(), EngineError>;
    /// Tool metadata for `chat_id`, `Null` if none was saved.
    fn load_metadata(&self, chat_id: ChatId) -> Result<serde_json::Value, EngineError>;
    fn save_metadata(&self, chat_id: ChatId, metadata: &serde_json::Value) -> Result<(), EngineError>;
}

/// Process-local store; history is lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    chats: Mutex<HashMap<ChatId, Vec<Turn>>>,
    metadata: Mutex<HashMap<ChatId, serde_json::Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<std::sync::MutexGuard<'_, T>, EngineError> {
    mutex
        .lock()
        .map_err(|_| EngineError::Storage("memory store lock poisoned".into()))
}

impl ConversationStore for MemoryStore {
    fn load(&self, chat_id: ChatId) -> Result<Vec<Turn>, EngineError> {
        Ok(lock(&self.chats)?.get(&chat_id).cloned().unwrap_or_default())
    }

    fn save(&self, chat_id: ChatId, turns: &[Turn]) -> Result<(), EngineError> {
        lock(&self.chats)?.insert(chat_id, turns.to_vec());
        Ok(())
    }

    fn clear(&self, chat_id: ChatId) -> Result<(), EngineError> {
        lock(&self.chats)?.remove(&chat_id);
        Ok(())
    }

    fn load_metadata(&self, chat_id: ChatId) -> Result<serde_json::Value, EngineError> {
        Ok(lock(&self.metadata)?
            .get(&chat_id)
            .cloned()
            .unwrap_or(serde_json::Value::Null))
    }

    fn save_metadata(&self, chat_id: ChatId, metadata: &serde_json::Value) -> Result<(), EngineError> {
        lock(&self.metadata)?.insert(chat_id, metadata.clone());
        Ok(())
    }
}

/// One JSON file per chat under a base directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    base_dir: PathBuf,
}

#[derive(Debug, Serialize)]
struct ConversationFile<'a> {
    version: u32,
    chat_id: ChatId,
    saved_at: DateTime<Utc>,
    turns: &'a [Turn],
}

/// Turns are read as raw values so files written by older versions, or
/// holding unfamiliar block shapes, still load.
#[derive(Debug, Deserialize)]
struct StoredConversation {
    version: u32,
    #[serde(default)]
    turns: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct MetadataFile<'a> {
    version: u32,
    chat_id: ChatId,
    saved_at: DateTime<Utc>,
    metadata: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct StoredMetadata {
    version: u32,
    #[serde(default)]
    metadata: serde_json::Value,
}

impl FileStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn chat_path(&self, chat_id: ChatId) -> PathBuf {
        self.base_dir.join(format!("chat_{chat_id}.json"))
    }

    fn metadata_path(&self, chat_id: ChatId) -> PathBuf {
        self.base_dir.join(format!("meta_{chat_id}.json"))
    }

    /// Contents of `path`, or `None` if it does not exist.
    fn read_existing(path: &Path) -> Result<Option<String>, EngineError> {
        match fs::read_to_string(path) {
            Ok(data) => Ok(Some(data)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn check_version(path: &Path, version: u32) -> Result<(), EngineError> {
        if version > FILE_VERSION {
            return Err(EngineError::Storage(format!(
                "{} has unsupported version {version}",
                path.display()
            )));
        }
        Ok(())
    }

    /// Write through a temporary file so readers never see a partial file.
    fn write_atomic(&self, path: &Path, contents: String) -> Result<(), EngineError> {
        fs::create_dir_all(&self.base_dir)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl ConversationStore for FileStore {
    fn load(&self, chat_id: ChatId) -> Result<Vec<Turn>, EngineError> {
        let path = self.chat_path(chat_id);
        let Some(raw) = Self::read_existing(&path)? else {
            return Ok(Vec::new());
        };
        let stored: StoredConversation = serde_json::from_str(&raw)?;
        Self::check_version(&path, stored.version)?;
        Ok(normalize_turns(&stored.turns))
    }

    fn save(&self, chat_id: ChatId, turns: &[Turn]) -> Result<(), EngineError> {
        let file = ConversationFile {
            version: FILE_VERSION,
            chat_id,
            saved_at: Utc::now(),
            turns,
        };
        self.write_atomic(&self.chat_path(chat_id), serde_json::to_string_pretty(&file)?)
    }

    fn clear(&self, chat_id: ChatId) -> Result<(), EngineError> {
        match fs::remove_file(self.chat_path(chat_id)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn load_metadata(&self, chat_id: ChatId) -> Result<serde_json::Value, EngineError> {
        let path = self.metadata_path(chat_id);
        let Some(raw) = Self::read_existing(&path)? else {
            return Ok(serde_json::Value::Null);
        };
        let stored: StoredMetadata = serde_json::from_str(&raw)?;
        Self::check_version(&path, stored.version)?;
        Ok(stored.metadata)
    }

    fn save_metadata(&self, chat_id: ChatId, metadata: &serde_json::Value) -> Result<(), EngineError> {
        let file = MetadataFile {
            version: FILE_VERSION,
            chat_id,
            saved_at: Utc::now(),
            metadata,
        };
        self.write_atomic(&self.metadata_path(chat_id), serde_json::to_string_pretty(&file)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Block, Role, ToolCall};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, FileStore) {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("chats"));
        (dir, store)
    }

    fn history() -> Vec<Turn> {
        vec![
            Turn::user("hi"),
            Turn::with_blocks(
                Role::Assistant,
                vec![Block::ToolUse(ToolCall {
                    id: "t1".into(),
                    name: "lookup".into(),
                    input: serde_json::json!({ "q": 1 }),
                })],
            ),
        ]
    }

    #[test]
    fn file_store_round_trip() {
        let (_dir, store) = temp_store();
        store.save(42, &history()).unwrap();
        assert_eq!(store.load(42).unwrap(), history());
        assert!(store.load(7).unwrap().is_empty());
    }

    #[test]
    fn clear_removes_file_and_is_idempotent() {
        let (_dir, store) = temp_store();
        store.save(1, &history()).unwrap();
        store.clear(1).unwrap();
        store.clear(1).unwrap();
        assert!(store.load(1).unwrap().is_empty());
    }

    #[test]
    fn legacy_shapes_are_normalized_on_load() {
        let (_dir, store) = temp_store();
        fs::create_dir_all(store.base_dir()).unwrap();
        fs::write(
            store.base_dir().join("chat_5.json"),
            r#"{ "version": 1, "turns": [
                { "role": "user", "content": "hello" },
                { "role": "assistant", "content": [{ "type": "tool_call", "id": "a", "name": "x", "arguments": "{}" }] },
                { "role": "system", "content": "ignored" }
            ]}"#,
        )
        .unwrap();
        let turns = store.load(5).unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].tool_calls()[0].id, "a");
    }

    #[test]
    fn newer_file_versions_are_rejected() {
        let (_dir, store) = temp_store();
        fs::create_dir_all(store.base_dir()).unwrap();
        fs::write(store.base_dir().join("chat_9.json"), r#"{ "version": 99, "turns": [] }"#).unwrap();
        assert!(matches!(store.load(9), Err(EngineError::Storage(_))));
    }

    #[test]
    fn metadata_is_kept_apart_from_history() {
        let (_dir, store) = temp_store();
        assert_eq!(store.load_metadata(3).unwrap(), serde_json::Value::Null);

        let repo = serde_json::json!({ "active_repo": "octo/parley" });
        store.save(3, &history()).unwrap();
        store.save_metadata(3, &repo).unwrap();
        store.clear(3).unwrap();

        assert!(store.load(3).unwrap().is_empty());
        assert_eq!(store.load_metadata(3).unwrap(), repo);
        assert!(store.base_dir().join("meta_3.json").exists());
    }

    #[test]
    fn memory_store_isolates_chats() {
        let store = MemoryStore::new();
        store.save(1, &history()).unwrap();
        assert_eq!(store.load(1).unwrap().len(), 2);
        assert!(store.load(2).unwrap().is_empty());
        store.clear(1).unwrap();
        assert!(store.load(1).unwrap().is_empty());

        store.save_metadata(1, &serde_json::json!({ "k": 1 })).unwrap();
        assert_eq!(store.load_metadata(1).unwrap()["k"], 1);
        assert_eq!(store.load_metadata(2).unwrap(), serde_json::Value::Null);
    }
}
