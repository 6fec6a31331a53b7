//! Conversation persistence layer.
//!
//! Conversations are stored through a small key-value surface so the
//! backing storage can be swapped (in-memory, files on disk, a remote
//! profile service). Each conversation is one JSON document keyed by
//! the owning identity:
//!
//! ```text
//! portal.chat.v1:<role>:<userId>  ->  { "version": 1, "role": ..., "userId": ..., "messages": [...] }
//! ```
//!
//! [`FileStore`] lays documents out as `<root>/<hex(key)>.json`.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{AssistantError, AssistantResult};
use crate::types::{Message, Role};

const KEY_PREFIX: &str = "portal.chat.v1";
const FORMAT_VERSION: u32 = 1;
// Leaves room for `.json.tmp` under the common 255-byte file name limit.
const MAX_HEX_NAME: usize = 200;

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Minimal get/set/delete storage surface
#[cfg_attr(test, mockall::automock)]
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> AssistantResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> AssistantResult<()>;
    /// Removing a missing key is not an error
    fn delete(&self, key: &str) -> AssistantResult<()>;
}

/// Shared handle to a key-value store
pub type SharedStore = Arc<dyn KeyValueStore>;

/// Process-local store, lost on exit
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> AssistantResult<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> AssistantResult<()> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> AssistantResult<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// One file per key under a root directory
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // Hex keeps distinct keys distinct on disk and keeps them inside `root`.
    // Keys too long to hex-encode within the name limit use a `h-` prefixed
    // SHA-256 digest instead; plain hex names never contain `-`.
    fn path_for(&self, key: &str) -> PathBuf {
        let name = if key.len() * 2 <= MAX_HEX_NAME {
            hex(key.as_bytes())
        } else {
            format!("h-{}", hex(&Sha256::digest(key.as_bytes())))
        };
        self.root.join(format!("{}.json", name))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> AssistantResult<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> AssistantResult<()> {
        fs::create_dir_all(&self.root)?;
        let path = self.path_for(key);
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, value)?;
        if let Err(e) = fs::rename(&temp_path, &path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> AssistantResult<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredConversation {
    version: u32,
    role: Role,
    #[serde(rename = "userId")]
    user_id: String,
    messages: Vec<Message>,
}

/// Per-identity conversation persistence.
///
/// Every operation fails soft: errors are logged as warnings and the
/// chat keeps working without persistence.
#[derive(Clone)]
pub struct ConversationStore {
    backend: SharedStore,
}

impl ConversationStore {
    pub fn new(backend: SharedStore) -> Self {
        Self { backend }
    }

    /// Store backed by process memory
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Store backed by files under `root`
    pub fn on_disk(root: impl AsRef<Path>) -> Self {
        Self::new(Arc::new(FileStore::new(root)))
    }

    /// Storage key for an identity. Roles never contain `:`, so the
    /// role segment always ends at the second separator.
    pub fn key_for(role: Role, user_id: &str) -> String {
        format!("{}:{}:{}", KEY_PREFIX, role.as_str(), user_id)
    }

    /// Load the persisted log, or an empty one if nothing usable is stored.
    pub fn load(&self, role: Role, user_id: &str) -> Vec<Message> {
        match self.try_load(role, user_id) {
            Ok(messages) => messages,
            Err(e) => {
                warn!(role = %role, user_id, "Failed to load conversation: {}", e);
                Vec::new()
            }
        }
    }

    /// Overwrite the persisted log for an identity.
    pub fn save(&self, role: Role, user_id: &str, messages: &[Message]) {
        if let Err(e) = self.try_save(role, user_id, messages) {
            warn!(role = %role, user_id, "Failed to save conversation: {}", e);
        }
    }

    /// Remove the persisted log for an identity.
    pub fn clear(&self, role: Role, user_id: &str) {
        let key = Self::key_for(role, user_id);
        match self.backend.delete(&key) {
            Ok(()) => debug!(key = %key, "Cleared conversation"),
            Err(e) => warn!(role = %role, user_id, "Failed to clear conversation: {}", e),
        }
    }

    fn try_load(&self, role: Role, user_id: &str) -> AssistantResult<Vec<Message>> {
        let key = Self::key_for(role, user_id);
        let Some(content) = self.backend.get(&key)? else {
            return Ok(Vec::new());
        };

        let stored: StoredConversation = serde_json::from_str(&content)?;
        if stored.version != FORMAT_VERSION {
            return Err(AssistantError::Persistence(format!(
                "unsupported conversation format version {}",
                stored.version
            )));
        }
        if stored.role != role || stored.user_id != user_id {
            return Err(AssistantError::Persistence(format!(
                "document under {} belongs to {}:{}",
                key, stored.role, stored.user_id
            )));
        }

        check_ids(&stored.messages)?;

        debug!(key = %key, count = stored.messages.len(), "Loaded conversation");
        Ok(stored.messages)
    }

    fn try_save(&self, role: Role, user_id: &str, messages: &[Message]) -> AssistantResult<()> {
        let stored = StoredConversation {
            version: FORMAT_VERSION,
            role,
            user_id: user_id.to_string(),
            messages: messages.to_vec(),
        };
        let key = Self::key_for(role, user_id);
        self.backend.set(&key, &serde_json::to_string(&stored)?)?;
        debug!(key = %key, count = messages.len(), "Saved conversation");
        Ok(())
    }
}

/// Ids must increase strictly and leave room for the next append.
fn check_ids(messages: &[Message]) -> AssistantResult<()> {
    for pair in messages.windows(2) {
        if pair[0].id >= pair[1].id {
            return Err(AssistantError::Persistence(format!(
                "message ids out of order: {} then {}",
                pair[0].id, pair[1].id
            )));
        }
    }
    match messages.last() {
        Some(last) if last.id.next().is_none() => Err(AssistantError::Persistence(format!(
            "message id {} has no successor",
            last.id
        ))),
        _ => Ok(()),
    }
}
