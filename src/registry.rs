//! Chat registry — the authorization gate for all conversational commands.
//!
//! Registration is administrator-driven (admin command or host RPC), so
//! every mutation persists synchronously.

use crate::config::{ChatEntry, SharedConfig};
use crate::error::{Error, Result};

/// Persisted mapping of authorized chat ids to display names.
#[derive(Clone)]
pub struct ChatRegistry {
    store: SharedConfig,
}

impl ChatRegistry {
    pub fn new(store: SharedConfig) -> Self {
        Self { store }
    }

    /// Register a chat. Returns `Ok(false)` (no-op) when the chat id is
    /// already present; errors on empty arguments.
    pub fn register(&self, chat_id: &str, name: &str) -> Result<bool> {
        if chat_id.is_empty() || name.is_empty() {
            return Err(Error::Validation);
        }

        let mut store = self.store.lock().expect("config lock poisoned");
        if store.config.chats.iter().any(|c| c.chat_id == chat_id) {
            return Ok(false);
        }
        store.config.chats.push(ChatEntry {
            chat_id: chat_id.to_owned(),
            name: name.to_owned(),
        });
        store.save()?;
        Ok(true)
    }

    /// Remove all entries for a chat id. Idempotent — always persists and
    /// returns `Ok(true)`, even for unknown ids.
    pub fn deregister(&self, chat_id: &str) -> Result<bool> {
        let mut store = self.store.lock().expect("config lock poisoned");
        store.config.chats.retain(|c| c.chat_id != chat_id);
        store.save()?;
        Ok(true)
    }

    /// True iff the chat is registered.
    pub fn is_authorized(&self, chat_id: &str) -> bool {
        let store = self.store.lock().expect("config lock poisoned");
        store.config.chats.iter().any(|c| c.chat_id == chat_id)
    }
}
