//! Plugin configuration persisted as `torgram.conf` in the host's state dir.
//!
//! The document carries both settings (bot token, admin chat) and plugin
//! state (registered chats, chat→torrent ownership). Mutations persist
//! synchronously — registration and submissions are rare, not a hot path.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// A registered chat allowed to talk to the bot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatEntry {
    pub chat_id: String,
    pub name: String,
}

/// The full config document, shaped like the host's RPC config dict.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PluginConfig {
    /// Bot API token from @BotFather. Empty = plugin stays dormant.
    #[serde(default)]
    pub telegram_token: String,

    /// Chat id of the administrator; admin commands and error diagnostics
    /// go here. Empty = no admin forwarding.
    #[serde(default)]
    pub admin_chat_id: String,

    /// Registered chats, unique by `chat_id`.
    #[serde(default)]
    pub chats: Vec<ChatEntry>,

    /// chat_id → {torrent_id → cached torrent name}.
    #[serde(default)]
    pub chat_torrents: HashMap<String, HashMap<String, String>>,
}

/// File-backed config store. Guarded by a mutex when shared between the
/// dispatch loop and the host's event thread (see `SharedConfig`).
pub struct ConfigStore {
    path: PathBuf,
    pub config: PluginConfig,
}

/// The one serialization point for all config/state mutation.
pub type SharedConfig = Arc<Mutex<ConfigStore>>;

impl ConfigStore {
    /// Load the config from `<state_dir>/torgram.conf`, or start from
    /// defaults if the file is missing or corrupt.
    pub fn load(state_dir: &Path) -> Self {
        let path = state_dir.join("torgram.conf");
        let config = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(_) => PluginConfig::default(),
        };
        Self { path, config }
    }

    /// Persist the current document to disk.
    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.config)
            .map_err(|e| Error::Persistence(std::io::Error::other(e)))?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    /// Wrap into the shared handle used by the registry and ownership store.
    pub fn into_shared(self) -> SharedConfig {
        Arc::new(Mutex::new(self))
    }

    /// True once a bot token has been configured.
    pub fn is_configured(&self) -> bool {
        !self.config.telegram_token.is_empty()
    }

    /// Merge a partial config dict into the document and persist.
    ///
    /// Only keys present in `partial` are touched, mirroring the host's
    /// `set_config(dict)` RPC semantics.
    pub fn set_config(&mut self, partial: &serde_json::Value) -> Result<()> {
        if let Some(obj) = partial.as_object() {
            let mut doc = serde_json::to_value(&self.config)
                .map_err(|e| Error::Persistence(std::io::Error::other(e)))?;
            for (key, value) in obj {
                doc[key] = value.clone();
            }
            self.config = serde_json::from_value(doc)
                .map_err(|e| Error::Persistence(std::io::Error::other(e)))?;
        }
        self.save()
    }
}
