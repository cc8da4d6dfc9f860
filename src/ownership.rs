//! Torrent ownership store — which chat added which torrent.
//!
//! Written when a conversation submits a torrent, read when routing
//! added/finished notifications back to the originating chat, pruned
//! against the engine's live torrent set on lifecycle events.

use crate::config::SharedConfig;
use crate::error::Result;
use std::collections::HashSet;

/// Persisted chat_id → {torrent_id → torrent_name} mapping.
///
/// A torrent id appears under at most one chat in practice (ownership is
/// recorded once per successful submission); `owner_of` returns the first
/// match and does not enforce uniqueness across chats.
#[derive(Clone)]
pub struct OwnershipStore {
    store: SharedConfig,
}

impl OwnershipStore {
    pub fn new(store: SharedConfig) -> Self {
        Self { store }
    }

    /// Record that `chat_id` added `torrent_id`. Idempotent; persists only
    /// when something changed.
    pub fn record(&self, chat_id: &str, torrent_id: &str, torrent_name: &str) -> Result<()> {
        let mut store = self.store.lock().expect("config lock poisoned");
        let torrents = store
            .config
            .chat_torrents
            .entry(chat_id.to_owned())
            .or_default();
        if torrents.contains_key(torrent_id) {
            return Ok(());
        }
        torrents.insert(torrent_id.to_owned(), torrent_name.to_owned());
        store.save()
    }

    /// The chat that owns a torrent, if any. First match wins.
    pub fn owner_of(&self, torrent_id: &str) -> Option<String> {
        let store = self.store.lock().expect("config lock poisoned");
        store
            .config
            .chat_torrents
            .iter()
            .find(|(_, torrents)| torrents.contains_key(torrent_id))
            .map(|(chat_id, _)| chat_id.clone())
    }

    /// Torrent ids tracked for a chat (drives `/status` filtering).
    pub fn tracked_for(&self, chat_id: &str) -> Vec<String> {
        let store = self.store.lock().expect("config lock poisoned");
        store
            .config
            .chat_torrents
            .get(chat_id)
            .map(|torrents| torrents.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop every tracked torrent the engine no longer reports, and every
    /// chat left with an empty set. Persists only if anything changed.
    pub fn reconcile(&self, live_torrent_ids: &HashSet<String>) -> Result<()> {
        let mut store = self.store.lock().expect("config lock poisoned");
        let mut changed = false;

        for torrents in store.config.chat_torrents.values_mut() {
            let before = torrents.len();
            torrents.retain(|id, _| live_torrent_ids.contains(id));
            changed |= torrents.len() != before;
        }
        let before = store.config.chat_torrents.len();
        store.config.chat_torrents.retain(|_, t| !t.is_empty());
        changed |= store.config.chat_torrents.len() != before;

        if changed {
            store.save()?;
        }
        Ok(())
    }
}
