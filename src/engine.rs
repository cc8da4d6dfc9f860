//! Traits for the host daemon's collaborators.
//!
//! The plugin never talks to a torrent engine directly — the embedder hands
//! it implementations of these traits. Submissions are async (they can hit
//! the network inside the engine); queries are synchronous snapshots so the
//! event bridge can call them from the host's event-emission thread.

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashSet;

/// Snapshot of a torrent's state, as reported by the engine.
#[derive(Debug, Clone, Default)]
pub struct TorrentStatus {
    pub name: String,
    pub state: String,
    /// -1 when the torrent is not queued.
    pub queue_position: i64,
    pub total_wanted: u64,
    /// Percent complete, 0.0..=100.0.
    pub progress: f64,
    pub num_seeds: i64,
    pub num_peers: i64,
    /// -1 when the swarm total is unknown.
    pub total_seeds: i64,
    pub total_peers: i64,
    /// Bytes per second.
    pub download_rate: f64,
    pub upload_rate: f64,
    /// Seconds remaining; non-positive when unknown or complete.
    pub eta_secs: i64,
    /// Unix timestamp of when the torrent was added.
    pub time_added: i64,
}

/// The torrent engine collaborator.
#[async_trait]
pub trait TorrentEngine: Send + Sync {
    /// Add a torrent by magnet URI, returning the new torrent id.
    async fn add_torrent_magnet(&self, uri: &str) -> Result<String>;

    /// Add a torrent from `.torrent` file content, returning the new id.
    async fn add_torrent_file(&self, file_name: Option<&str>, content: &[u8]) -> Result<String>;

    /// Name of a torrent, or `None` if the engine no longer has it.
    fn torrent_name(&self, torrent_id: &str) -> Option<String>;

    /// Ids of every torrent the engine currently reports.
    fn live_torrent_ids(&self) -> HashSet<String>;

    /// Full status snapshot for a torrent.
    fn status(&self, torrent_id: &str) -> Option<TorrentStatus>;
}

/// The label plugin collaborator. Optional — when absent, the add flow
/// skips label selection entirely.
pub trait LabelProvider: Send + Sync {
    /// Currently defined labels.
    fn labels(&self) -> Vec<String>;

    /// Apply a label to a torrent.
    fn set_label(&self, torrent_id: &str, label: &str) -> Result<()>;
}
