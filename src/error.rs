//! Typed errors for the plugin's fallible surfaces.
//!
//! Most plumbing uses `color_eyre::Result`; these variants exist where a
//! caller needs to branch on the failure class (RPC validation, persistence,
//! remote payload fetch).

use thiserror::Error;

/// Error type shared across the plugin's stores and submission paths.
#[derive(Error, Debug)]
pub enum Error {
    /// Bad registration input (empty chat id or name).
    #[error("invalid chat id or name")]
    Validation,

    /// Failed to write the plugin's config document to disk.
    #[error("failed to persist plugin state: {0}")]
    Persistence(#[from] std::io::Error),

    /// Remote server answered a torrent-payload fetch with a non-success status.
    #[error("upstream returned HTTP {0}")]
    UpstreamStatus(u16),

    /// Network failure while fetching a torrent payload.
    #[error("upstream fetch failed: {0}")]
    UpstreamFetch(#[from] reqwest::Error),

    /// The torrent engine rejected a submission.
    #[error("torrent engine error: {0}")]
    Engine(String),
}

pub type Result<T> = std::result::Result<T, Error>;
