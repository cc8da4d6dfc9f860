//! Torgram — bridges a torrent daemon to Telegram chats.
//!
//! Registered chats submit torrents (magnet link, uploaded `.torrent` file,
//! or URL) through a guided conversation, query the status of what they
//! added, and get notified when their downloads finish. The host daemon
//! supplies the engine and label collaborators; this crate supplies the
//! transport, routing, conversation, and persistence layers around them.

pub mod channel;
pub mod config;
pub mod conversation;
pub mod engine;
pub mod error;
pub mod events;
pub mod fetch;
pub mod ownership;
pub mod plugin;
pub mod registry;
pub mod router;
pub mod status;
