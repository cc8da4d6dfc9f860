//! Channel abstraction for the messaging transport (Telegram today).

pub mod telegram;

use async_trait::async_trait;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;

/// An event received from a channel.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// A regular text message from a chat.
    Message { chat_id: i64, text: String },

    /// A slash command (e.g. /add, /status).
    Command {
        chat_id: i64,
        command: String,
        args: String,
    },

    /// A document attachment (the `.torrent` upload path).
    Document {
        chat_id: i64,
        file_id: String,
        file_name: String,
        mime_type: String,
    },
}

impl ChannelEvent {
    pub fn chat_id(&self) -> i64 {
        match self {
            ChannelEvent::Message { chat_id, .. }
            | ChannelEvent::Command { chat_id, .. }
            | ChannelEvent::Document { chat_id, .. } => *chat_id,
        }
    }
}

/// Reply-keyboard markup attached to an outbound message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Keyboard {
    /// Leave whatever keyboard is currently shown.
    #[default]
    None,
    /// Remove the reply keyboard.
    Remove,
    /// Show a one-time reply keyboard with the given button rows.
    Reply(Vec<Vec<String>>),
}

/// A message to send back through a channel.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub chat_id: i64,
    pub text: String,
    pub keyboard: Keyboard,
}

impl OutboundMessage {
    pub fn text(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            keyboard: Keyboard::None,
        }
    }
}

/// Trait for messaging channel integrations.
///
/// Implementations run a background loop that produces `ChannelEvent`s
/// and can send outbound messages and fetch uploaded documents.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// Run the channel's receive loop, sending events to `tx`.
    /// Should run until `cancel` is triggered.
    async fn run(&self, tx: Sender<ChannelEvent>, cancel: CancellationToken);

    /// Send a message through this channel.
    async fn send_message(&self, msg: &OutboundMessage) -> color_eyre::Result<()>;

    /// Download the bytes of an uploaded document by file id.
    async fn fetch_document(&self, file_id: &str) -> crate::error::Result<Vec<u8>>;
}
