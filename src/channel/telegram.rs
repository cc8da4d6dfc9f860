//! Telegram Bot API client using raw reqwest (no framework).
//!
//! Long-polls `getUpdates` for messages, commands, and document uploads;
//! sends replies via `sendMessage` with reply-keyboard markup; downloads
//! `.torrent` attachments via `getFile`.

use super::{Channel, ChannelEvent, Keyboard, OutboundMessage};
use crate::error::Error;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;

/// Maximum message length for Telegram (we chunk below this).
const MAX_MESSAGE_LEN: usize = 4000;

/// Telegram Bot API client.
pub struct TelegramChannel {
    bot_token: String,
    client: reqwest::Client,
}

// --- Telegram API response types ---

#[derive(Debug, Deserialize)]
struct TgResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgUpdate {
    update_id: i64,
    message: Option<TgMessage>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    chat: TgChat,
    text: Option<String>,
    document: Option<TgDocument>,
}

#[derive(Debug, Deserialize)]
struct TgChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TgDocument {
    file_id: String,
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgFile {
    file_path: Option<String>,
}

impl TelegramChannel {
    pub fn new(bot_token: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .expect("failed to build reqwest client");

        Self { bot_token, client }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{method}", self.bot_token)
    }

    /// Parse an update's message into a ChannelEvent.
    fn parse_message(msg: &TgMessage) -> Option<ChannelEvent> {
        let chat_id = msg.chat.id;

        if let Some(doc) = &msg.document {
            return Some(ChannelEvent::Document {
                chat_id,
                file_id: doc.file_id.clone(),
                file_name: doc.file_name.clone().unwrap_or_default(),
                mime_type: doc.mime_type.clone().unwrap_or_default(),
            });
        }

        let text = msg.text.as_deref()?.trim();
        if text.is_empty() {
            return None;
        }

        if let Some(rest) = text.strip_prefix('/') {
            // Split command from args: "/register a b" -> ("register", "a b")
            let (command, args) = match rest.split_once(' ') {
                Some((cmd, args)) => (cmd, args),
                None => (rest, ""),
            };
            // Strip @botname suffix from commands like "/status@mybot"
            let command = command.split('@').next().unwrap_or(command);
            Some(ChannelEvent::Command {
                chat_id,
                command: command.to_owned(),
                args: args.trim().to_owned(),
            })
        } else {
            Some(ChannelEvent::Message {
                chat_id,
                text: text.to_owned(),
            })
        }
    }

    /// Long-poll for updates from Telegram.
    async fn get_updates(&self, offset: i64) -> color_eyre::Result<Vec<TgUpdate>> {
        let resp = self
            .client
            .get(self.api_url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", "30".to_string()),
                ("allowed_updates", r#"["message"]"#.to_string()),
            ])
            .send()
            .await?;

        let body: TgResponse<Vec<TgUpdate>> = resp.json().await?;

        if !body.ok {
            let desc = body.description.unwrap_or_default();
            color_eyre::eyre::bail!("Telegram API error: {desc}");
        }

        Ok(body.result.unwrap_or_default())
    }

    fn reply_markup(keyboard: &Keyboard) -> Option<serde_json::Value> {
        match keyboard {
            Keyboard::None => None,
            Keyboard::Remove => Some(serde_json::json!({"remove_keyboard": true})),
            Keyboard::Reply(rows) => Some(serde_json::json!({
                "keyboard": rows,
                "one_time_keyboard": true,
                "resize_keyboard": true,
            })),
        }
    }

    /// Send a text message, chunking if necessary.
    /// Keyboard markup is attached to the *last* chunk only.
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: &Keyboard,
    ) -> color_eyre::Result<()> {
        let chunks = chunk_message(text);
        let last_idx = chunks.len().saturating_sub(1);
        let markup = Self::reply_markup(keyboard);

        for (i, chunk) in chunks.iter().enumerate() {
            let mut payload = serde_json::json!({
                "chat_id": chat_id,
                "text": chunk,
                "parse_mode": "Markdown",
            });
            if i == last_idx && let Some(markup) = &markup {
                payload["reply_markup"] = markup.clone();
            }

            let resp = self
                .client
                .post(self.api_url("sendMessage"))
                .json(&payload)
                .send()
                .await?;

            let body: TgResponse<serde_json::Value> = resp.json().await?;
            if !body.ok {
                // Retry without Markdown if parse_mode fails.
                let mut fallback = serde_json::json!({
                    "chat_id": chat_id,
                    "text": chunk,
                });
                if i == last_idx && let Some(markup) = &markup {
                    fallback["reply_markup"] = markup.clone();
                }

                let resp = self
                    .client
                    .post(self.api_url("sendMessage"))
                    .json(&fallback)
                    .send()
                    .await?;

                let body: TgResponse<serde_json::Value> = resp.json().await?;
                if !body.ok {
                    let desc = body.description.unwrap_or_default();
                    eprintln!("[telegram] sendMessage failed: {desc}");
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn run(&self, tx: Sender<ChannelEvent>, cancel: CancellationToken) {
        let mut offset: i64 = 0;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let updates = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.get_updates(offset) => {
                    match result {
                        Ok(updates) => updates,
                        Err(e) => {
                            eprintln!("[telegram] Poll error: {e}");
                            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                            continue;
                        }
                    }
                }
            };

            for update in updates {
                offset = update.update_id + 1;

                let Some(msg) = update.message else {
                    continue;
                };

                if let Some(event) = Self::parse_message(&msg)
                    && tx.send(event).await.is_err()
                {
                    // Receiver dropped — shut down.
                    return;
                }
            }
        }
    }

    async fn send_message(&self, msg: &OutboundMessage) -> color_eyre::Result<()> {
        self.send_text(msg.chat_id, &msg.text, &msg.keyboard).await
    }

    /// Resolve a document's download path via `getFile`, then fetch its bytes.
    async fn fetch_document(&self, file_id: &str) -> crate::error::Result<Vec<u8>> {
        let resp = self
            .client
            .get(self.api_url("getFile"))
            .query(&[("file_id", file_id)])
            .send()
            .await?;

        let body: TgResponse<TgFile> = resp.json().await?;
        let file_path = body
            .result
            .and_then(|f| f.file_path)
            .ok_or(Error::UpstreamStatus(404))?;

        let url = format!(
            "https://api.telegram.org/file/bot{}/{file_path}",
            self.bot_token
        );
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(Error::UpstreamStatus(resp.status().as_u16()));
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

/// Escape special characters for Telegram Markdown.
///
/// Use this on dynamic content (torrent names, external text) to prevent
/// Telegram's Markdown parser from misinterpreting special characters.
/// Do NOT use this on structural Markdown that we control (e.g. `*bold*`).
pub fn escape_markdown(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for ch in s.chars() {
        if matches!(ch, '_' | '*' | '`' | '[' | ']') {
            result.push('\\');
        }
        result.push(ch);
    }
    result
}

/// Split a message into chunks that fit within Telegram's limit.
fn chunk_message(text: &str) -> Vec<&str> {
    if text.len() <= MAX_MESSAGE_LEN {
        return vec![text];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= MAX_MESSAGE_LEN {
            chunks.push(remaining);
            break;
        }

        // The limit may land mid-character; back up to a char boundary
        // before slicing.
        let mut limit = MAX_MESSAGE_LEN;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }

        // Try to split at a newline within the limit.
        let split_at = remaining[..limit].rfind('\n').unwrap_or(limit);

        let (chunk, rest) = remaining.split_at(split_at);
        chunks.push(chunk);
        // Skip the newline we split on.
        remaining = rest.strip_prefix('\n').unwrap_or(rest);
    }

    chunks
}
