//! Top-level plugin coordinator.
//!
//! Owns the five components (registry, ownership store, conversation
//! sessions, router, event bridge) plus the messaging channel, and runs the
//! dispatch loop: a `tokio::select!` over inbound channel events, queued
//! lifecycle notifications, and the cancellation token. The host's
//! `enable`/`disable` lifecycle maps onto `Plugin::start` / `PluginHandle::stop`.

use crate::channel::{Channel, ChannelEvent, Keyboard, OutboundMessage};
use crate::config::{ConfigStore, PluginConfig, SharedConfig};
use crate::conversation::{ConversationInput, ConversationSession, Reply, Step, TorrentSource};
use crate::engine::{LabelProvider, TorrentEngine};
use crate::error::Error;
use crate::events::{EventBridge, Notification};
use crate::fetch;
use crate::ownership::OwnershipStore;
use crate::registry::ChatRegistry;
use crate::router::{CommandKind, RouteDecision, Router};
use crate::status::{ACTIVE_STATES, format_status};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Character budget for the diagnostic forwarded to the admin chat.
const ERROR_DETAIL_BUDGET: usize = 3800;

/// Capacity of the lifecycle-notification queue between the host's event
/// thread and the dispatch loop.
const NOTIFY_QUEUE_CAPACITY: usize = 64;

/// The notification receiver outlives any single transport run: a reload
/// tears the dispatch loop down and the next one picks the receiver back
/// up, so event bridges handed out earlier keep working.
type SharedNotifyRx = Arc<tokio::sync::Mutex<mpsc::Receiver<Notification>>>;

/// The assembled plugin, ready to start.
///
/// Construct with the host's collaborators, hand [`Plugin::event_bridge`]
/// to the host's event manager, then call [`Plugin::start`] (from within a
/// tokio runtime) to spawn the transport and dispatch tasks.
pub struct Plugin {
    store: SharedConfig,
    registry: ChatRegistry,
    ownership: OwnershipStore,
    engine: Arc<dyn TorrentEngine>,
    labels: Option<Arc<dyn LabelProvider>>,
    channel: Arc<dyn Channel>,
    notify_tx: mpsc::Sender<Notification>,
    notify_rx: SharedNotifyRx,
}

impl Plugin {
    pub fn new(
        store: ConfigStore,
        engine: Arc<dyn TorrentEngine>,
        labels: Option<Arc<dyn LabelProvider>>,
        channel: Arc<dyn Channel>,
    ) -> Self {
        let store = store.into_shared();
        let registry = ChatRegistry::new(store.clone());
        let ownership = OwnershipStore::new(store.clone());
        let (notify_tx, notify_rx) = mpsc::channel(NOTIFY_QUEUE_CAPACITY);

        Self {
            store,
            registry,
            ownership,
            engine,
            labels,
            channel,
            notify_tx,
            notify_rx: Arc::new(tokio::sync::Mutex::new(notify_rx)),
        }
    }

    /// Handle for the host's event manager. Clone freely; callable from the
    /// engine's event-emission thread.
    pub fn event_bridge(&self) -> EventBridge {
        EventBridge::new(
            self.ownership.clone(),
            self.engine.clone(),
            self.notify_tx.clone(),
        )
    }

    /// Start the plugin: spawn the channel poll loop and the dispatch loop.
    ///
    /// With no bot token configured the plugin starts dormant — no tasks,
    /// but the RPC surface on the returned handle still works, so the host
    /// can enable the plugin before configuring it (and bring the transport
    /// up later via [`PluginHandle::reload`]).
    pub fn start(self) -> PluginHandle {
        let Plugin {
            store,
            registry,
            ownership,
            engine,
            labels,
            channel,
            notify_tx,
            notify_rx,
        } = self;

        let mut handle = PluginHandle {
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
            store,
            registry,
            ownership,
            engine,
            labels,
            channel,
            notify_tx,
            notify_rx,
        };
        handle.spawn_transport();
        handle
    }
}

/// Running plugin handle — the scoped resource the host holds between
/// enable and disable. Also carries the host-facing RPC surface.
pub struct PluginHandle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    store: SharedConfig,
    registry: ChatRegistry,
    ownership: OwnershipStore,
    engine: Arc<dyn TorrentEngine>,
    labels: Option<Arc<dyn LabelProvider>>,
    channel: Arc<dyn Channel>,
    notify_tx: mpsc::Sender<Notification>,
    notify_rx: SharedNotifyRx,
}

impl PluginHandle {
    /// Spawn the channel poll loop and the dispatch loop under the current
    /// cancellation token. Dormant no-op when no bot token is configured.
    fn spawn_transport(&mut self) {
        let configured = self
            .store
            .lock()
            .expect("config lock poisoned")
            .is_configured();
        if !configured {
            eprintln!("[plugin] No bot token configured; transport not started");
            return;
        }

        let (events_tx, events_rx) = mpsc::channel::<ChannelEvent>(64);
        let poll_channel = self.channel.clone();
        let poll_cancel = self.cancel.clone();
        self.tasks.push(tokio::spawn(async move {
            poll_channel.run(events_tx, poll_cancel).await;
        }));

        let runner = Runner {
            store: self.store.clone(),
            registry: self.registry.clone(),
            ownership: self.ownership.clone(),
            engine: self.engine.clone(),
            labels: self.labels.clone(),
            channel: self.channel.clone(),
            router: Router::new(),
            sessions: HashMap::new(),
            available_labels: Vec::new(),
            http: fetch::http_client(),
            _notify_tx: self.notify_tx.clone(),
        };
        let notify_rx = self.notify_rx.clone();
        let run_cancel = self.cancel.clone();
        self.tasks.push(tokio::spawn(async move {
            runner.run(events_rx, notify_rx, run_cancel).await;
        }));
        eprintln!("[plugin] Started");
    }

    /// Apply an optional partial config, then restart the transport under
    /// it (host `reload_telegram` RPC). A plugin started dormant comes up
    /// here once a token arrives; in-flight conversations do not survive
    /// the restart.
    pub async fn reload(&mut self, partial: Option<&serde_json::Value>) -> crate::error::Result<()> {
        if let Some(partial) = partial {
            self.store
                .lock()
                .expect("config lock poisoned")
                .set_config(partial)?;
        }

        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        self.cancel = CancellationToken::new();
        eprintln!("[plugin] Reloading transport");
        self.spawn_transport();
        Ok(())
    }

    /// Stop the dispatch and poll loops and persist state.
    pub async fn stop(self) {
        self.cancel.cancel();
        for task in self.tasks {
            let _ = task.await;
        }
        if let Err(e) = self.store.lock().expect("config lock poisoned").save() {
            eprintln!("[plugin] Failed to persist state on stop: {e}");
        }
        eprintln!("[plugin] Stopped");
    }

    /// The full config document (host `get_config` RPC).
    pub fn get_config(&self) -> PluginConfig {
        self.store
            .lock()
            .expect("config lock poisoned")
            .config
            .clone()
    }

    /// Merge a partial config dict and persist (host `set_config` RPC).
    pub fn set_config(&self, partial: &serde_json::Value) -> crate::error::Result<()> {
        self.store
            .lock()
            .expect("config lock poisoned")
            .set_config(partial)
    }

    /// Register a chat (host `add_chat` RPC).
    pub fn add_chat(&self, chat_id: &str, name: &str) -> crate::error::Result<bool> {
        self.registry.register(chat_id, name)
    }

    /// Deregister a chat (host `remove_chat` RPC).
    pub fn remove_chat(&self, chat_id: &str) -> crate::error::Result<bool> {
        self.registry.deregister(chat_id)
    }
}

/// The dispatch loop state.
struct Runner {
    store: SharedConfig,
    registry: ChatRegistry,
    ownership: OwnershipStore,
    engine: Arc<dyn TorrentEngine>,
    labels: Option<Arc<dyn LabelProvider>>,
    channel: Arc<dyn Channel>,
    router: Router,
    sessions: HashMap<i64, ConversationSession>,
    /// Snapshot of the label plugin's labels, refreshed on every /add.
    available_labels: Vec<String>,
    http: reqwest::Client,
    /// Keeps the notification channel open even when the host never
    /// attaches an event bridge.
    _notify_tx: mpsc::Sender<Notification>,
}

impl Runner {
    async fn run(
        mut self,
        mut events_rx: mpsc::Receiver<ChannelEvent>,
        notify_rx: SharedNotifyRx,
        cancel: CancellationToken,
    ) {
        eprintln!("[plugin] Dispatch loop ready");
        // Only one dispatch loop runs at a time; the lock is uncontended
        // and exists so the receiver can outlive a transport reload.
        let mut notify_rx = notify_rx.lock().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    eprintln!("[plugin] Dispatch loop shutting down");
                    break;
                }

                event = events_rx.recv() => {
                    match event {
                        Some(event) => {
                            let origin = event.chat_id();
                            if let Err(e) = self.handle_channel_event(event).await {
                                eprintln!("[plugin] Error handling event from chat {origin}: {e:?}");
                                self.report_error(origin, &e).await;
                            }
                        }
                        None => {
                            eprintln!("[plugin] Channel closed, dispatch loop exiting");
                            break;
                        }
                    }
                }

                notification = notify_rx.recv() => {
                    if let Some(n) = notification {
                        self.deliver_notification(n).await;
                    }
                }
            }
        }
    }

    /// Send a queued lifecycle notification to its owner chat.
    async fn deliver_notification(&self, n: Notification) {
        let chat_id: i64 = match n.chat_id.parse() {
            Ok(id) => id,
            Err(_) => {
                eprintln!("[plugin] Dropping notification for unparseable chat id {:?}", n.chat_id);
                return;
            }
        };
        if let Err(e) = self
            .channel
            .send_message(&OutboundMessage::text(chat_id, n.text))
            .await
        {
            eprintln!("[plugin] Failed to deliver notification to chat {chat_id}: {e}");
        }
    }

    /// Handle a message, command, or document from the channel.
    async fn handle_channel_event(&mut self, event: ChannelEvent) -> color_eyre::Result<()> {
        let chat_id = event.chat_id();
        let chat_key = chat_id.to_string();
        let authorized = self.registry.is_authorized(&chat_key);
        let in_conversation = self.sessions.contains_key(&chat_id);

        match self.router.decide(&event, authorized, in_conversation) {
            RouteDecision::Ignore => {
                if !authorized {
                    eprintln!("[plugin] Ignoring event from unregistered chat {chat_id}");
                }
                Ok(())
            }
            RouteDecision::UnauthorizedHint => {
                self.send_plain(chat_id, &format!("Unauthorized\nChat ID: {chat_id}"))
                    .await
            }
            RouteDecision::Conversation => self.handle_conversation_input(chat_id, &event).await,
            RouteDecision::Command(kind) => {
                let args = match &event {
                    ChannelEvent::Command { args, .. } => args.clone(),
                    _ => String::new(),
                };
                self.handle_command(chat_id, kind, &args).await
            }
        }
    }

    async fn handle_command(
        &mut self,
        chat_id: i64,
        kind: CommandKind,
        args: &str,
    ) -> color_eyre::Result<()> {
        match kind {
            CommandKind::Start | CommandKind::Help => {
                self.send_plain(chat_id, &self.router.help_text()).await
            }
            CommandKind::Add => {
                self.refresh_labels();
                let (session, reply) = ConversationSession::start(&self.available_labels);
                self.sessions.insert(chat_id, session);
                self.send_reply(chat_id, reply).await
            }
            CommandKind::Cancel => {
                self.sessions.remove(&chat_id);
                self.send_reply(chat_id, ConversationSession::cancel()).await
            }
            CommandKind::Status => {
                let text = self.render_status(&chat_id.to_string());
                self.send_plain(chat_id, &text).await
            }
            CommandKind::Register => self.handle_register(chat_id, args).await,
            CommandKind::Deregister => self.handle_deregister(chat_id, args).await,
        }
    }

    fn refresh_labels(&mut self) {
        self.available_labels = self
            .labels
            .as_ref()
            .map(|l| l.labels())
            .unwrap_or_default();
    }

    /// Admin command: `/register <bot_token> <chat_id> <chat_name>`.
    /// Non-admin senders are ignored without a reply.
    async fn handle_register(&self, chat_id: i64, args: &str) -> color_eyre::Result<()> {
        if !self.is_admin(chat_id) {
            return Ok(());
        }

        const USAGE: &str = "Usage: /register <bot_token> <chat_id> <chat_name>";
        let parts: Vec<&str> = args.splitn(3, ' ').collect();
        let [token, target, name] = parts[..] else {
            return self
                .send_plain(chat_id, &format!("Invalid arguments. {USAGE}"))
                .await;
        };

        if !self.token_matches(token) {
            return self
                .send_plain(chat_id, &format!("Invalid bot token. {USAGE}"))
                .await;
        }

        match self.registry.register(target, name) {
            Ok(true) => {
                self.send_plain(
                    chat_id,
                    &format!("Chat registered successfully\nChat ID: {target}\nChat Name: {name}"),
                )
                .await
            }
            Ok(false) => self.send_plain(chat_id, "Chat ID already registered").await,
            Err(Error::Validation) => self.send_plain(chat_id, "Invalid Chat ID or Name").await,
            Err(e) => Err(e.into()),
        }
    }

    /// Admin command: `/deregister <bot_token> <chat_id>`.
    async fn handle_deregister(&self, chat_id: i64, args: &str) -> color_eyre::Result<()> {
        if !self.is_admin(chat_id) {
            return Ok(());
        }

        const USAGE: &str = "Usage: /deregister <bot_token> <chat_id>";
        let parts: Vec<&str> = args.splitn(2, ' ').collect();
        let [token, target] = parts[..] else {
            return self
                .send_plain(chat_id, &format!("Invalid arguments. {USAGE}"))
                .await;
        };

        if !self.token_matches(token) {
            return self
                .send_plain(chat_id, &format!("Invalid bot token. {USAGE}"))
                .await;
        }

        match self.registry.deregister(target) {
            Ok(_) => {
                self.send_plain(
                    chat_id,
                    &format!("Chat deregistered successfully\nChat ID: {target}"),
                )
                .await
            }
            Err(e) => Err(e.into()),
        }
    }

    fn is_admin(&self, chat_id: i64) -> bool {
        let store = self.store.lock().expect("config lock poisoned");
        !store.config.admin_chat_id.is_empty()
            && store.config.admin_chat_id == chat_id.to_string()
    }

    /// Exact match against the configured bot token (shared secret for
    /// admin commands).
    fn token_matches(&self, token: &str) -> bool {
        let store = self.store.lock().expect("config lock poisoned");
        !store.config.telegram_token.is_empty() && store.config.telegram_token == token
    }

    /// Render the `/status` listing for one chat: its tracked torrents,
    /// filtered to listable states.
    fn render_status(&self, chat_key: &str) -> String {
        let mut blocks = Vec::new();
        for torrent_id in self.ownership.tracked_for(chat_key) {
            if let Some(status) = self.engine.status(&torrent_id)
                && ACTIVE_STATES.contains(&status.state.as_str())
            {
                blocks.push(format_status(&status));
            }
        }
        if blocks.is_empty() {
            "No active torrents found".to_owned()
        } else {
            blocks.join("\n\n")
        }
    }

    async fn handle_conversation_input(
        &mut self,
        chat_id: i64,
        event: &ChannelEvent,
    ) -> color_eyre::Result<()> {
        let input = match event {
            ChannelEvent::Message { text, .. } => ConversationInput::Text(text),
            ChannelEvent::Document {
                file_id,
                file_name,
                mime_type,
                ..
            } => ConversationInput::Document {
                file_id,
                file_name,
                mime_type,
            },
            // Commands never route here.
            ChannelEvent::Command { .. } => return Ok(()),
        };

        let Some(session) = self.sessions.get_mut(&chat_id) else {
            return Ok(());
        };

        match session.step(input, &self.available_labels) {
            Step::Continue(reply) => self.send_reply(chat_id, reply).await,
            Step::Abort(reply) => {
                self.sessions.remove(&chat_id);
                self.send_reply(chat_id, reply).await
            }
            Step::Submit { source, label } => {
                self.sessions.remove(&chat_id);
                self.submit(chat_id, source, label).await
            }
        }
    }

    /// Hand a completed conversation's source to the engine.
    ///
    /// Magnets resolve inline. File and URL sources need a network fetch,
    /// which runs in a spawned task so a slow upstream never stalls other
    /// chats' dispatch; failure is reported to the chat, never propagated.
    async fn submit(
        &mut self,
        chat_id: i64,
        source: TorrentSource,
        label: Option<String>,
    ) -> color_eyre::Result<()> {
        let task = SubmissionTask {
            engine: self.engine.clone(),
            labels: self.labels.clone(),
            ownership: self.ownership.clone(),
            channel: self.channel.clone(),
            http: self.http.clone(),
            chat_id,
            label,
        };

        match source {
            TorrentSource::Magnet(uri) => {
                match task.engine.add_torrent_magnet(&uri).await {
                    Ok(torrent_id) => task.finalize(&torrent_id),
                    Err(e) => {
                        eprintln!("[plugin] Magnet submission failed for chat {chat_id}: {e}");
                        task.fail("Failed to add magnet link").await;
                    }
                }
                Ok(())
            }
            TorrentSource::Document { file_id, file_name } => {
                tokio::spawn(async move {
                    task.run_document(&file_id, &file_name).await;
                });
                Ok(())
            }
            TorrentSource::Url(url) => {
                tokio::spawn(async move {
                    task.run_url(&url).await;
                });
                Ok(())
            }
        }
    }

    async fn send_plain(&self, chat_id: i64, text: &str) -> color_eyre::Result<()> {
        self.channel
            .send_message(&OutboundMessage::text(chat_id, text))
            .await
    }

    async fn send_reply(&self, chat_id: i64, reply: Reply) -> color_eyre::Result<()> {
        self.channel
            .send_message(&OutboundMessage {
                chat_id,
                text: reply.text,
                keyboard: reply.keyboard,
            })
            .await
    }

    /// Top-level handler-error path: forward a bounded diagnostic to the
    /// admin chat and tell the originating chat an admin was notified.
    async fn report_error(&self, origin_chat: i64, err: &color_eyre::Report) {
        let admin = {
            let store = self.store.lock().expect("config lock poisoned");
            store.config.admin_chat_id.clone()
        };
        let Ok(admin_id) = admin.parse::<i64>() else {
            return;
        };

        let detail = error_detail(err);
        let message =
            format!("An exception was raised while handling an update\n```\n{detail}\n```");
        if let Err(e) = self
            .channel
            .send_message(&OutboundMessage::text(admin_id, message))
            .await
        {
            eprintln!("[plugin] Failed to forward error to admin chat: {e}");
        }

        let _ = self
            .channel
            .send_message(&OutboundMessage {
                chat_id: origin_chat,
                text: "An error occurred. Administrator has been notified.".to_owned(),
                keyboard: Keyboard::Remove,
            })
            .await;
    }
}

/// Diagnostic text for the admin chat, degrading stepwise to stay inside
/// the message budget.
fn error_detail(err: &color_eyre::Report) -> String {
    let full = format!("{err:?}");
    if full.len() <= ERROR_DETAIL_BUDGET {
        return full;
    }
    let short = format!("{err}");
    if short.len() <= ERROR_DETAIL_BUDGET {
        return short;
    }
    "See Logs for trace".to_owned()
}

/// State shared by a submission's finishing steps, cloneable into a
/// background fetch task.
struct SubmissionTask {
    engine: Arc<dyn TorrentEngine>,
    labels: Option<Arc<dyn LabelProvider>>,
    ownership: OwnershipStore,
    channel: Arc<dyn Channel>,
    http: reqwest::Client,
    chat_id: i64,
    label: Option<String>,
}

impl SubmissionTask {
    /// Fetch an uploaded `.torrent` document and submit it.
    async fn run_document(self, file_id: &str, file_name: &str) {
        let bytes = match self.channel.fetch_document(file_id).await {
            Ok(bytes) => bytes,
            Err(e) => {
                eprintln!("[plugin] Document fetch failed for chat {}: {e}", self.chat_id);
                return self
                    .fail("Failed to download torrent file. terminating operation")
                    .await;
            }
        };
        match self.engine.add_torrent_file(Some(file_name), &bytes).await {
            Ok(torrent_id) => self.finalize(&torrent_id),
            Err(e) => {
                eprintln!("[plugin] File submission failed for chat {}: {e}", self.chat_id);
                self.fail("Failed to download torrent file. terminating operation")
                    .await;
            }
        }
    }

    /// Fetch a remote `.torrent` payload by URL and submit it.
    async fn run_url(self, url: &str) {
        let bytes = match fetch::fetch_torrent_bytes(&self.http, url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                eprintln!("[plugin] URL fetch failed for chat {}: {e}", self.chat_id);
                return self.fail("Failed to download torrent file").await;
            }
        };
        match self.engine.add_torrent_file(None, &bytes).await {
            Ok(torrent_id) => self.finalize(&torrent_id),
            Err(e) => {
                eprintln!("[plugin] URL submission failed for chat {}: {e}", self.chat_id);
                self.fail("Failed to download torrent file").await;
            }
        }
    }

    /// After a successful engine submission: apply the pending label
    /// (best-effort) and record ownership for notification routing.
    fn finalize(&self, torrent_id: &str) {
        if let (Some(label), Some(provider)) = (&self.label, &self.labels)
            && provider.labels().iter().any(|l| l == label)
            && let Err(e) = provider.set_label(torrent_id, &label.to_lowercase())
        {
            // Label failures never fail the submission.
            eprintln!("[plugin] Failed to apply label {label:?} to {torrent_id}: {e}");
        }

        let name = self.engine.torrent_name(torrent_id).unwrap_or_default();
        if let Err(e) = self
            .ownership
            .record(&self.chat_id.to_string(), torrent_id, &name)
        {
            eprintln!("[plugin] Failed to record ownership of {torrent_id}: {e}");
        }
        eprintln!("[plugin] Chat {} added torrent {torrent_id}", self.chat_id);
    }

    /// Tell the chat the submission failed, clearing any reply keyboard.
    async fn fail(&self, text: &str) {
        let _ = self
            .channel
            .send_message(&OutboundMessage {
                chat_id: self.chat_id,
                text: text.to_owned(),
                keyboard: Keyboard::Remove,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_detail_short_uses_debug_chain() {
        let err = color_eyre::eyre::eyre!("boom");
        let detail = error_detail(&err);
        assert!(detail.contains("boom"));
    }

    #[test]
    fn error_detail_degrades_to_display_then_stub() {
        let long = "x".repeat(ERROR_DETAIL_BUDGET + 1);
        let err = color_eyre::eyre::eyre!("{long}").wrap_err("context");
        // Debug chain is over budget; Display of the outer context fits.
        assert_eq!(error_detail(&err), "context");

        let err = color_eyre::eyre::eyre!("{long}");
        assert_eq!(error_detail(&err), "See Logs for trace");
    }
}
