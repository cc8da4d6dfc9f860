//! The `/add` conversation — a per-chat state machine that walks a user
//! from label selection through source selection to a torrent submission.
//!
//! The machine is pure: it consumes inputs and produces replies or a
//! submission request; all I/O (keyboards, fetches, engine calls) happens
//! in the plugin runner. Sessions are ephemeral and die with the process.

use crate::channel::Keyboard;

/// Where a per-chat add flow currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    /// Waiting for the user to pick one of the available labels.
    LabelSelect,
    /// Waiting for the user to pick Magnet / .torrent / URL.
    SourceTypeSelect,
    AwaitMagnet,
    AwaitFile,
    AwaitUrl,
}

/// A reply to show the user, with optional reply-keyboard markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub keyboard: Keyboard,
}

impl Reply {
    fn new(text: String, keyboard: Keyboard) -> Self {
        Self { text, keyboard }
    }
}

/// One inbound message, reduced to what the machine cares about.
#[derive(Debug, Clone)]
pub enum ConversationInput<'a> {
    Text(&'a str),
    Document {
        file_id: &'a str,
        file_name: &'a str,
        mime_type: &'a str,
    },
}

/// The torrent source a completed conversation hands off for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TorrentSource {
    Magnet(String),
    Document { file_id: String, file_name: String },
    Url(String),
}

/// Result of feeding one input to the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Stay in the conversation; show this reply.
    Continue(Reply),
    /// Conversation finished; submit this source (with the chosen label).
    Submit {
        source: TorrentSource,
        label: Option<String>,
    },
    /// Conversation aborted; show this reply and drop the session.
    Abort(Reply),
}

/// Per-chat conversation session. `pending_message` is a transient status
/// line shown once (prefixed to the next prompt) and then cleared.
#[derive(Debug, Clone)]
pub struct ConversationSession {
    pub state: ConversationState,
    pending_label: Option<String>,
    pending_message: Option<String>,
}

impl ConversationSession {
    /// Begin a new add flow. The label step is skipped when no labels are
    /// available, so chats without a label plugin see one prompt fewer.
    pub fn start(labels: &[String]) -> (Self, Reply) {
        let mut session = Self {
            state: ConversationState::SourceTypeSelect,
            pending_label: None,
            pending_message: None,
        };
        let reply = if labels.is_empty() {
            session.prompt_source_type()
        } else {
            session.state = ConversationState::LabelSelect;
            session.prompt_label(labels)
        };
        (session, reply)
    }

    /// Feed one input to the machine. On `Submit` and `Abort` the caller
    /// drops the session.
    pub fn step(&mut self, input: ConversationInput<'_>, labels: &[String]) -> Step {
        match self.state {
            ConversationState::LabelSelect => self.on_label_select(input, labels),
            ConversationState::SourceTypeSelect => self.on_source_type(input),
            ConversationState::AwaitMagnet => self.on_magnet(input),
            ConversationState::AwaitFile => self.on_file(input),
            ConversationState::AwaitUrl => self.on_url(input),
        }
    }

    /// The `/cancel` fallback, valid in any state.
    pub fn cancel() -> Reply {
        Reply::new("Operation cancelled".into(), Keyboard::Remove)
    }

    fn on_label_select(&mut self, input: ConversationInput<'_>, labels: &[String]) -> Step {
        let ConversationInput::Text(text) = input else {
            return Self::abort_invalid();
        };
        if labels.iter().any(|l| l == text) {
            self.pending_label = Some(text.to_owned());
            self.state = ConversationState::SourceTypeSelect;
            Step::Continue(self.prompt_source_type())
        } else {
            self.pending_message = Some("Invalid label. Try again".into());
            Step::Continue(self.prompt_label(labels))
        }
    }

    fn on_source_type(&mut self, input: ConversationInput<'_>) -> Step {
        // Any non-option input here re-prompts, documents included — the
        // user may send the file before telling us it's a file.
        let ConversationInput::Text(text) = input else {
            self.pending_message = Some("Invalid option. Try again".into());
            return Step::Continue(self.prompt_source_type());
        };
        match text {
            "Magnet" => {
                self.state = ConversationState::AwaitMagnet;
                Step::Continue(self.prompt("Send the magnet link"))
            }
            ".torrent" => {
                self.state = ConversationState::AwaitFile;
                Step::Continue(self.prompt("Send the torrent file"))
            }
            "URL" => {
                self.state = ConversationState::AwaitUrl;
                Step::Continue(self.prompt("Send the torrent url"))
            }
            _ => {
                self.pending_message = Some("Invalid option. Try again".into());
                Step::Continue(self.prompt_source_type())
            }
        }
    }

    fn on_magnet(&mut self, input: ConversationInput<'_>) -> Step {
        let ConversationInput::Text(text) = input else {
            return Self::abort_invalid();
        };
        if is_magnet(text) {
            Step::Submit {
                source: TorrentSource::Magnet(text.trim().to_owned()),
                label: self.pending_label.take(),
            }
        } else {
            self.pending_message = Some("Invalid magnet link. Try again".into());
            Step::Continue(self.prompt("Send the magnet link"))
        }
    }

    fn on_file(&mut self, input: ConversationInput<'_>) -> Step {
        let ConversationInput::Document {
            file_id,
            file_name,
            mime_type,
        } = input
        else {
            return Self::abort_invalid();
        };
        if is_torrent_document(file_name, mime_type) {
            Step::Submit {
                source: TorrentSource::Document {
                    file_id: file_id.to_owned(),
                    file_name: file_name.to_owned(),
                },
                label: self.pending_label.take(),
            }
        } else {
            self.pending_message = Some("Invalid torrent file. Try again".into());
            Step::Continue(self.prompt("Send the torrent file"))
        }
    }

    fn on_url(&mut self, input: ConversationInput<'_>) -> Step {
        let ConversationInput::Text(text) = input else {
            return Self::abort_invalid();
        };
        if is_url(text) {
            Step::Submit {
                source: TorrentSource::Url(text.trim().to_owned()),
                label: self.pending_label.take(),
            }
        } else {
            self.pending_message = Some("Invalid URL. Try again".into());
            Step::Continue(self.prompt("Send the torrent url"))
        }
    }

    fn abort_invalid() -> Step {
        Step::Abort(Reply::new(
            "Invalid input. Terminating operation".into(),
            Keyboard::Remove,
        ))
    }

    /// Prefix and clear the transient status line, if any.
    fn with_pending(&mut self, prompt: &str) -> String {
        match self.pending_message.take() {
            Some(msg) => format!("{msg}\n\n{prompt}"),
            None => prompt.to_owned(),
        }
    }

    fn prompt(&mut self, text: &str) -> Reply {
        Reply::new(self.with_pending(text), Keyboard::Remove)
    }

    fn prompt_label(&mut self, labels: &[String]) -> Reply {
        let rows = labels.iter().map(|l| vec![l.clone()]).collect();
        Reply::new(self.with_pending("Select a label"), Keyboard::Reply(rows))
    }

    fn prompt_source_type(&mut self) -> Reply {
        let rows = vec![
            vec!["Magnet".to_owned()],
            vec![".torrent".to_owned()],
            vec!["URL".to_owned()],
        ];
        Reply::new(
            self.with_pending("Select type of torrent source"),
            Keyboard::Reply(rows),
        )
    }
}

/// A well-formed magnet URI carries an `xt=urn:btih:` info-hash parameter.
pub fn is_magnet(text: &str) -> bool {
    let text = text.trim();
    text.starts_with("magnet:?") && text.contains("xt=urn:btih:")
}

/// Minimal URL check: a fetchable scheme with a non-empty remainder.
pub fn is_url(text: &str) -> bool {
    let text = text.trim();
    ["http://", "https://", "ftp://"]
        .iter()
        .any(|scheme| text.len() > scheme.len() && text.starts_with(scheme))
}

/// Accept either the bittorrent MIME type or a `.torrent` extension.
pub fn is_torrent_document(file_name: &str, mime_type: &str) -> bool {
    mime_type == "application/x-bittorrent" || file_name.to_lowercase().ends_with(".torrent")
}
