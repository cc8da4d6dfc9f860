//! Command routing — the single authorization gate in front of every
//! handler, plus the declarative command table that drives dispatch and
//! `/help` rendering.

use crate::channel::ChannelEvent;

/// The commands the bot understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Start,
    Add,
    Status,
    Cancel,
    Help,
    Register,
    Deregister,
}

/// One entry in the command table.
pub struct CommandSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub list_in_help: bool,
    pub kind: CommandKind,
}

/// The full command table, built once at startup.
pub fn command_table() -> Vec<CommandSpec> {
    vec![
        CommandSpec {
            name: "start",
            description: "Start of the conversation",
            list_in_help: false,
            kind: CommandKind::Start,
        },
        CommandSpec {
            name: "add",
            description: "Add a new torrent",
            list_in_help: true,
            kind: CommandKind::Add,
        },
        CommandSpec {
            name: "status",
            description: "Show status of active torrents",
            list_in_help: true,
            kind: CommandKind::Status,
        },
        CommandSpec {
            name: "cancel",
            description: "Cancels the current operation",
            list_in_help: true,
            kind: CommandKind::Cancel,
        },
        CommandSpec {
            name: "help",
            description: "List all available commands",
            list_in_help: true,
            kind: CommandKind::Help,
        },
        CommandSpec {
            name: "register",
            description: "Register new chat",
            list_in_help: false,
            kind: CommandKind::Register,
        },
        CommandSpec {
            name: "deregister",
            description: "Deregister already registered chat",
            list_in_help: false,
            kind: CommandKind::Deregister,
        },
    ]
}

/// What the dispatch loop should do with an inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Drop the event; no handler runs, no reply is sent.
    Ignore,
    /// Unauthorized chat explicitly knocked with /start — reply once with
    /// its own chat id so an administrator can register it.
    UnauthorizedHint,
    /// Run a command handler.
    Command(CommandKind),
    /// Feed the event into the chat's live conversation session.
    Conversation,
}

/// Routes events to handlers. Holds the command table; authorization and
/// session state are passed in per event so the decision stays pure.
pub struct Router {
    table: Vec<CommandSpec>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self {
            table: command_table(),
        }
    }

    /// Decide how to handle one inbound event.
    ///
    /// Unauthorized chats are short-circuited before any handler: the only
    /// reply they can ever provoke is the /start registration hint. Slash
    /// commands received mid-conversation fall through to command dispatch
    /// (so /cancel ends the flow and /add restarts it); everything else
    /// mid-conversation is conversation input.
    pub fn decide(
        &self,
        event: &ChannelEvent,
        authorized: bool,
        in_conversation: bool,
    ) -> RouteDecision {
        if !authorized {
            return match event {
                ChannelEvent::Command { command, .. } if command == "start" => {
                    RouteDecision::UnauthorizedHint
                }
                _ => RouteDecision::Ignore,
            };
        }

        match event {
            ChannelEvent::Command { command, .. } => match self.lookup(command) {
                Some(kind) => RouteDecision::Command(kind),
                None => RouteDecision::Ignore,
            },
            ChannelEvent::Message { .. } | ChannelEvent::Document { .. } => {
                if in_conversation {
                    RouteDecision::Conversation
                } else {
                    RouteDecision::Ignore
                }
            }
        }
    }

    fn lookup(&self, command: &str) -> Option<CommandKind> {
        self.table
            .iter()
            .find(|spec| spec.name == command)
            .map(|spec| spec.kind)
    }

    /// Render the `/help` text from the table.
    pub fn help_text(&self) -> String {
        self.table
            .iter()
            .filter(|spec| spec.list_in_help)
            .map(|spec| format!("/{} - {}", spec.name, spec.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(name: &str) -> ChannelEvent {
        ChannelEvent::Command {
            chat_id: 100,
            command: name.to_owned(),
            args: String::new(),
        }
    }

    fn message(text: &str) -> ChannelEvent {
        ChannelEvent::Message {
            chat_id: 100,
            text: text.to_owned(),
        }
    }

    #[test]
    fn unauthorized_start_gets_hint() {
        let router = Router::new();
        assert_eq!(
            router.decide(&command("start"), false, false),
            RouteDecision::UnauthorizedHint
        );
    }

    #[test]
    fn unauthorized_anything_else_is_ignored() {
        let router = Router::new();
        assert_eq!(
            router.decide(&command("status"), false, false),
            RouteDecision::Ignore
        );
        assert_eq!(
            router.decide(&command("add"), false, false),
            RouteDecision::Ignore
        );
        assert_eq!(
            router.decide(&message("hello"), false, false),
            RouteDecision::Ignore
        );
        // Gate applies even mid-conversation (deregistered while chatting).
        assert_eq!(
            router.decide(&message("Magnet"), false, true),
            RouteDecision::Ignore
        );
    }

    #[test]
    fn authorized_commands_dispatch() {
        let router = Router::new();
        assert_eq!(
            router.decide(&command("add"), true, false),
            RouteDecision::Command(CommandKind::Add)
        );
        assert_eq!(
            router.decide(&command("status"), true, false),
            RouteDecision::Command(CommandKind::Status)
        );
        assert_eq!(
            router.decide(&command("help"), true, false),
            RouteDecision::Command(CommandKind::Help)
        );
    }

    #[test]
    fn unknown_command_is_ignored() {
        let router = Router::new();
        assert_eq!(
            router.decide(&command("dance"), true, false),
            RouteDecision::Ignore
        );
    }

    #[test]
    fn plain_message_outside_conversation_is_ignored() {
        let router = Router::new();
        assert_eq!(
            router.decide(&message("hello"), true, false),
            RouteDecision::Ignore
        );
    }

    #[test]
    fn message_in_conversation_routes_to_session() {
        let router = Router::new();
        assert_eq!(
            router.decide(&message("Magnet"), true, true),
            RouteDecision::Conversation
        );
        let doc = ChannelEvent::Document {
            chat_id: 100,
            file_id: "f".into(),
            file_name: "x.torrent".into(),
            mime_type: "application/x-bittorrent".into(),
        };
        assert_eq!(router.decide(&doc, true, true), RouteDecision::Conversation);
    }

    #[test]
    fn commands_in_conversation_still_dispatch() {
        let router = Router::new();
        assert_eq!(
            router.decide(&command("cancel"), true, true),
            RouteDecision::Command(CommandKind::Cancel)
        );
        assert_eq!(
            router.decide(&command("add"), true, true),
            RouteDecision::Command(CommandKind::Add)
        );
    }

    #[test]
    fn help_text_lists_public_commands_only() {
        let router = Router::new();
        let help = router.help_text();
        assert!(help.contains("/add - Add a new torrent"));
        assert!(help.contains("/status - Show status of active torrents"));
        assert!(help.contains("/cancel - Cancels the current operation"));
        assert!(help.contains("/help - List all available commands"));
        assert!(!help.contains("/register"));
        assert!(!help.contains("/deregister"));
        assert!(!help.contains("/start"));
    }
}
