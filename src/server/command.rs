use std::net::SocketAddr;

use super::registry::SessionId;

/// Typed by a client to deliberately raise an `ERROR` log record.
pub const DIAGNOSTIC_TRIGGER: &str = "error";

pub const REJECT_NOTICE: &str = "Server is full, please try again later.";
pub const SHUTDOWN_NOTICE: &str = "Server is shutting down.";
pub const NO_OTHER_SESSIONS: &str = "No other sessions connected.";
pub const ECHO_PREFIX: &str = "Server echo: ";
/// Reply to the diagnostic trigger when error logging is switched off.
pub const DIAGNOSTIC_MUTED: &str = "Diagnostic logging is disabled; nothing was recorded.";
pub const HELP_TEXT: &str = "Commands: quit|exit - leave the server; list - show other sessions; \
help - show this text; any other text is echoed back.";

/// What a client message asks the session to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Quit,
    List,
    Help,
    Diagnostic,
    /// Whitespace only; ignored.
    Empty,
    /// Anything else, echoed back verbatim.
    Echo(&'a str),
}

impl<'a> Command<'a> {
    /// Matches the trimmed message case-sensitively against the command words.
    pub fn parse(message: &'a str) -> Self {
        match message.trim() {
            "quit" | "exit" => Command::Quit,
            "list" => Command::List,
            "help" => Command::Help,
            DIAGNOSTIC_TRIGGER => Command::Diagnostic,
            "" => Command::Empty,
            _ => Command::Echo(message),
        }
    }
}

pub fn welcome(id: SessionId, name: &str) -> String {
    format!("Welcome, {}! You are session {}.", name, id)
}

pub fn farewell(name: &str) -> String {
    format!("Goodbye, {}!", name)
}

pub fn echo(message: &str) -> String {
    format!("{}{}", ECHO_PREFIX, message)
}

pub fn error_reply(message: &str) -> String {
    format!("Error: {}", message)
}

/// Lists every session in `sessions` except `own`.
pub fn list_reply(own: SessionId, sessions: &[(SessionId, SocketAddr)]) -> String {
    let others: Vec<String> = sessions
        .iter()
        .filter(|(id, _)| *id != own)
        .map(|(id, addr)| format!("[{}] {}", id, addr))
        .collect();

    if others.is_empty() {
        NO_OTHER_SESSIONS.to_string()
    } else {
        format!("Other sessions: {}", others.join(", "))
    }
}
