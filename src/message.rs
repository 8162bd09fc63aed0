//! Chat commands and server texts
//!
//! Inbound payloads are plain text. A payload whose first word is one of
//! the known command tokens is a command; everything else is chat.

/// Sender name on every frame the server originates
pub const SERVER_NAME: &str = "SERVER";

pub const DISCONNECT: &str = "/disconnect";
pub const HELP: &str = "/help";
pub const MOVE: &str = "/move";
pub const LEAVE: &str = "/leave";
pub const ROOMS: &str = "/rooms";

/// Longest accepted room name, in characters
pub const MAX_ROOM_NAME_CHARS: usize = 64;

/// Longest accepted display name, in characters
pub const MAX_DISPLAY_NAME_CHARS: usize = 32;

pub const HELP_TEXT: &str = "\
Commands:
  /help           show this message
  /move <room>    move to another room
  /leave          return to the default room
  /rooms          list everyone and the room they are in
  /disconnect     leave the chat";

/// A classified inbound payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Disconnect,
    Help,
    /// Move to a room; the argument is trimmed and may be empty
    Move(String),
    Leave,
    ListRooms,
    Chat(String),
}

impl Command {
    /// Classify a payload
    ///
    /// Commands without an argument only match when nothing follows the
    /// token, so "/help me" is chat. Chat keeps its leading whitespace;
    /// only the trailing line break is dropped.
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        let (token, rest) = match trimmed.split_once(char::is_whitespace) {
            Some((token, rest)) => (token, rest.trim()),
            None => (trimmed, ""),
        };

        match (token, rest.is_empty()) {
            (DISCONNECT, true) => Command::Disconnect,
            (HELP, true) => Command::Help,
            (LEAVE, true) => Command::Leave,
            (ROOMS, true) => Command::ListRooms,
            (MOVE, _) => Command::Move(rest.to_string()),
            _ => Command::Chat(text.trim_end().to_string()),
        }
    }
}

/// Why a room name was refused
pub fn room_name_problem(room: &str) -> Option<&'static str> {
    if room.is_empty() {
        Some("Room name cannot be empty")
    } else if room.chars().count() > MAX_ROOM_NAME_CHARS {
        Some("Room name is too long")
    } else if room.chars().any(char::is_control) {
        Some("Room name contains invalid characters")
    } else {
        None
    }
}

/// Why a display name was refused
///
/// Names end up inside notices and the `/rooms` table, so line breaks and
/// other control characters are not allowed.
pub fn display_name_problem(name: &str) -> Option<&'static str> {
    if name.is_empty() {
        Some("Name cannot be empty")
    } else if name.chars().count() > MAX_DISPLAY_NAME_CHARS {
        Some("Name is too long")
    } else if name.chars().any(char::is_control) {
        Some("Name contains invalid characters")
    } else {
        None
    }
}

pub fn welcome() -> String {
    format!(
        "Connected to server. To disconnect type: {}\n{}",
        DISCONNECT, HELP_TEXT
    )
}

pub fn chat_line(name: &str, text: &str) -> String {
    format!("{}: {}", name, text)
}

pub fn left_notice(name: &str) -> String {
    format!("{} has left the chat", name)
}

pub fn entered_notice(name: &str) -> String {
    format!("{} has entered the chat", name)
}

pub fn error_reply(reason: &str) -> String {
    format!("Error: {}", reason)
}

/// Two-column table of `(name, room)` rows
pub fn rooms_table<'a>(rows: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let rows: Vec<(&str, &str)> = rows.into_iter().collect();
    let width = rows
        .iter()
        .map(|(name, _)| name.chars().count())
        .chain(std::iter::once("Name".len()))
        .max()
        .unwrap_or(0);

    let mut table = format!("{:<width$}  {}", "Name", "Room", width = width);
    for (name, room) in rows {
        table.push('\n');
        table.push_str(&format!("{:<width$}  {}", name, room, width = width));
    }
    table
}
