//! Parsing of lines typed into the chat prompt.

/// What a line of input asks for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Input {
    /// Nothing to do (blank line).
    Empty,
    /// Send this text as a chat message.
    Message(String),
    /// Leave the chat.
    Quit,
    /// Drop the current channel and open a fresh one for the same session.
    Reconnect,
    /// Print the whole transcript.
    Log,
    /// Print the command list.
    Help,
    /// A slash command we don't know.
    Unknown(String),
}

/// Help text for the chat prompt.
pub const HELP: &str = "\
commands:
  /log        show the transcript so far
  /reconnect  reconnect to the current session
  /quit       leave the chat
  //text      send a message that starts with '/'";

/// Classify one line of input.
///
/// Trailing newline characters are dropped; otherwise message text is sent
/// as typed. A leading `//` escapes a message that starts with `/`.
pub fn parse_line(line: &str) -> Input {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Input::Empty;
    }
    if let Some(escaped) = line.strip_prefix("//") {
        return Input::Message(format!("/{escaped}"));
    }
    let Some(command) = line.trim().strip_prefix('/') else {
        return Input::Message(line.to_string());
    };
    match command.trim() {
        "quit" | "exit" | "q" => Input::Quit,
        "reconnect" => Input::Reconnect,
        "log" | "history" => Input::Log,
        "help" | "?" => Input::Help,
        other => Input::Unknown(other.to_string()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_lines_are_empty() {
        assert_eq!(parse_line(""), Input::Empty);
        assert_eq!(parse_line("   \n"), Input::Empty);
    }

    #[test]
    fn text_is_sent_as_typed() {
        assert_eq!(
            parse_line("  I had a rough day \n"),
            Input::Message("  I had a rough day ".into())
        );
    }

    #[test]
    fn commands() {
        assert_eq!(parse_line("/quit"), Input::Quit);
        assert_eq!(parse_line("/exit\r\n"), Input::Quit);
        assert_eq!(parse_line("/reconnect"), Input::Reconnect);
        assert_eq!(parse_line(" /log "), Input::Log);
        assert_eq!(parse_line("/help"), Input::Help);
        assert_eq!(parse_line("/dance"), Input::Unknown("dance".into()));
    }

    #[test]
    fn double_slash_escapes() {
        assert_eq!(parse_line("//shrug"), Input::Message("/shrug".into()));
    }
}
