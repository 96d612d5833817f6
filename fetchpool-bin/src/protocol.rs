//! The line-based command protocol.
//!
//! Requests are single lines: a case-insensitive verb followed by optional
//! whitespace-separated arguments. Responses are single newline-terminated
//! lines.

/// A recognized command verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    Ping,
    Shutdown,
    /// Anything else, including an empty line
    Unknown,
}

/// A parsed request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Request {
    pub(crate) command: Command,
    /// Arguments after the verb; no current command uses them
    pub(crate) args: Vec<String>,
}

/// Parse one request line. Never fails: unrecognized input becomes
/// [`Command::Unknown`].
pub(crate) fn parse_line(line: &str) -> Request {
    let mut parts = line.split_whitespace();
    let command = match parts.next() {
        Some(verb) => match verb.to_ascii_uppercase().as_str() {
            "PING" => Command::Ping,
            "SHUTDOWN" => Command::Shutdown,
            _ => Command::Unknown,
        },
        None => Command::Unknown,
    };
    Request {
        command,
        args: parts.map(str::to_string).collect(),
    }
}

pub(crate) const PONG: &str = "PONG\n";
pub(crate) const BYE: &str = "BYE\n";
pub(crate) const ERR_UNKNOWN: &str = "ERR unknown command\n";
pub(crate) const ERR_RATE_LIMITED: &str = "ERR rate limited\n";
pub(crate) const ERR_LINE_TOO_LONG: &str = "ERR line too long\n";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_verb_is_case_insensitive() {
        assert_eq!(parse_line("PING").command, Command::Ping);
        assert_eq!(parse_line("ping").command, Command::Ping);
        assert_eq!(parse_line("  Shutdown  ").command, Command::Shutdown);
    }

    #[test]
    fn test_parse_collects_arguments() {
        let request = parse_line("PING one two");
        assert_eq!(request.command, Command::Ping);
        assert_eq!(request.args, vec!["one", "two"]);
    }

    #[test]
    fn test_parse_empty_and_garbage_lines() {
        assert_eq!(parse_line("").command, Command::Unknown);
        assert_eq!(parse_line("   ").command, Command::Unknown);
        assert_eq!(parse_line("FROBNICATE").command, Command::Unknown);
    }
}
