use super::MAX_PARAMS;
use crate::error::SyntaxError;
use std::str;

/// A tokenized IRC message.
///
/// Every field borrows from the line it was parsed from; no bytes are copied.
/// Only syntax is checked here, never what a command means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message<'a> {
    pub prefix: Option<&'a [u8]>,
    pub command: &'a str,
    pub params: Vec<&'a [u8]>,
}

impl<'a> Message<'a> {
    /// Split a line into prefix, command and parameters.
    ///
    /// A trailing `\r\n` is ignored. The command is either exactly three
    /// digits or a run of letters. A parameter starting with `:` takes the
    /// rest of the line, minus any spaces right after the colon.
    pub fn parse(line: &'a [u8]) -> Result<Self, SyntaxError> {
        let line = line.strip_suffix(b"\r\n").unwrap_or(line);
        let mut rest = skip_spaces(line);
        if rest.is_empty() {
            return Err(SyntaxError::Empty);
        }

        let mut prefix = None;
        if let Some(after_colon) = rest.strip_prefix(b":") {
            let (token, remainder) = split_token(after_colon);
            if token.is_empty() {
                return Err(SyntaxError::EmptyPrefix);
            }
            if remainder.is_empty() {
                return Err(SyntaxError::MissingCommand);
            }
            prefix = Some(token);
            rest = skip_spaces(remainder);
            if rest.is_empty() {
                return Err(SyntaxError::MissingCommand);
            }
        }

        let command_len = command_len(rest)?;
        let command =
            str::from_utf8(&rest[..command_len]).map_err(|_| SyntaxError::InvalidCommand)?;
        let params = read_params(&rest[command_len..])?;

        Ok(Self {
            prefix,
            command,
            params,
        })
    }

    /// Parameter `i` as text, if present and valid UTF-8
    pub fn param(&self, i: usize) -> Option<&'a str> {
        self.params.get(i).and_then(|p| str::from_utf8(p).ok())
    }

    /// Parameter `i` as text, replacing invalid UTF-8
    pub fn param_lossy(&self, i: usize) -> Option<std::borrow::Cow<'a, str>> {
        self.params.get(i).map(|p| String::from_utf8_lossy(p))
    }

    pub fn is_numeric(&self) -> bool {
        self.command.bytes().all(|b| b.is_ascii_digit())
    }
}

fn skip_spaces(buf: &[u8]) -> &[u8] {
    let start = buf.iter().position(|&b| b != b' ').unwrap_or(buf.len());
    &buf[start..]
}

// Token up to the next space, and what follows that space
fn split_token(buf: &[u8]) -> (&[u8], &[u8]) {
    match buf.iter().position(|&b| b == b' ') {
        Some(end) => (&buf[..end], &buf[end + 1..]),
        None => (buf, &[]),
    }
}

fn command_len(buf: &[u8]) -> Result<usize, SyntaxError> {
    let len = if buf[0].is_ascii_digit() {
        if buf.len() < 3 || !buf[..3].iter().all(u8::is_ascii_digit) {
            return Err(SyntaxError::InvalidCommand);
        }
        3
    } else {
        buf.iter()
            .position(|b| !b.is_ascii_alphabetic())
            .unwrap_or(buf.len())
    };

    match buf.get(len) {
        None | Some(b' ') if len > 0 => Ok(len),
        _ => Err(SyntaxError::InvalidCommand),
    }
}

// `buf` starts right after the command: empty or a space
fn read_params(buf: &[u8]) -> Result<Vec<&[u8]>, SyntaxError> {
    let mut params = Vec::new();
    let mut rest = skip_spaces(buf);

    while !rest.is_empty() && rest[0] != b':' {
        if params.len() == MAX_PARAMS {
            return Err(SyntaxError::TooManyParams);
        }
        let (token, remainder) = split_token(rest);
        params.push(token);
        rest = skip_spaces(remainder);
    }

    if let Some(trailing) = rest.strip_prefix(b":") {
        if params.len() == MAX_PARAMS {
            return Err(SyntaxError::TooManyParams);
        }
        params.push(skip_spaces(trailing));
    }

    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params<'a>(msg: &Message<'a>) -> Vec<&'a str> {
        (0..msg.params.len()).filter_map(|i| msg.param(i)).collect()
    }

    #[test]
    fn test_prefix_command_and_trailing() {
        let msg = Message::parse(b":nick!user@host PRIVMSG #chan :hello world").unwrap();
        assert_eq!(msg.prefix, Some(&b"nick!user@host"[..]));
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(params(&msg), vec!["#chan", "hello world"]);
    }

    #[test]
    fn test_terminator_is_stripped() {
        let msg = Message::parse(b"PING :irc.example.org\r\n").unwrap();
        assert_eq!(msg.prefix, None);
        assert_eq!(msg.command, "PING");
        assert_eq!(params(&msg), vec!["irc.example.org"]);
    }

    #[test]
    fn test_spaces_are_collapsed() {
        let msg = Message::parse(b"   USER   guest  0 *   :  Real  Name ").unwrap();
        assert_eq!(msg.command, "USER");
        assert_eq!(params(&msg), vec!["guest", "0", "*", "Real  Name "]);
    }

    #[test]
    fn test_numeric_command() {
        let msg = Message::parse(b":server 001 alice :Welcome").unwrap();
        assert_eq!(msg.command, "001");
        assert!(msg.is_numeric());
        assert_eq!(params(&msg), vec!["alice", "Welcome"]);

        assert_eq!(Message::parse(b"01 x"), Err(SyntaxError::InvalidCommand));
        assert_eq!(Message::parse(b"0012 x"), Err(SyntaxError::InvalidCommand));
        assert_eq!(Message::parse(b"00a"), Err(SyntaxError::InvalidCommand));
        assert_eq!(Message::parse(b"404").map(|m| m.command), Ok("404"));
    }

    #[test]
    fn test_invalid_commands() {
        assert_eq!(Message::parse(b"PRIV1MSG x"), Err(SyntaxError::InvalidCommand));
        assert_eq!(Message::parse(b"#chan"), Err(SyntaxError::InvalidCommand));
        assert_eq!(Message::parse(b"NICK:bob"), Err(SyntaxError::InvalidCommand));
    }

    #[test]
    fn test_prefix_errors() {
        assert_eq!(Message::parse(b": PING"), Err(SyntaxError::EmptyPrefix));
        assert_eq!(Message::parse(b":"), Err(SyntaxError::EmptyPrefix));
        assert_eq!(Message::parse(b":only.prefix"), Err(SyntaxError::MissingCommand));
        assert_eq!(Message::parse(b":only.prefix   "), Err(SyntaxError::MissingCommand));
        assert_eq!(Message::parse(b""), Err(SyntaxError::Empty));
        assert_eq!(Message::parse(b"   \r\n"), Err(SyntaxError::Empty));
    }

    #[test]
    fn test_empty_trailing_parameter() {
        let msg = Message::parse(b"PRIVMSG bob :").unwrap();
        assert_eq!(msg.params.len(), 2);
        assert_eq!(msg.param(1), Some(""));
    }

    #[test]
    fn test_parameter_limit() {
        let fifteen = format!("CMD{}", " p".repeat(15));
        assert_eq!(Message::parse(fifteen.as_bytes()).unwrap().params.len(), 15);

        let sixteen = format!("CMD{}", " p".repeat(16));
        assert_eq!(
            Message::parse(sixteen.as_bytes()),
            Err(SyntaxError::TooManyParams)
        );

        let trailing = format!("CMD{} :last one", " p".repeat(14));
        assert_eq!(Message::parse(trailing.as_bytes()).unwrap().params.len(), 15);

        let overflow = format!("CMD{} :last one", " p".repeat(15));
        assert_eq!(
            Message::parse(overflow.as_bytes()),
            Err(SyntaxError::TooManyParams)
        );
    }

    #[test]
    fn test_no_params() {
        let msg = Message::parse(b"QUIT").unwrap();
        assert!(msg.params.is_empty());
        let msg = Message::parse(b"QUIT   ").unwrap();
        assert!(msg.params.is_empty());
    }

    #[test]
    fn test_non_utf8_parameters_are_kept() {
        let msg = Message::parse(b"PRIVMSG bob :caf\xe9").unwrap();
        assert_eq!(msg.param(1), None);
        assert_eq!(msg.param_lossy(1).as_deref(), Some("caf\u{fffd}"));
    }
}
