//! Numeric replies and outgoing line formatting.

use super::MAX_MSG_SIZE;
use bytes::Bytes;

pub const RPL_WELCOME: &str = "001";
pub const RPL_YOURHOST: &str = "002";
pub const RPL_CREATED: &str = "003";
pub const RPL_MYINFO: &str = "004";
pub const RPL_LUSERCLIENT: &str = "251";
pub const RPL_ISON: &str = "303";
pub const RPL_ENDOFWHO: &str = "315";
pub const RPL_WHOREPLY: &str = "352";
pub const RPL_MOTD: &str = "372";
pub const RPL_MOTDSTART: &str = "375";
pub const RPL_ENDOFMOTD: &str = "376";

pub const ERR_NOSUCHNICK: &str = "401";
pub const ERR_NOORIGIN: &str = "409";
pub const ERR_NORECIPIENT: &str = "411";
pub const ERR_NOTEXTTOSEND: &str = "412";
pub const ERR_UNKNOWNCOMMAND: &str = "421";
pub const ERR_NOMOTD: &str = "422";
pub const ERR_NONICKNAMEGIVEN: &str = "431";
pub const ERR_ERRONEUSNICKNAME: &str = "432";
pub const ERR_NICKNAMEINUSE: &str = "433";
pub const ERR_NOTREGISTERED: &str = "451";
pub const ERR_NEEDMOREPARAMS: &str = "461";
pub const ERR_ALREADYREGISTRED: &str = "462";

/// Append one line built from `parts`, cut so that it fits in a message
/// together with the `\r\n` that ends it.
///
/// CR, LF and NUL inside the parts are dropped: the only line break on the
/// wire is the one added here.
pub fn write_line(out: &mut Vec<u8>, parts: &[&[u8]]) {
    let start = out.len();
    for part in parts {
        if memchr::memchr3(b'\r', b'\n', 0, part).is_some() {
            out.extend(part.iter().filter(|&&c| !matches!(c, b'\r' | b'\n' | 0)));
        } else {
            out.extend_from_slice(part);
        }
    }
    let body = (out.len() - start).min(MAX_MSG_SIZE - 2);
    out.truncate(start + body);
    out.extend_from_slice(b"\r\n");
}

/// `:<server> <code> <target> <body>`
pub fn numeric(out: &mut Vec<u8>, server: &str, code: &str, target: &str, body: &str) {
    write_line(
        out,
        &[
            b":",
            server.as_bytes(),
            b" ",
            code.as_bytes(),
            b" ",
            target.as_bytes(),
            b" ",
            body.as_bytes(),
        ],
    );
}

/// Registration burst: 001 through 004
pub fn welcome(out: &mut Vec<u8>, server: &str, nick: &str, user: &str, host: &str, created: &str) {
    numeric(
        out,
        server,
        RPL_WELCOME,
        nick,
        &format!(":Welcome to the Internet Relay Network {nick}!{user}@{host}"),
    );
    numeric(
        out,
        server,
        RPL_YOURHOST,
        nick,
        &format!(
            ":Your host is {server}, running version {}",
            env!("CARGO_PKG_VERSION")
        ),
    );
    numeric(
        out,
        server,
        RPL_CREATED,
        nick,
        &format!(":This server was created {created}"),
    );
    numeric(
        out,
        server,
        RPL_MYINFO,
        nick,
        &format!("{server} {} i -", env!("CARGO_PKG_VERSION")),
    );
}

pub fn motd(out: &mut Vec<u8>, server: &str, nick: &str, lines: &[String]) {
    if lines.is_empty() {
        numeric(out, server, ERR_NOMOTD, nick, ":MOTD File is missing");
        return;
    }
    numeric(
        out,
        server,
        RPL_MOTDSTART,
        nick,
        &format!(":- {server} Message of the day - "),
    );
    for line in lines {
        numeric(out, server, RPL_MOTD, nick, &format!(":- {line}"));
    }
    numeric(out, server, RPL_ENDOFMOTD, nick, ":End of /MOTD command");
}

pub fn luser_client(out: &mut Vec<u8>, server: &str, nick: &str, users: usize) {
    let mut count = itoa::Buffer::new();
    numeric(
        out,
        server,
        RPL_LUSERCLIENT,
        nick,
        &format!(
            ":There are {} users and 0 services on 1 servers",
            count.format(users)
        ),
    );
}

/// `:<nick>!<user>@<host> <command> <target> :<text>`, ready to be queued on
/// another client
pub fn relay(source: &str, command: &str, target: &str, text: &[u8]) -> Bytes {
    let mut line = Vec::with_capacity(MAX_MSG_SIZE);
    write_line(
        &mut line,
        &[
            b":",
            source.as_bytes(),
            b" ",
            command.as_bytes(),
            b" ",
            target.as_bytes(),
            b" :",
            text,
        ],
    );
    Bytes::from(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_format() {
        let mut out = Vec::new();
        numeric(&mut out, "irc.test", ERR_NOSUCHNICK, "alice", "bob :No such nick/channel");
        assert_eq!(out, b":irc.test 401 alice bob :No such nick/channel\r\n");
    }

    #[test]
    fn test_lines_are_capped() {
        let mut out = Vec::new();
        let long = "x".repeat(2 * MAX_MSG_SIZE);
        numeric(&mut out, "irc.test", RPL_MOTD, "alice", &long);
        assert_eq!(out.len(), MAX_MSG_SIZE);
        assert!(out.ends_with(b"xx\r\n"));
    }

    #[test]
    fn test_motd_lines_and_missing() {
        let mut out = Vec::new();
        motd(&mut out, "irc.test", "alice", &["hello".to_string()]);
        let text = String::from_utf8(out).unwrap();
        let codes: Vec<&str> = text
            .lines()
            .map(|l| l.split(' ').nth(1).unwrap_or_default())
            .collect();
        assert_eq!(codes, vec![RPL_MOTDSTART, RPL_MOTD, RPL_ENDOFMOTD]);
        assert!(text.contains(":- hello\r\n"));

        let mut out = Vec::new();
        motd(&mut out, "irc.test", "alice", &[]);
        assert!(out.starts_with(b":irc.test 422 alice"));
    }

    #[test]
    fn test_welcome_burst() {
        let mut out = Vec::new();
        welcome(&mut out, "irc.test", "alice", "al", "localhost", "today");
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 4);
        assert!(text.starts_with(
            ":irc.test 001 alice :Welcome to the Internet Relay Network alice!al@localhost\r\n"
        ));
    }

    #[test]
    fn test_relay_line() {
        let line = relay("bob!b@host", "PRIVMSG", "alice", b"hi there");
        assert_eq!(&line[..], b":bob!b@host PRIVMSG alice :hi there\r\n");
    }

    #[test]
    fn test_line_breaks_inside_parts_are_dropped() {
        let line = relay("bob!b@host", "PRIVMSG", "alice", b"hi\r:x!x@x KILL\n\0 you");
        assert_eq!(&line[..], b":bob!b@host PRIVMSG alice :hi:x!x@x KILL you\r\n");
    }
}
