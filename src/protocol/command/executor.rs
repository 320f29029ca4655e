use super::CommandKind;
use crate::client::{Client, Ident};
use crate::error::TrieError;
use crate::protocol::reply::{self, *};
use crate::protocol::{Message, MAX_NICK_LENGTH};
use crate::server::ServerContext;
use crate::trie::{Alphabet, NickAlphabet, PrefixCursor};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Upper bound on 352 lines sent for one WHO
const MAX_WHO_REPLIES: usize = 100;

/// Simple glob pattern matching (`*` and `?`) over bytes
fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let mut p_idx = 0;
    let mut t_idx = 0;
    // Position of the last `*` and the text index it is currently matched up to
    let mut backtrack: Option<(usize, usize)> = None;

    while t_idx < text.len() {
        match pattern.get(p_idx) {
            Some(b'*') => {
                backtrack = Some((p_idx, t_idx));
                p_idx += 1;
            }
            Some(&c) if c == b'?' || c == text[t_idx] => {
                p_idx += 1;
                t_idx += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p_idx = star + 1;
                    t_idx = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p_idx.min(pattern.len())..].iter().all(|&c| c == b'*')
}

/// Extract the literal prefix from a mask (everything before the first wildcard)
fn extract_prefix(pattern: &str) -> &str {
    for (i, ch) in pattern.char_indices() {
        if ch == '*' || ch == '?' {
            return &pattern[..i];
        }
    }
    pattern
}

fn fold(text: &str) -> Vec<u8> {
    text.bytes().map(|c| NickAlphabet.canonical(c)).collect()
}

/// Executes parsed IRC commands on behalf of one client
///
/// Replies for the client itself are appended to the caller's buffer; lines
/// for other clients go through their outbound queues.
pub struct CommandExecutor {
    ctx: Arc<ServerContext>,
    client: Arc<Client>,
    registered: bool,
    quit: bool,
}

impl CommandExecutor {
    pub fn new(ctx: Arc<ServerContext>, client: Arc<Client>) -> Self {
        Self {
            ctx,
            client,
            registered: false,
            quit: false,
        }
    }

    pub fn client(&self) -> &Arc<Client> {
        &self.client
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// True once the client sent QUIT
    pub fn has_quit(&self) -> bool {
        self.quit
    }

    /// Execute one message, appending any direct replies to `out`
    pub fn execute(&mut self, msg: &Message<'_>, out: &mut Vec<u8>) {
        let Some(kind) = CommandKind::lookup(msg.command) else {
            if msg.is_numeric() {
                debug!(
                    "Ignoring numeric {} from client {}",
                    msg.command, self.client.id
                );
            } else {
                let body = format!("{} :Unknown command", msg.command);
                self.numeric(out, ERR_UNKNOWNCOMMAND, &body);
            }
            return;
        };

        if !self.registered && !kind.is_allowed_unregistered() {
            self.numeric(out, ERR_NOTREGISTERED, ":You have not registered");
            return;
        }

        match kind {
            CommandKind::Nick => self.nick(msg, out),
            CommandKind::User => self.user(msg, out),
            CommandKind::Privmsg | CommandKind::Notice => self.message(kind, msg, out),
            CommandKind::Ping => self.ping(msg, out),
            CommandKind::Pong => {}
            CommandKind::Quit => self.quit(msg, out),
            CommandKind::Motd => {
                let target = self.target();
                reply::motd(out, self.server(), &target, &self.ctx.config.motd);
            }
            CommandKind::Lusers => {
                let target = self.target();
                reply::luser_client(out, self.server(), &target, self.ctx.registry.len());
            }
            CommandKind::Ison => self.ison(msg, out),
            CommandKind::Who => self.who(msg, out),
        }
    }

    /// Release the client's nickname. Safe to call more than once.
    pub fn disconnect(&mut self) {
        if let Some(removed) = self.ctx.registry.delete(&self.client) {
            debug!(
                "Released nickname of client {} ({:?})",
                self.client.id,
                removed.nick()
            );
        }
        self.registered = false;
    }

    fn server(&self) -> &str {
        &self.ctx.config.server_name
    }

    // Nickname used as the target of numerics; `*` until one is set
    fn target(&self) -> String {
        self.client.nick().unwrap_or_else(|| "*".to_string())
    }

    fn numeric(&self, out: &mut Vec<u8>, code: &str, body: &str) {
        reply::numeric(out, self.server(), code, &self.target(), body);
    }

    fn nick(&mut self, msg: &Message<'_>, out: &mut Vec<u8>) {
        let nick = match msg.param_lossy(0) {
            Some(nick) if !nick.is_empty() => nick,
            _ => {
                self.numeric(out, ERR_NONICKNAMEGIVEN, ":No nickname given");
                return;
            }
        };
        let erroneous = format!("{} :Erroneous nickname", nick);
        if nick.len() > MAX_NICK_LENGTH {
            self.numeric(out, ERR_ERRONEUSNICKNAME, &erroneous);
            return;
        }

        let current = self.client.nick();
        if let Some(current) = &current {
            // Same key under folding: only the spelling changes
            if NickAlphabet.same_word(current, &nick) {
                if current.as_str() != nick {
                    self.change_nick(current.as_str(), &nick, out);
                }
                return;
            }
        }

        match self
            .ctx
            .registry
            .add_if_absent(Arc::clone(&self.client), &nick)
        {
            Ok(()) => {}
            Err(TrieError::AlreadyExists) => {
                let body = format!("{} :Nickname is already in use", nick);
                self.numeric(out, ERR_NICKNAMEINUSE, &body);
                return;
            }
            Err(TrieError::InvalidWord) => {
                self.numeric(out, ERR_ERRONEUSNICKNAME, &erroneous);
                return;
            }
            Err(e) => {
                warn!("Failed to register nickname {}: {}", nick, e);
                return;
            }
        }

        match current {
            Some(old) => {
                if let Err(e) = self.ctx.registry.delete_key(&old) {
                    warn!("Previous nickname {} was not registered: {}", old, e);
                }
                self.change_nick(&old, &nick, out);
            }
            None => {
                self.client.set_nick(Some(nick.into_owned()));
                self.try_register(out);
            }
        }
    }

    fn change_nick(&mut self, old: &str, new: &str, out: &mut Vec<u8>) {
        let source = self.client.source();
        self.client.set_nick(Some(new.to_string()));
        debug!("Client {} renamed {} -> {}", self.client.id, old, new);
        if self.registered {
            reply::write_line(
                out,
                &[b":", source.as_bytes(), b" NICK :", new.as_bytes()],
            );
        } else {
            self.try_register(out);
        }
    }

    fn user(&mut self, msg: &Message<'_>, out: &mut Vec<u8>) {
        if self.registered || self.client.ident().is_some() {
            self.numeric(
                out,
                ERR_ALREADYREGISTRED,
                ":Unauthorized command (already registered)",
            );
            return;
        }

        let (username, realname) = match (msg.param_lossy(0), msg.param_lossy(3)) {
            (Some(username), Some(realname)) if !username.is_empty() => (username, realname),
            _ => {
                self.numeric(out, ERR_NEEDMOREPARAMS, "USER :Not enough parameters");
                return;
            }
        };

        self.client.set_ident(Ident {
            username: username.into_owned(),
            realname: realname.into_owned(),
        });
        self.try_register(out);
    }

    fn try_register(&mut self, out: &mut Vec<u8>) {
        if self.registered {
            return;
        }
        let (Some(nick), Some(ident)) = (self.client.nick(), self.client.ident()) else {
            return;
        };

        self.registered = true;
        info!(
            "Client {} registered as {}!{}@{}",
            self.client.id,
            nick,
            ident.username,
            self.client.host()
        );
        reply::welcome(
            out,
            self.server(),
            &nick,
            &ident.username,
            &self.client.host(),
            &self.ctx.created,
        );
        reply::motd(out, self.server(), &nick, &self.ctx.config.motd);
    }

    fn message(&mut self, kind: CommandKind, msg: &Message<'_>, out: &mut Vec<u8>) {
        let notice = kind == CommandKind::Notice;

        let targets = match msg.param_lossy(0) {
            Some(targets) => targets,
            None => {
                if !notice {
                    let body = format!(":No recipient given ({})", kind.name());
                    self.numeric(out, ERR_NORECIPIENT, &body);
                }
                return;
            }
        };
        let text = match msg.params.get(1) {
            Some(text) if !text.is_empty() => *text,
            _ => {
                if !notice {
                    self.numeric(out, ERR_NOTEXTTOSEND, ":No text to send");
                }
                return;
            }
        };

        let source = self.client.source();
        for target in targets.split(',').filter(|t| !t.is_empty()) {
            let line = reply::relay(&source, kind.name(), target, text);
            let delivered = self
                .ctx
                .registry
                .find_and_execute(target, |to| to.enqueue(line));

            match delivered {
                Some(true) => {}
                Some(false) => debug!("{} to {} was dropped", kind.name(), target),
                None if !notice => {
                    let body = format!("{} :No such nick/channel", target);
                    self.numeric(out, ERR_NOSUCHNICK, &body);
                }
                None => {}
            }
        }
    }

    fn ping(&mut self, msg: &Message<'_>, out: &mut Vec<u8>) {
        let Some(&token) = msg.params.first() else {
            self.numeric(out, ERR_NOORIGIN, ":No origin specified");
            return;
        };
        let server = self.server().as_bytes();
        reply::write_line(out, &[b":", server, b" PONG ", server, b" :", token]);
    }

    fn quit(&mut self, msg: &Message<'_>, out: &mut Vec<u8>) {
        let reason = msg
            .param_lossy(0)
            .map(|r| r.into_owned())
            .unwrap_or_else(|| "Client Quit".to_string());
        info!("Client {} quit: {}", self.client.id, reason);

        let host = self.client.host();
        reply::write_line(
            out,
            &[
                b"ERROR :Closing Link: ",
                host.as_bytes(),
                b" (Quit: ",
                reason.as_bytes(),
                b")",
            ],
        );
        self.quit = true;
    }

    fn ison(&mut self, msg: &Message<'_>, out: &mut Vec<u8>) {
        if msg.params.is_empty() {
            self.numeric(out, ERR_NEEDMOREPARAMS, "ISON :Not enough parameters");
            return;
        }

        let mut online = Vec::new();
        for i in 0..msg.params.len() {
            let Some(param) = msg.param_lossy(i) else {
                continue;
            };
            for nick in param.split(' ').filter(|n| !n.is_empty()) {
                if let Some(Some(current)) = self.ctx.registry.find_and_execute(nick, |c| c.nick())
                {
                    online.push(current);
                }
            }
        }

        let body = format!(":{}", online.join(" "));
        self.numeric(out, RPL_ISON, &body);
    }

    fn who(&mut self, msg: &Message<'_>, out: &mut Vec<u8>) {
        let mask = match msg.param_lossy(0) {
            Some(mask) if !mask.is_empty() && mask != "0" => mask.into_owned(),
            _ => "*".to_string(),
        };
        let pattern = fold(&mask);
        let mut cursor = PrefixCursor::new(extract_prefix(&mask), MAX_NICK_LENGTH + 1);

        let mut sent = 0;
        while sent < MAX_WHO_REPLIES {
            let (key, client) = match self.ctx.registry.prefix_search_next(&mut cursor) {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    debug!("WHO {} matches no nickname: {}", mask, e);
                    break;
                }
            };
            if !glob_match(&pattern, &fold(&key)) {
                continue;
            }

            let nick = client.nick().unwrap_or(key);
            let (user, realname) = match client.ident() {
                Some(ident) => (ident.username, ident.realname),
                None => ("*".to_string(), String::new()),
            };
            let body = format!(
                "* {} {} {} {} H :0 {}",
                user,
                client.host(),
                self.server(),
                nick,
                realname
            );
            self.numeric(out, RPL_WHOREPLY, &body);
            sent += 1;
        }

        let body = format!("{} :End of WHO list", mask);
        self.numeric(out, RPL_ENDOFWHO, &body);
    }
}
