use crate::trie::{CommandAlphabet, Trie};
use once_cell::sync::Lazy;
use tracing::error;

mod executor;

pub use executor::CommandExecutor;

/// Commands the daemon understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    // Registration
    Nick,
    User,

    // Messaging
    Privmsg,
    Notice,

    // Connection
    Ping,
    Pong,
    Quit,

    // Queries
    Motd,
    Lusers,
    Ison,
    Who,
}

const ALL: [CommandKind; 11] = [
    CommandKind::Nick,
    CommandKind::User,
    CommandKind::Privmsg,
    CommandKind::Notice,
    CommandKind::Ping,
    CommandKind::Pong,
    CommandKind::Quit,
    CommandKind::Motd,
    CommandKind::Lusers,
    CommandKind::Ison,
    CommandKind::Who,
];

// Command names fold case through the alphabet, so `privmsg` finds PRIVMSG
static COMMANDS: Lazy<Trie<CommandKind, CommandAlphabet>> = Lazy::new(|| {
    let mut table = Trie::new(CommandAlphabet);
    for kind in ALL {
        if let Err(e) = table.add(kind.name(), kind) {
            error!("Failed to register command {}: {}", kind.name(), e);
        }
    }
    table
});

impl CommandKind {
    /// Look up a command by name, ignoring case
    #[inline]
    pub fn lookup(name: &str) -> Option<Self> {
        COMMANDS.find(name).copied()
    }

    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::Nick => "NICK",
            CommandKind::User => "USER",
            CommandKind::Privmsg => "PRIVMSG",
            CommandKind::Notice => "NOTICE",
            CommandKind::Ping => "PING",
            CommandKind::Pong => "PONG",
            CommandKind::Quit => "QUIT",
            CommandKind::Motd => "MOTD",
            CommandKind::Lusers => "LUSERS",
            CommandKind::Ison => "ISON",
            CommandKind::Who => "WHO",
        }
    }

    /// Check if this command may be sent before registration completes
    pub fn is_allowed_unregistered(&self) -> bool {
        matches!(
            self,
            CommandKind::Nick
                | CommandKind::User
                | CommandKind::Ping
                | CommandKind::Pong
                | CommandKind::Quit
        )
    }
}
