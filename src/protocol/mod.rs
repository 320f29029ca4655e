//! IRC wire protocol: framing, tokenizing, command table and replies.

pub mod command;
pub mod framer;
pub mod message;
pub mod reply;

pub use command::{CommandExecutor, CommandKind};
pub use framer::{Fill, Framer};
pub use message::Message;

/// Maximum message length, `\r\n` included
pub const MAX_MSG_SIZE: usize = 512;

/// Maximum number of parameters in one message
pub const MAX_PARAMS: usize = 15;

/// Maximum nickname length
pub const MAX_NICK_LENGTH: usize = 9;
