use std::io;
use thiserror::Error;

/// Failures reported by the trie and the registry wrapped around it.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrieError {
    #[error("word contains characters outside the alphabet")]
    InvalidWord,

    #[error("out of memory while growing the trie")]
    NoMem,

    #[error("word already exists")]
    AlreadyExists,

    #[error("word not found")]
    NotFound,
}

/// Corrupt line terminator detected by the stream framer.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingError {
    #[error("malformed message terminator")]
    MalformedTerminator,
}

/// Message tokenizer rejections. Each one discards a single message.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxError {
    #[error("empty message")]
    Empty,

    #[error("empty prefix")]
    EmptyPrefix,

    #[error("message has no command")]
    MissingCommand,

    #[error("invalid command")]
    InvalidCommand,

    #[error("too many parameters")]
    TooManyParams,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Registry error: {0}")]
    Trie(#[from] TrieError),

    #[error("Framing error: {0}")]
    Framing(#[from] FramingError),

    #[error("Syntax error: {0}")]
    Syntax(#[from] SyntaxError),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Server shutting down")]
    Shutdown,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Render the error as an `ERROR` line sent right before closing a link
    pub fn to_irc(&self) -> Vec<u8> {
        match self {
            Error::Shutdown => b"ERROR :Server shutting down\r\n".to_vec(),
            Error::Framing(_) => b"ERROR :Malformed message terminator\r\n".to_vec(),
            _ => format!("ERROR :{}\r\n", self).into_bytes(),
        }
    }
}
