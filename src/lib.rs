//! ircd-server: a small IRC daemon built around a nickname trie
//!
//! Connected clients are kept in a prefix tree keyed by nickname, with RFC
//! 1459 case folding handled by a pluggable alphabet. The tree answers exact
//! lookups for message routing and resumable prefix scans for WHO.
//!
//! # Architecture
//!
//! - One OS thread per connection, each with its own mio event loop
//! - A single lock-protected registry shared by all connection threads
//! - Fixed 512-byte line framing and zero-copy message tokenizing
//! - Bounded per-client outbound queues with waker-based delivery

/// Client handles shared between connection threads
pub mod client;

/// Configuration management for the server
pub mod config;

/// Error types and result aliases
pub mod error;

/// Network layer for connection management
pub mod network;

/// IRC protocol implementation
pub mod protocol;

/// Thread-safe nickname registry
pub mod registry;

/// Core server implementation
pub mod server;

/// Prefix tree with pluggable alphabets
pub mod trie;

pub use config::Config;
pub use error::{Error, Result};
pub use registry::{Keyed, NickRegistry, Registry};
pub use server::{Server, ServerContext};
pub use trie::{Alphabet, NickAlphabet, PrefixCursor, Trie};
