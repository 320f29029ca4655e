use crate::registry::Keyed;
use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use mio::Waker;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

static CLIENT_ID: AtomicUsize = AtomicUsize::new(0);

/// What USER told us
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub username: String,
    pub realname: String,
}

/// Shared handle to one connected client.
///
/// The registry stores `Arc<Client>` under the client's nickname. Other
/// connection threads use the handle to queue lines for this client; only
/// the owning thread ever reads the queue.
pub struct Client {
    pub id: usize,
    pub addr: Option<SocketAddr>,
    pub connected_at: Instant,
    nick: Mutex<Option<String>>,
    ident: Mutex<Option<Ident>>,
    outbound: Sender<Bytes>,
    waker: Option<Waker>,
}

impl Client {
    /// Create a client whose outbound queue holds at most `queue_depth`
    /// lines. The receiving end goes to the connection that owns the socket.
    pub fn new(
        addr: Option<SocketAddr>,
        queue_depth: usize,
        waker: Option<Waker>,
    ) -> (Arc<Self>, Receiver<Bytes>) {
        let (outbound, inbox) = crossbeam_channel::bounded(queue_depth);
        let client = Arc::new(Self {
            id: CLIENT_ID.fetch_add(1, Ordering::Relaxed),
            addr,
            connected_at: Instant::now(),
            nick: Mutex::new(None),
            ident: Mutex::new(None),
            outbound,
            waker,
        });
        (client, inbox)
    }

    pub fn nick(&self) -> Option<String> {
        self.nick.lock().clone()
    }

    pub fn set_nick(&self, nick: Option<String>) {
        *self.nick.lock() = nick;
    }

    pub fn ident(&self) -> Option<Ident> {
        self.ident.lock().clone()
    }

    pub fn set_ident(&self, ident: Ident) {
        *self.ident.lock() = Some(ident);
    }

    pub fn host(&self) -> String {
        match self.addr {
            Some(addr) => addr.ip().to_string(),
            None => "localhost".to_string(),
        }
    }

    /// `nick!user@host`, as used in the prefix of relayed messages
    pub fn source(&self) -> String {
        let nick = self.nick().unwrap_or_else(|| "*".to_string());
        let user = self
            .ident()
            .map(|i| i.username)
            .unwrap_or_else(|| "*".to_string());
        format!("{}!{}@{}", nick, user, self.host())
    }

    /// Queue a line for delivery and wake the owning connection.
    ///
    /// Never blocks. Returns false if the queue is full or the connection is
    /// gone, in which case the line is dropped.
    pub fn enqueue(&self, line: Bytes) -> bool {
        match self.outbound.try_send(line) {
            Ok(()) => {
                if let Some(waker) = &self.waker {
                    if let Err(e) = waker.wake() {
                        debug!("Failed to wake client {}: {}", self.id, e);
                    }
                }
                true
            }
            Err(TrySendError::Full(_)) => {
                debug!("Outbound queue full for client {}, dropping line", self.id);
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("Client {} is gone, dropping line", self.id);
                false
            }
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .field("nick", &self.nick())
            .finish()
    }
}

impl Keyed for Arc<Client> {
    fn registry_key(&self) -> Option<String> {
        self.nick()
    }
}
