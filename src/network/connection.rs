use crate::client::Client;
use crate::error::Error;
use crate::protocol::{CommandExecutor, Fill, Framer, Message};
use crate::server::ServerContext;
use bytes::Bytes;
use crossbeam_channel::Receiver;
use mio::Waker;
use std::io::{self, Read};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Manages one client connection
///
/// Incoming bytes go through the framer and tokenizer into the executor.
/// Replies and lines queued by other clients are collected in a single write
/// buffer that the owning thread flushes to the socket.
pub struct Connection {
    client: Arc<Client>,
    outbound: Receiver<Bytes>,

    // Protocol state
    framer: Framer,
    executor: CommandExecutor,

    // Single consolidated write buffer
    pub write_buffer: Vec<u8>,
    write_position: usize,

    // Connection state
    closed: bool,
    pub messages_processed: u64,
}

impl Connection {
    /// Create a connection handler. `waker` is signalled whenever another
    /// client queues a line for this one.
    pub fn new(ctx: Arc<ServerContext>, addr: Option<SocketAddr>, waker: Option<Waker>) -> Self {
        let buffer_size = ctx.config.connection_buffer_size;
        let (client, outbound) = Client::new(addr, ctx.config.write_queue_size, waker);
        let executor = CommandExecutor::new(ctx, Arc::clone(&client));

        Self {
            client,
            outbound,
            framer: Framer::new(),
            executor,
            write_buffer: Vec::with_capacity(buffer_size),
            write_position: 0,
            closed: false,
            messages_processed: 0,
        }
    }

    pub fn client(&self) -> &Arc<Client> {
        &self.client
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_registered(&self) -> bool {
        self.executor.is_registered()
    }

    /// Pull available bytes from the socket into the framer.
    ///
    /// Follow every call with [`Connection::process_messages`].
    pub fn read_from<R: Read>(&mut self, src: &mut R) -> io::Result<Fill> {
        let fill = self.framer.on_data(src)?;
        if let Fill::Reset { discarded, .. } = fill {
            debug!(
                "Client {} sent an oversized message, {} bytes dropped",
                self.client.id, discarded
            );
        }
        Ok(fill)
    }

    /// Execute every complete message currently buffered
    pub fn process_messages(&mut self) {
        // Only clear buffer if all previous writes have been consumed
        if self.write_position >= self.write_buffer.len() {
            self.write_buffer.clear();
            self.write_position = 0;
        }

        while !self.closed {
            let line = match self.framer.next_message() {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!("Client {}: {}, input discarded", self.client.id, e);
                    continue;
                }
            };
            self.messages_processed += 1;

            match Message::parse(line) {
                Ok(msg) => self.executor.execute(&msg, &mut self.write_buffer),
                Err(e) => debug!("Client {}: dropping message: {}", self.client.id, e),
            }

            if self.executor.has_quit() {
                self.closed = true;
            }
        }
    }

    /// Feed raw bytes as if they had been read from the socket
    pub fn process_read(&mut self, mut data: &[u8]) {
        while !data.is_empty() && !self.closed {
            self.framer.feed(&mut data);
            self.process_messages();
        }
    }

    /// Move lines queued by other clients into the write buffer
    pub fn drain_outbound(&mut self) -> usize {
        let mut drained = 0;
        for line in self.outbound.try_iter() {
            self.write_buffer.extend_from_slice(&line);
            drained += 1;
        }
        drained
    }

    /// Queue an `ERROR` line describing why the link is closing
    pub fn write_error(&mut self, error: &Error) {
        self.write_buffer.extend_from_slice(&error.to_irc());
    }

    /// Get pending write data as a single buffer slice
    pub fn pending_writes(&mut self) -> Option<&[u8]> {
        if self.write_position < self.write_buffer.len() {
            Some(&self.write_buffer[self.write_position..])
        } else {
            None
        }
    }

    /// Mark bytes as written
    pub fn consume_writes(&mut self, n: usize) {
        self.write_position += n;
        if self.write_position >= self.write_buffer.len() {
            self.write_buffer.clear();
            self.write_position = 0;
        }
    }

    /// Mark the connection closed and release the client's nickname
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
        }
        self.executor.disconnect();
    }
}
