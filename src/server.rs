use crate::client::Client;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::network::Connection;
use crate::protocol::Fill;
use crate::registry::NickRegistry;
use mio::net::{TcpListener as MioTcpListener, TcpStream as MioTcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use std::io::{ErrorKind, Write};
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

const POLL_TIMEOUT: Duration = Duration::from_millis(100);

const LISTENER: Token = Token(0);
const SOCKET: Token = Token(0);
const WAKER: Token = Token(1);

/// State shared by every connection thread
pub struct ServerContext {
    pub config: Config,
    pub registry: NickRegistry<Arc<Client>>,
    /// Shown in the 003 reply
    pub created: String,
}

impl ServerContext {
    pub fn new(config: Config) -> Self {
        let started = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        Self {
            config,
            registry: NickRegistry::default(),
            created: format!("at unix time {}", started),
        }
    }
}

/// IRC server with one thread per connection
pub struct Server {
    config: Config,
    shutdown: AtomicBool,
    active_connections: AtomicUsize,
}

impl Server {
    /// Create a new server with the given configuration
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            shutdown: AtomicBool::new(false),
            active_connections: AtomicUsize::new(0),
        })
    }

    /// Bind the configured address and serve until shut down
    pub fn run(self: Arc<Self>) -> Result<()> {
        let listener =
            TcpListener::bind(format!("{}:{}", self.config.bind_addr, self.config.port))?;

        info!(
            "Server listening on {}:{}",
            self.config.bind_addr, self.config.port
        );

        self.serve(listener)
    }

    /// Accept connections from an already bound listener.
    ///
    /// This method blocks until the server is shut down and every connection
    /// thread has exited.
    pub fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        listener.set_nonblocking(true)?;
        let mut listener = MioTcpListener::from_std(listener);

        let mut poll = Poll::new()?;
        let mut events = Events::with_capacity(128);
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;

        let ctx = Arc::new(ServerContext::new(self.config.clone()));
        let mut handles: Vec<JoinHandle<()>> = Vec::new();

        while !self.shutdown.load(Ordering::Acquire) {
            if let Err(e) = poll.poll(&mut events, Some(POLL_TIMEOUT)) {
                if e.kind() == ErrorKind::Interrupted {
                    continue;
                }
                return Err(e.into());
            }

            for event in events.iter() {
                if event.token() != LISTENER {
                    continue;
                }
                // Accept new connections
                loop {
                    match listener.accept() {
                        Ok((stream, addr)) => {
                            self.spawn_connection(&ctx, stream, addr, &mut handles)
                        }
                        Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                        Err(e) => {
                            error!("Error accepting connection: {}", e);
                            break;
                        }
                    }
                }
            }

            handles.retain(|handle| !handle.is_finished());
        }

        info!("Waiting for {} connection threads", handles.len());
        for handle in handles {
            if handle.join().is_err() {
                error!("Connection thread panicked");
            }
        }

        match Arc::try_unwrap(ctx) {
            Ok(ctx) => {
                let remaining = ctx.registry.destroy(false);
                if !remaining.is_empty() {
                    warn!("{} nicknames were still registered at shutdown", remaining.len());
                }
            }
            Err(_) => warn!("Server context still shared at shutdown"),
        }

        Ok(())
    }

    /// Signal the server to shut down gracefully
    pub fn shutdown(&self) {
        info!("Initiating server shutdown");
        self.shutdown.store(true, Ordering::Release);
    }

    /// Get the number of active client connections
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Acquire)
    }

    fn spawn_connection(
        self: &Arc<Self>,
        ctx: &Arc<ServerContext>,
        mut stream: MioTcpStream,
        addr: SocketAddr,
        handles: &mut Vec<JoinHandle<()>>,
    ) {
        if self.active_connections() >= self.config.max_connections {
            warn!(
                "Rejecting {}: {} connections already open",
                addr, self.config.max_connections
            );
            // Best effort, the socket is dropped either way
            let _ = stream.write(b"ERROR :Too many connections\r\n");
            return;
        }

        debug!("New connection from {:?}", addr);
        if let Err(e) = stream.set_nodelay(self.config.tcp_nodelay) {
            debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
        }

        let server = Arc::clone(self);
        let ctx = Arc::clone(ctx);
        self.active_connections.fetch_add(1, Ordering::Relaxed);

        let spawned = thread::Builder::new()
            .name(format!("conn-{}", addr))
            .spawn(move || {
                if let Err(e) = server.run_connection(ctx, stream, addr) {
                    debug!("Connection from {} failed: {}", addr, e);
                }
                server.active_connections.fetch_sub(1, Ordering::Relaxed);
            });

        match spawned {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                error!("Failed to spawn connection thread: {}", e);
                self.active_connections.fetch_sub(1, Ordering::Relaxed);
            }
        }
    }

    fn run_connection(
        &self,
        ctx: Arc<ServerContext>,
        mut stream: MioTcpStream,
        addr: SocketAddr,
    ) -> Result<()> {
        let mut poll = Poll::new()?;
        let mut events = Events::with_capacity(16);
        poll.registry()
            .register(&mut stream, SOCKET, Interest::READABLE)?;
        let waker = Waker::new(poll.registry(), WAKER)?;

        let mut connection = Connection::new(ctx, Some(addr), Some(waker));
        let id = connection.client().id;
        info!("Client {} connected from {}", id, addr);

        let result = self.drive(&mut poll, &mut events, &mut stream, &mut connection);

        connection.close();
        let _ = poll.registry().deregister(&mut stream);
        info!(
            "Client {} disconnected after {} messages in {:?}",
            id,
            connection.messages_processed,
            connection.client().connected_at.elapsed()
        );
        result
    }

    // Event loop of a single connection
    fn drive(
        &self,
        poll: &mut Poll,
        events: &mut Events,
        stream: &mut MioTcpStream,
        connection: &mut Connection,
    ) -> Result<()> {
        let mut want_writable = false;

        loop {
            if self.shutdown.load(Ordering::Acquire) {
                connection.write_error(&Error::Shutdown);
                flush(stream, connection)?;
                return Ok(());
            }

            if let Err(e) = poll.poll(events, Some(POLL_TIMEOUT)) {
                if e.kind() == ErrorKind::Interrupted {
                    continue;
                }
                return Err(e.into());
            }

            let mut open = true;
            for event in events.iter() {
                if event.token() == SOCKET && (event.is_readable() || event.is_read_closed()) {
                    open = read_available(stream, connection)?;
                }
            }

            // Lines from other clients wait in their bounded queue until
            // earlier output has reached the socket
            let mut pending = flush(stream, connection)?;
            if !pending && connection.drain_outbound() > 0 {
                pending = flush(stream, connection)?;
            }

            if !open || connection.is_closed() {
                return Ok(());
            }

            if pending != want_writable {
                let interest = if pending {
                    Interest::READABLE | Interest::WRITABLE
                } else {
                    Interest::READABLE
                };
                poll.registry().reregister(stream, SOCKET, interest)?;
                want_writable = pending;
            }
        }
    }
}

// Read until the socket would block. Returns false once the peer has closed
// the stream.
fn read_available(stream: &mut MioTcpStream, connection: &mut Connection) -> Result<bool> {
    loop {
        match connection.read_from(stream) {
            Ok(Fill::Eof) => return Ok(false),
            Ok(_) => {
                connection.process_messages();
                if connection.is_closed() {
                    return Ok(true);
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(true),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

// Write as much pending output as the socket takes. Returns true if some is
// left over.
fn flush(stream: &mut MioTcpStream, connection: &mut Connection) -> Result<bool> {
    while let Some(data) = connection.pending_writes() {
        match stream.write(data) {
            Ok(0) => return Err(Error::ConnectionClosed),
            Ok(n) => connection.consume_writes(n),
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(true),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(false)
}
