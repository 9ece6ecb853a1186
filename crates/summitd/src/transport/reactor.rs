//! Readiness loop that multiplexes the listener and client connections.

use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::time::Instant;

use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token, Waker};
use tracing::{debug, info, warn};

use summit_protocol::Reply;

use crate::dispatch::{Completion, Routed, SessionRouter, WorkerPool};
use crate::session::SessionRegistry;

use super::connection::{Connection, FlushOutcome, ReadOutcome};
use super::{ListenerError, TRANSPORT_TARGET};

const LISTENER: Token = Token(0);
const WAKER: Token = Token(1);
const FIRST_CONNECTION: usize = 2;
const EVENT_CAPACITY: usize = 256;
const ENCODING_FAILURE: &[u8] = br#"{"exception":"failed to encode reply"}"#;

/// Resolves `host:port` and binds a non-blocking listener on the first
/// address found.
pub fn bind_tcp(host: &str, port: u16) -> Result<TcpListener, ListenerError> {
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| ListenerError::Resolve {
            host: host.to_owned(),
            port,
            source,
        })?;
    let addr = addrs.next().ok_or_else(|| ListenerError::ResolveEmpty {
        host: host.to_owned(),
        port,
    })?;
    TcpListener::bind(addr).map_err(|source| ListenerError::BindTcp { addr, source })
}

/// Requests termination of a running [`EventLoop`] from another thread.
#[derive(Debug, Clone)]
pub struct StopHandle {
    requested: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl StopHandle {
    /// Asks the loop to return from [`EventLoop::run`] at its next wake-up.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the loop could not be woken.
    pub fn stop(&self) -> io::Result<()> {
        self.requested.store(true, Ordering::SeqCst);
        self.waker.wake()
    }
}

/// Single-threaded readiness loop.
///
/// Sockets, the session table and all connection bookkeeping belong to the
/// thread calling [`EventLoop::run`]. Session handlers run on the worker pool
/// and their replies come back through a channel plus a [`Waker`].
pub struct EventLoop {
    poll: Poll,
    listener: Option<TcpListener>,
    connections: HashMap<Token, Connection>,
    next_token: usize,
    router: SessionRouter,
    completions: Receiver<Completion>,
    waker: Arc<Waker>,
    stop_requested: Arc<AtomicBool>,
    stopped: bool,
    pool: WorkerPool,
}

impl EventLoop {
    /// Creates a loop serving `registry` with `workers` handler threads.
    ///
    /// Zero workers runs every handler on the loop thread.
    ///
    /// # Errors
    ///
    /// Fails when the poller, waker or worker threads cannot be created.
    pub fn new(registry: SessionRegistry, workers: usize) -> Result<Self, ListenerError> {
        let poll = Poll::new().map_err(|source| ListenerError::Poll { source })?;
        let waker = Arc::new(
            Waker::new(poll.registry(), WAKER).map_err(|source| ListenerError::Waker { source })?,
        );
        let (sender, completions) = mpsc::channel();
        let pool = WorkerPool::new(workers, &sender, &waker)
            .map_err(|source| ListenerError::Workers { source })?;
        Ok(Self {
            poll,
            listener: None,
            connections: HashMap::new(),
            next_token: FIRST_CONNECTION,
            router: SessionRouter::new(registry),
            completions,
            waker,
            stop_requested: Arc::new(AtomicBool::new(false)),
            stopped: false,
            pool,
        })
    }

    /// Registers the listening socket for accept readiness.
    ///
    /// # Errors
    ///
    /// Fails when the socket cannot be registered or reports no address.
    pub fn register_listener(
        &mut self,
        mut listener: TcpListener,
    ) -> Result<SocketAddr, ListenerError> {
        self.poll
            .registry()
            .register(&mut listener, LISTENER, Interest::READABLE)
            .map_err(|source| ListenerError::Register { source })?;
        let addr = listener
            .local_addr()
            .map_err(|source| ListenerError::Register { source })?;
        info!(
            target: TRANSPORT_TARGET,
            %addr,
            "listener registered"
        );
        self.listener = Some(listener);
        Ok(addr)
    }

    /// Address of the registered listener.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener
            .as_ref()
            .and_then(|listener| listener.local_addr().ok())
    }

    /// Handle that stops [`EventLoop::run`] from another thread.
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            requested: Arc::clone(&self.stop_requested),
            waker: Arc::clone(&self.waker),
        }
    }

    /// Number of open client connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Serves readiness events until a stop is requested.
    ///
    /// # Errors
    ///
    /// Returns poll and accept failures; the caller is expected to
    /// [`stop`](Self::stop) the loop and exit.
    pub fn run(&mut self) -> Result<(), ListenerError> {
        if self.listener.is_none() {
            return Err(ListenerError::NotListening);
        }
        let sweep_interval = self.router.sweep_interval();
        let mut next_sweep = sweep_interval.map(|interval| Instant::now() + interval);
        let mut events = Events::with_capacity(EVENT_CAPACITY);

        while !self.stop_requested.load(Ordering::SeqCst) {
            let timeout = next_sweep.map(|at| at.saturating_duration_since(Instant::now()));
            if let Err(source) = self.poll.poll(&mut events, timeout) {
                if source.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(ListenerError::Wait { source });
            }

            let ready: Vec<Token> = events.iter().map(mio::event::Event::token).collect();
            for token in ready {
                match token {
                    LISTENER => self.accept_pending()?,
                    WAKER => self.drain_completions(),
                    token => self.drive(token),
                }
            }

            if let (Some(interval), Some(at)) = (sweep_interval, next_sweep) {
                let now = Instant::now();
                if now >= at {
                    self.router.sweep(now);
                    next_sweep = Some(now + interval);
                }
            }
        }
        debug!(target: TRANSPORT_TARGET, "stop requested; leaving event loop");
        Ok(())
    }

    /// Deregisters and closes every connection and the listener.
    ///
    /// Calling this more than once has no further effect.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.stop_requested.store(true, Ordering::SeqCst);
        let tokens: Vec<Token> = self.connections.keys().copied().collect();
        for token in tokens {
            self.close(token, "shutdown");
        }
        if let Some(mut listener) = self.listener.take() {
            if let Err(error) = self.poll.registry().deregister(&mut listener) {
                debug!(
                    target: TRANSPORT_TARGET,
                    error = %error,
                    "listener deregistration failed"
                );
            }
            drop(listener);
        }
        info!(target: TRANSPORT_TARGET, "event loop stopped");
    }

    fn accept_pending(&mut self) -> Result<(), ListenerError> {
        loop {
            let Some(listener) = self.listener.as_ref() else {
                return Ok(());
            };
            match listener.accept() {
                Ok((mut stream, peer)) => {
                    let token = Token(self.next_token);
                    self.next_token = self.next_token.wrapping_add(1).max(FIRST_CONNECTION);
                    self.poll
                        .registry()
                        .register(&mut stream, token, Interest::READABLE)
                        .map_err(|source| ListenerError::Register { source })?;
                    debug!(
                        target: TRANSPORT_TARGET,
                        connection = token.0,
                        %peer,
                        "connection registered"
                    );
                    self.connections
                        .insert(token, Connection::new(stream, Some(peer)));
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(error)
                    if matches!(
                        error.kind(),
                        io::ErrorKind::Interrupted | io::ErrorKind::ConnectionAborted
                    ) => {}
                Err(source) => return Err(ListenerError::Accept { source }),
            }
        }
    }

    fn drain_completions(&mut self) {
        while let Ok(completion) = self.completions.try_recv() {
            let token = completion.token;
            self.deliver(completion);
            self.drive(token);
        }
    }

    /// Flushes pending output, then reads and serves requests until the
    /// connection blocks, waits on a worker or goes away.
    fn drive(&mut self, token: Token) {
        loop {
            let Some(connection) = self.connections.get_mut(&token) else {
                return;
            };
            match connection.flush() {
                Ok(FlushOutcome::Flushed) => {
                    if connection.writable_interest() {
                        self.set_interest(token, Interest::READABLE, false);
                    }
                }
                Ok(FlushOutcome::Blocked) => {
                    if !connection.writable_interest() {
                        self.set_interest(token, Interest::READABLE | Interest::WRITABLE, true);
                    }
                    return;
                }
                Err(error) => {
                    warn!(
                        target: TRANSPORT_TARGET,
                        connection = token.0,
                        error = %error,
                        "write failed"
                    );
                    self.close(token, "write error");
                    return;
                }
            }

            let Some(connection) = self.connections.get_mut(&token) else {
                return;
            };
            if connection.in_flight() {
                return;
            }
            match connection.read_request() {
                Ok(ReadOutcome::Pending) => return,
                Ok(ReadOutcome::Closed) => {
                    self.close(token, "peer closed");
                    return;
                }
                Ok(ReadOutcome::Reset) => {
                    self.close(token, "connection reset");
                    return;
                }
                Err(error) => {
                    warn!(
                        target: TRANSPORT_TARGET,
                        connection = token.0,
                        error = %error,
                        "read failed"
                    );
                    self.close(token, "read error");
                    return;
                }
                Ok(ReadOutcome::Request(payload)) => {
                    let completion = match self.router.route(token, &payload) {
                        Routed::Immediate(reply) => Some(Completion { token, reply }),
                        Routed::Deferred(job) => self.pool.submit(job),
                    };
                    match completion {
                        Some(completion) => self.deliver(completion),
                        None => return,
                    }
                }
            }
        }
    }

    fn deliver(&mut self, completion: Completion) {
        let Completion { token, reply } = completion;
        let Some(connection) = self.connections.get_mut(&token) else {
            debug!(
                target: TRANSPORT_TARGET,
                connection = token.0,
                "reply discarded; connection already closed"
            );
            return;
        };
        let encoded = reply.to_bytes().unwrap_or_else(|error| {
            warn!(
                target: TRANSPORT_TARGET,
                error = %error,
                "reply encoding failed"
            );
            Reply::error(error)
                .to_bytes()
                .unwrap_or_else(|_| ENCODING_FAILURE.to_vec())
        });
        connection.queue_reply(&encoded);
    }

    fn set_interest(&mut self, token: Token, interest: Interest, writable: bool) {
        let Some(connection) = self.connections.get_mut(&token) else {
            return;
        };
        match self
            .poll
            .registry()
            .reregister(connection.stream_mut(), token, interest)
        {
            Ok(()) => connection.set_writable_interest(writable),
            Err(error) => {
                warn!(
                    target: TRANSPORT_TARGET,
                    connection = token.0,
                    error = %error,
                    "failed to update readiness interest"
                );
                self.close(token, "registration error");
            }
        }
    }

    fn close(&mut self, token: Token, reason: &'static str) {
        let Some(mut connection) = self.connections.remove(&token) else {
            return;
        };
        if let Err(error) = self.poll.registry().deregister(connection.stream_mut()) {
            debug!(
                target: TRANSPORT_TARGET,
                connection = token.0,
                error = %error,
                "deregistration failed"
            );
        }
        debug!(
            target: TRANSPORT_TARGET,
            connection = token.0,
            peer = ?connection.peer(),
            reason,
            "connection closed"
        );
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        self.stop();
    }
}
