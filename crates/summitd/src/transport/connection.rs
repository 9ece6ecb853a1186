//! Per-connection read and write state.

use std::io::{self, Read, Write};
use std::net::SocketAddr;

use mio::net::TcpStream;

use summit_protocol::MAX_FRAME_BYTES;

/// Result of one read attempt.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum ReadOutcome {
    /// One request document.
    Request(Vec<u8>),
    /// The peer closed its side.
    Closed,
    /// The peer reset the connection.
    Reset,
    /// Readiness was spurious.
    Pending,
}

/// Result of draining the outbound buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum FlushOutcome {
    /// Everything queued has been written.
    Flushed,
    /// The socket cannot take more bytes right now.
    Blocked,
}

/// An accepted client socket.
#[derive(Debug)]
pub(super) struct Connection {
    stream: TcpStream,
    peer: Option<SocketAddr>,
    outbound: Vec<u8>,
    written: usize,
    in_flight: bool,
    writable_interest: bool,
}

impl Connection {
    pub(super) fn new(stream: TcpStream, peer: Option<SocketAddr>) -> Self {
        Self {
            stream,
            peer,
            outbound: Vec::new(),
            written: 0,
            in_flight: false,
            writable_interest: false,
        }
    }

    pub(super) fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    pub(super) const fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Returns `true` while a request awaits its reply.
    pub(super) const fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub(super) const fn writable_interest(&self) -> bool {
        self.writable_interest
    }

    pub(super) fn set_writable_interest(&mut self, enabled: bool) {
        self.writable_interest = enabled;
    }

    /// Performs a single read of at most [`MAX_FRAME_BYTES`] bytes.
    pub(super) fn read_request(&mut self) -> io::Result<ReadOutcome> {
        let mut buffer = vec![0_u8; MAX_FRAME_BYTES];
        loop {
            match self.stream.read(&mut buffer) {
                Ok(0) => return Ok(ReadOutcome::Closed),
                Ok(read) => {
                    buffer.truncate(read);
                    self.in_flight = true;
                    return Ok(ReadOutcome::Request(buffer));
                }
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(ReadOutcome::Pending);
                }
                Err(error) if is_reset(&error) => return Ok(ReadOutcome::Reset),
                Err(error) => return Err(error),
            }
        }
    }

    /// Queues an encoded reply and ends the in-flight request.
    pub(super) fn queue_reply(&mut self, reply: &[u8]) {
        self.outbound.extend_from_slice(reply);
        self.in_flight = false;
    }

    /// Writes as much of the outbound buffer as the socket accepts.
    pub(super) fn flush(&mut self) -> io::Result<FlushOutcome> {
        while let Some(remaining) = self.outbound.get(self.written..).filter(|rest| !rest.is_empty())
        {
            match self.stream.write(remaining) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(count) => self.written = self.written.saturating_add(count),
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(FlushOutcome::Blocked);
                }
                Err(error) => return Err(error),
            }
        }
        self.outbound.clear();
        self.written = 0;
        Ok(FlushOutcome::Flushed)
    }
}

fn is_reset(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted | io::ErrorKind::BrokenPipe
    )
}
