//! Blocking TCP client speaking the request/reply protocol.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use socket2::SockRef;

use summit_protocol::{MAX_FRAME_BYTES, Reply};

const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// One client connection.
#[derive(Debug)]
pub struct TestClient {
    stream: TcpStream,
}

impl TestClient {
    /// Connects to the daemon at `addr`.
    pub fn connect(addr: SocketAddr) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(Some(READ_TIMEOUT))?;
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }

    /// Sends one request document and decodes the reply.
    pub fn request(&mut self, payload: &str) -> Result<Reply, String> {
        self.stream
            .write_all(payload.as_bytes())
            .map_err(|error| format!("send failed: {error}"))?;
        let mut buffer = vec![0_u8; MAX_FRAME_BYTES * 4];
        let read = self
            .stream
            .read(&mut buffer)
            .map_err(|error| format!("receive failed: {error}"))?;
        let bytes = buffer
            .get(..read)
            .ok_or_else(|| "read past buffer".to_owned())?;
        Reply::parse(bytes).map_err(|error| format!("undecodable reply: {error}"))
    }

    /// Half-closes the write side, which the daemon sees as an empty read.
    pub fn finish(&mut self) -> io::Result<()> {
        self.stream.shutdown(Shutdown::Write)
    }

    /// Aborts the connection with a reset instead of an orderly close.
    pub fn reset(self) -> io::Result<()> {
        SockRef::from(&self.stream).set_linger(Some(Duration::ZERO))?;
        drop(self.stream);
        Ok(())
    }

    /// Returns `true` once the daemon has closed its end.
    pub fn closed_by_peer(&mut self) -> bool {
        let mut buffer = [0_u8; 16];
        match self.stream.read(&mut buffer) {
            Ok(0) => true,
            Err(error) => error.kind() == io::ErrorKind::ConnectionReset,
            Ok(_) => false,
        }
    }
}
