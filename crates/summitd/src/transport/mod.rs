//! TCP transport: a single-threaded readiness loop over `mio`.
//!
//! The loop owns the listener and every accepted connection. Each readable
//! connection yields at most one request document per read of up to
//! [`summit_protocol::MAX_FRAME_BYTES`] bytes. Documents are not length
//! prefixed, so a client must wait for each reply before sending its next
//! request.

mod connection;
mod errors;
mod reactor;

pub use self::errors::ListenerError;
pub use self::reactor::{EventLoop, StopHandle, bind_tcp};

const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
