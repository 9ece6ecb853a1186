//! Request dispatch: decoding payloads, resolving sessions and running
//! session handlers off the event loop thread.
//!
//! The event loop hands each request payload to the [`SessionRouter`]. Frame
//! errors and close requests are answered immediately; everything else
//! becomes a [`Job`] that locks one session, runs its handler and produces a
//! [`Completion`]. Jobs run on the [`WorkerPool`], whose workers post
//! completions back through a channel and wake the loop.

mod router;
mod worker;

pub(crate) use self::router::{Routed, SessionRouter};
pub(crate) use self::worker::{Completion, Job, WorkerPool};

const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");
