//! Wire types exchanged between Summit clients and the `summitd` daemon.
//!
//! Every exchange is a single JSON document in each direction. Requests are
//! decoded into a typed [`Request`] whose [`RequestBody`] distinguishes the
//! three shapes the daemon understands:
//!
//! ```json
//! {"hash":"abc","algorithm":{"name":"RandomSearch"},"batch_size":2,
//!  "parameters":{"batch 1":{"temp":{"min_value":0,"max_value":100}}},
//!  "target":{"yield":1}}
//! {"hash":"abc","parameters":{"temp":[12.5]},"result":{"yield":[0.4]},"n_batches":1}
//! {"hash":"abc","close":true}
//! ```
//!
//! Replies are modelled by [`Reply`]; each variant serialises to the object
//! shape clients already expect (`{"strategy":…}`, `{"batch 1":{…},…}`,
//! `{"closed":…}` or `{"exception":…}`).

mod errors;
mod reply;
mod request;

pub use errors::FrameError;
pub use reply::{ParameterRow, Reply, SuggestionBatches, batch_label};
pub use request::{
    AlgorithmConfig, BatchCount, ColumnSet, CycleRequest, InitRequest, ParameterBounds, Request,
    RequestBody, SessionHash, TargetSpec,
};

/// Upper bound on the size of a single request document, in bytes.
///
/// Requests are not length-prefixed: the daemon performs one read of at most
/// this many bytes and decodes the result as a complete document.
pub const MAX_FRAME_BYTES: usize = 4096;
