//! Per-session state machine.
//!
//! A session starts `Uninitialized`. The first successful initialisation
//! request declares its domain and optimiser and moves it to `Ready`, where
//! it stays for the rest of its life. Every later request reports results and
//! asks for the next batch of experiments.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info, warn};

use summit_protocol::{
    CycleRequest, InitRequest, ParameterRow, Reply, RequestBody, SessionHash, SuggestionBatches,
};

use crate::domain::{Domain, DomainError, ObservationRow};
use crate::strategy::{Strategy, StrategyError, StrategyFactory};

use super::SESSION_TARGET;
use super::dataset::{DatasetBuilder, DatasetError, MergeKind};

/// Shared handle to a session, locked by whoever is serving a request for it.
pub type SharedSession = Arc<Mutex<SessionHandler>>;

/// Largest number of suggestions a single reply may carry.
pub const MAX_BATCH_SIZE: usize = 1_024;

/// Reasons an initialisation request is rejected.
#[derive(Debug, Error)]
pub enum InitError {
    /// The first request did not declare an optimiser.
    #[error("session is not initialised; the first request must carry an algorithm block")]
    MissingAlgorithm,
    /// Neither an explicit batch size nor any declared batch was given.
    #[error("batch size must be at least 1")]
    ZeroBatchSize,
    /// The requested batch size exceeds [`MAX_BATCH_SIZE`].
    #[error("batch size {requested} exceeds the limit of {limit}", limit = MAX_BATCH_SIZE)]
    BatchSizeTooLarge {
        /// Size asked for by the client.
        requested: usize,
    },
    /// The declared variables do not form a valid domain.
    #[error("invalid domain: {source}")]
    Domain {
        /// Underlying validation failure.
        #[from]
        source: DomainError,
    },
    /// The optimiser could not be built.
    #[error("cannot build optimiser: {source}")]
    Strategy {
        /// Underlying construction failure.
        #[from]
        source: StrategyError,
    },
}

/// Failures reported to the client in place of a normal reply.
///
/// A failed request never changes session state.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Initialisation failed; the session stays uninitialised.
    #[error("initialisation failed: {source}")]
    Initialization {
        /// Underlying failure.
        #[from]
        source: InitError,
    },
    /// The reported history was inconsistent.
    #[error("invalid history: {source}")]
    Dataset {
        /// Underlying failure.
        #[from]
        source: DatasetError,
    },
    /// The optimiser failed while producing suggestions.
    #[error("optimiser error: {source}")]
    Strategy {
        /// Underlying failure.
        #[from]
        source: StrategyError,
    },
    /// The request was well formed but cannot be honoured.
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// Human-readable reason.
        message: String,
    },
}

enum SessionState {
    Uninitialized,
    Ready(Box<ReadySession>),
}

struct ReadySession {
    domain: Domain,
    strategy: Box<dyn Strategy>,
    batch_size: usize,
    pending: VecDeque<ParameterRow>,
    dataset: DatasetBuilder,
    last_suggestion_row_count: usize,
    observed_rows: usize,
}

/// State and request handling for one optimisation session.
pub struct SessionHandler {
    hash: SessionHash,
    factory: Arc<dyn StrategyFactory>,
    state: SessionState,
    last_activity: Instant,
}

impl fmt::Debug for SessionHandler {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SessionHandler")
            .field("hash", &self.hash)
            .field("ready", &self.is_ready())
            .field("batch_size", &self.batch_size())
            .finish_non_exhaustive()
    }
}

impl SessionHandler {
    /// Creates an uninitialised session.
    #[must_use]
    pub fn new(hash: SessionHash, factory: Arc<dyn StrategyFactory>) -> Self {
        Self {
            hash,
            factory,
            state: SessionState::Uninitialized,
            last_activity: Instant::now(),
        }
    }

    /// Identifier of the session.
    #[must_use]
    pub fn hash(&self) -> &SessionHash {
        &self.hash
    }

    /// Returns `true` once initialisation has succeeded.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self.state, SessionState::Ready(_))
    }

    /// Suggestions per reply, once initialised.
    #[must_use]
    pub fn batch_size(&self) -> Option<usize> {
        self.ready().map(|ready| ready.batch_size)
    }

    /// Observations accumulated so far.
    #[must_use]
    pub fn observations(&self) -> &[ObservationRow] {
        self.ready()
            .map(|ready| ready.dataset.rows())
            .unwrap_or_default()
    }

    /// Suggestions buffered for later replies.
    #[must_use]
    pub fn pending_suggestions(&self) -> usize {
        self.ready().map_or(0, |ready| ready.pending.len())
    }

    /// Number of suggestions in the last successful reply.
    #[must_use]
    pub fn last_suggestion_row_count(&self) -> usize {
        self.ready()
            .map_or(0, |ready| ready.last_suggestion_row_count)
    }

    /// Time of the last request served.
    #[must_use]
    pub const fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Serves one request, converting failures into error replies.
    pub fn respond(&mut self, body: RequestBody) -> Reply {
        match self.handle(body) {
            Ok(reply) => reply,
            Err(error) => {
                warn!(
                    target: SESSION_TARGET,
                    hash = %self.hash,
                    error = %error,
                    "request failed"
                );
                Reply::error(error)
            }
        }
    }

    /// Serves one request.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] when the request cannot be honoured. The
    /// session is left exactly as it was before the call.
    pub fn handle(&mut self, body: RequestBody) -> Result<Reply, SessionError> {
        self.last_activity = Instant::now();
        let request = match body {
            RequestBody::Close => {
                return Ok(Reply::Closed {
                    closed: self.hash.to_string(),
                });
            }
            RequestBody::Init(init) if !self.is_ready() => return self.initialise(&init),
            RequestBody::Init(_) => {
                info!(
                    target: SESSION_TARGET,
                    hash = %self.hash,
                    "session already initialised; serving a plain suggestion cycle"
                );
                CycleRequest::default()
            }
            RequestBody::Cycle(cycle) => cycle,
        };
        match &mut self.state {
            SessionState::Ready(ready) => ready.cycle(request),
            SessionState::Uninitialized => Err(InitError::MissingAlgorithm.into()),
        }
    }

    fn initialise(&mut self, init: &InitRequest) -> Result<Reply, SessionError> {
        let batch_size = init.batch_size.unwrap_or_else(|| init.declared_batches());
        if batch_size == 0 {
            return Err(InitError::ZeroBatchSize.into());
        }
        if batch_size > MAX_BATCH_SIZE {
            return Err(InitError::BatchSizeTooLarge {
                requested: batch_size,
            }
            .into());
        }
        let domain = Domain::from_init(init).map_err(InitError::from)?;
        let strategy = self
            .factory
            .build(&domain, &init.algorithm)
            .map_err(InitError::from)?;
        let reply = Reply::Ack {
            strategy: strategy.describe(),
        };
        info!(
            target: SESSION_TARGET,
            hash = %self.hash,
            algorithm = strategy.name(),
            batch_size,
            "session initialised"
        );
        self.state = SessionState::Ready(Box::new(ReadySession {
            domain,
            strategy,
            batch_size,
            pending: VecDeque::new(),
            dataset: DatasetBuilder::default(),
            last_suggestion_row_count: 0,
            observed_rows: 0,
        }));
        Ok(reply)
    }

    fn ready(&self) -> Option<&ReadySession> {
        match &self.state {
            SessionState::Ready(ready) => Some(ready),
            SessionState::Uninitialized => None,
        }
    }
}

impl ReadySession {
    fn cycle(&mut self, request: CycleRequest) -> Result<Reply, SessionError> {
        let batch_size = match request.n_returns {
            Some(0) => {
                return Err(SessionError::InvalidRequest {
                    message: "n_returns must be at least 1".to_owned(),
                });
            }
            Some(count) if count > MAX_BATCH_SIZE => {
                return Err(SessionError::InvalidRequest {
                    message: format!("n_returns {count} exceeds the limit of {MAX_BATCH_SIZE}"),
                });
            }
            Some(count) => count,
            None => self.batch_size,
        };

        let merged = match (request.parameters, request.result) {
            (Some(parameters), Some(results)) => {
                let rows =
                    DatasetBuilder::build(&self.domain, &parameters, &results, request.n_batches)?;
                let reported = rows.len();
                let (merged, kind) = self
                    .dataset
                    .merged(rows, self.last_suggestion_row_count);
                debug!(
                    target: SESSION_TARGET,
                    rows = reported,
                    appended = kind == MergeKind::Appended,
                    total = merged.len(),
                    "observations merged"
                );
                Some(merged)
            }
            (None, Some(_)) => return Err(DatasetError::MissingParameters.into()),
            (_, None) => None,
        };
        let observations = merged.as_ref().unwrap_or(&self.dataset).rows();

        // A sequential strategy sees each stored row at most once, even when
        // the cycle later fails.
        if !self.strategy.accepts_history() {
            let unseen = observations.get(self.observed_rows..).unwrap_or_default();
            if !unseen.is_empty() {
                self.strategy.observe(unseen)?;
            }
            self.observed_rows = observations.len();
        }

        let mut pending = self.pending.clone();
        let mut batches = Vec::new();
        while batches.len() < batch_size {
            if pending.is_empty() {
                let wanted = batch_size.saturating_sub(batches.len());
                pending.extend(draw(
                    self.strategy.as_mut(),
                    &self.domain,
                    wanted,
                    observations,
                )?);
            }
            batches.extend(pending.pop_front());
        }

        self.pending = pending;
        self.batch_size = batch_size;
        if let Some(dataset) = merged {
            self.dataset = dataset;
        }
        self.last_suggestion_row_count = batches.len();
        Ok(Reply::Suggestions(SuggestionBatches::new(batches)))
    }
}

fn draw(
    strategy: &mut dyn Strategy,
    domain: &Domain,
    wanted: usize,
    observations: &[ObservationRow],
) -> Result<Vec<ParameterRow>, StrategyError> {
    let rows = if strategy.accepts_history() {
        match strategy.suggest(wanted, observations) {
            Err(StrategyError::HistoryUnsupported { .. }) => {
                debug!(
                    target: SESSION_TARGET,
                    algorithm = strategy.name(),
                    "history refused; requesting a single point"
                );
                vec![strategy.suggest_next()?]
            }
            other => other?,
        }
    } else {
        vec![strategy.suggest_next()?]
    };
    if rows.is_empty() {
        return Err(StrategyError::EmptyBatch {
            algorithm: strategy.name().to_owned(),
        });
    }
    rows.into_iter()
        .map(|row| parameters_only(strategy.name(), domain, &row))
        .collect()
}

fn parameters_only(
    algorithm: &str,
    domain: &Domain,
    row: &ParameterRow,
) -> Result<ParameterRow, StrategyError> {
    domain
        .parameters()
        .map(|variable| {
            row.get(variable.name())
                .map(|value| (variable.name().to_owned(), *value))
                .ok_or_else(|| StrategyError::IncompleteSuggestion {
                    algorithm: algorithm.to_owned(),
                    name: variable.name().to_owned(),
                })
        })
        .collect()
}
