//! Hash-keyed table of live sessions.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, TryLockError};
use std::time::{Duration, Instant};

use tracing::debug;

use summit_protocol::SessionHash;

use crate::health::HealthReporter;
use crate::strategy::StrategyFactory;

use super::SESSION_TARGET;
use super::handler::{SessionHandler, SharedSession};

/// Decides when an idle session is discarded.
pub trait EvictionPolicy: Send + Sync + fmt::Debug {
    /// Returns `true` when a session idle for `idle` should be removed.
    fn should_evict(&self, idle: Duration) -> bool;

    /// How often the registry should be swept, if ever.
    fn sweep_interval(&self) -> Option<Duration>;
}

/// Keeps every session for the lifetime of the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverEvict;

impl EvictionPolicy for NeverEvict {
    fn should_evict(&self, _idle: Duration) -> bool {
        false
    }

    fn sweep_interval(&self) -> Option<Duration> {
        None
    }
}

/// Discards sessions that have served no request for `timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleTimeout {
    timeout: Duration,
    interval: Duration,
}

impl IdleTimeout {
    /// Evicts after `timeout` of inactivity, checking every `interval`.
    #[must_use]
    pub const fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }
}

impl EvictionPolicy for IdleTimeout {
    fn should_evict(&self, idle: Duration) -> bool {
        idle >= self.timeout
    }

    fn sweep_interval(&self) -> Option<Duration> {
        Some(self.interval)
    }
}

/// Owns every live session, keyed by hash.
///
/// The registry is owned by the event loop thread; workers only ever see the
/// [`SharedSession`] handles it hands out.
pub struct SessionRegistry {
    sessions: HashMap<SessionHash, SharedSession>,
    factory: Arc<dyn StrategyFactory>,
    eviction: Box<dyn EvictionPolicy>,
    reporter: Arc<dyn HealthReporter>,
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SessionRegistry")
            .field("sessions", &self.sessions.len())
            .field("eviction", &self.eviction)
            .finish_non_exhaustive()
    }
}

impl SessionRegistry {
    /// Builds an empty registry.
    pub fn new(
        factory: Arc<dyn StrategyFactory>,
        eviction: Box<dyn EvictionPolicy>,
        reporter: Arc<dyn HealthReporter>,
    ) -> Self {
        Self {
            sessions: HashMap::new(),
            factory,
            eviction,
            reporter,
        }
    }

    /// Returns the session for `hash`, creating an uninitialised one on first
    /// sight.
    pub fn get_or_create(&mut self, hash: &SessionHash) -> SharedSession {
        if let Some(session) = self.sessions.get(hash) {
            return Arc::clone(session);
        }
        let session = Arc::new(Mutex::new(SessionHandler::new(
            hash.clone(),
            Arc::clone(&self.factory),
        )));
        self.sessions.insert(hash.clone(), Arc::clone(&session));
        self.reporter.session_created(hash);
        session
    }

    /// Removes a session, returning whether it existed.
    pub fn remove(&mut self, hash: &SessionHash) -> bool {
        let removed = self.sessions.remove(hash).is_some();
        if removed {
            self.reporter.session_closed(hash);
        }
        removed
    }

    /// Applies the eviction policy as of `now`, returning how many sessions
    /// were discarded. Sessions currently being served are never evicted.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.sessions.len();
        let eviction = &self.eviction;
        let reporter = &self.reporter;
        self.sessions.retain(|hash, session| {
            if Arc::strong_count(session) > 1 {
                return true;
            }
            let last_activity = match session.try_lock() {
                Ok(handler) => handler.last_activity(),
                Err(TryLockError::Poisoned(poisoned)) => {
                    PoisonError::into_inner(poisoned).last_activity()
                }
                Err(TryLockError::WouldBlock) => return true,
            };
            let idle = now.saturating_duration_since(last_activity);
            if eviction.should_evict(idle) {
                reporter.session_evicted(hash, idle);
                false
            } else {
                true
            }
        });
        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            debug!(
                target: SESSION_TARGET,
                evicted,
                remaining = self.sessions.len(),
                "idle sessions swept"
            );
        }
        evicted
    }

    /// Sweep cadence requested by the eviction policy.
    #[must_use]
    pub fn sweep_interval(&self) -> Option<Duration> {
        self.eviction.sweep_interval()
    }

    #[cfg(test)]
    pub(crate) fn get(&self, hash: &SessionHash) -> Option<SharedSession> {
        self.sessions.get(hash).map(Arc::clone)
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, hash: &SessionHash) -> bool {
        self.sessions.contains_key(hash)
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` when no session is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
