//! Routing of decoded requests to sessions.

use std::time::{Duration, Instant};

use mio::Token;
use tracing::{debug, warn};

use summit_protocol::{Reply, Request, RequestBody};

use crate::session::SessionRegistry;

use super::DISPATCH_TARGET;
use super::worker::Job;

/// What the loop should do with one request payload.
#[derive(Debug)]
pub(crate) enum Routed {
    /// The reply is known without touching a session handler.
    Immediate(Reply),
    /// A session handler must run.
    Deferred(Job),
}

/// Owns the session registry and turns payloads into work.
#[derive(Debug)]
pub(crate) struct SessionRouter {
    registry: SessionRegistry,
}

impl SessionRouter {
    pub(crate) fn new(registry: SessionRegistry) -> Self {
        Self { registry }
    }

    pub(crate) fn route(&mut self, token: Token, payload: &[u8]) -> Routed {
        let request = match Request::parse(payload) {
            Ok(request) => request,
            Err(error) => {
                warn!(
                    target: DISPATCH_TARGET,
                    connection = token.0,
                    bytes = payload.len(),
                    error = %error,
                    "rejected undecodable request"
                );
                return Routed::Immediate(Reply::error(error));
            }
        };
        let Request { hash, body } = request;
        if matches!(body, RequestBody::Close) {
            let existed = self.registry.remove(&hash);
            debug!(
                target: DISPATCH_TARGET,
                %hash,
                existed,
                "close request served"
            );
            return Routed::Immediate(Reply::Closed {
                closed: hash.to_string(),
            });
        }
        let session = self.registry.get_or_create(&hash);
        Routed::Deferred(Job::new(token, hash, session, body))
    }

    pub(crate) fn sweep(&mut self, now: Instant) -> usize {
        self.registry.sweep(now)
    }

    pub(crate) fn sweep_interval(&self) -> Option<Duration> {
        self.registry.sweep_interval()
    }

    #[cfg(test)]
    pub(crate) fn registry(&self) -> &SessionRegistry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rstest::{fixture, rstest};
    use summit_protocol::SessionHash;

    use crate::session::{MAX_BATCH_SIZE, NeverEvict};
    use crate::strategy::BuiltinStrategies;
    use crate::tests::support::RecordingHealthReporter;

    use super::*;

    const INIT: &[u8] = br#"{"hash":"h","algorithm":{"name":"RandomSearch","seed":1},
        "batch_size":2,"parameters":{"batch 1":{"x":{"min_value":0,"max_value":1}}},
        "target":{"y":1}}"#;

    #[fixture]
    fn router() -> SessionRouter {
        SessionRouter::new(SessionRegistry::new(
            Arc::new(BuiltinStrategies),
            Box::new(NeverEvict),
            Arc::new(RecordingHealthReporter::default()),
        ))
    }

    fn run(router: &mut SessionRouter, payload: &[u8]) -> Reply {
        match router.route(Token(7), payload) {
            Routed::Immediate(reply) => reply,
            Routed::Deferred(job) => job.run().reply,
        }
    }

    #[rstest]
    #[case(b"{not json".as_slice())]
    #[case(br#"{"no_hash":true}"#.as_slice())]
    fn undecodable_payloads_get_error_replies(mut router: SessionRouter, #[case] payload: &[u8]) {
        let routed = router.route(Token(1), payload);
        assert!(matches!(routed, Routed::Immediate(reply) if reply.is_error()));
        assert!(router.registry().is_empty(), "no session for bad frames");
    }

    #[rstest]
    fn session_requests_are_deferred(mut router: SessionRouter) {
        let routed = router.route(Token(3), INIT);
        let Routed::Deferred(job) = routed else {
            panic!("expected deferred job");
        };
        let completion = job.run();
        assert_eq!(completion.token, Token(3));
        assert!(matches!(completion.reply, Reply::Ack { .. }));
    }

    #[rstest]
    fn close_removes_the_session(mut router: SessionRouter) {
        run(&mut router, INIT);
        assert_eq!(router.registry().len(), 1);
        let reply = run(&mut router, br#"{"hash":"h","close":true}"#);
        assert_eq!(
            reply,
            Reply::Closed {
                closed: "h".to_owned()
            }
        );
        assert!(router.registry().is_empty());

        let reply = run(&mut router, br#"{"hash":"h"}"#);
        assert!(reply.is_error(), "closed sessions start over uninitialised");
    }

    fn suggestion_count(reply: &Reply) -> usize {
        match reply {
            Reply::Suggestions(batches) => batches.len(),
            other => panic!("expected suggestions, got {other:?}"),
        }
    }

    fn stored_rows(router: &SessionRouter, hash: &str) -> usize {
        let session = router
            .registry()
            .get(&SessionHash::from(hash))
            .expect("session exists");
        let handler = session.lock().expect("session lock");
        handler.observations().len()
    }

    #[rstest]
    fn oversized_n_returns_is_refused_without_harming_the_session(mut router: SessionRouter) {
        run(&mut router, INIT);
        let reply = run(&mut router, br#"{"hash":"h","n_returns":1099511627776}"#);
        assert!(reply.is_error(), "unexpected reply: {reply:?}");

        let reply = run(&mut router, br#"{"hash":"h"}"#);
        assert_eq!(suggestion_count(&reply), 2);
    }

    #[rstest]
    fn largest_allowed_n_returns_is_served(mut router: SessionRouter) {
        run(&mut router, INIT);
        let payload = format!(r#"{{"hash":"h","n_returns":{MAX_BATCH_SIZE}}}"#);
        let reply = run(&mut router, payload.as_bytes());
        assert_eq!(suggestion_count(&reply), MAX_BATCH_SIZE);
    }

    #[rstest]
    fn oversized_batch_size_fails_initialisation(mut router: SessionRouter) {
        let reply = run(
            &mut router,
            br#"{"hash":"big","algorithm":{"name":"RandomSearch"},"batch_size":1099511627776,
                "parameters":{"batch 1":{"x":{"min_value":0,"max_value":1}}},"target":{"y":1}}"#,
        );
        assert!(reply.is_error(), "unexpected reply: {reply:?}");
        let reply = run(&mut router, br#"{"hash":"big"}"#);
        assert!(reply.is_error(), "session must stay uninitialised");
    }

    #[rstest]
    fn bounds_too_wide_to_sample_fail_initialisation(mut router: SessionRouter) {
        let reply = run(
            &mut router,
            br#"{"hash":"w","algorithm":{"name":"RandomSearch"},
                "parameters":{"batch 1":{"x":{"min_value":-1e308,"max_value":1e308}}},
                "target":{"y":1}}"#,
        );
        let Reply::Error { exception } = reply else {
            panic!("expected an initialisation error, got {reply:?}");
        };
        assert!(exception.contains("invalid bounds"), "{exception}");
    }

    #[rstest]
    fn zero_n_batches_keeps_every_reported_row(mut router: SessionRouter) {
        let init = br#"{"hash":"c","algorithm":{"name":"HillClimb","seed":2},"batch_size":1,
            "parameters":{"batch 1":{"x":{"min_value":0,"max_value":1}}},"target":{"y":1}}"#;
        run(&mut router, init);
        run(&mut router, br#"{"hash":"c"}"#);
        run(
            &mut router,
            br#"{"hash":"c","parameters":{"x":[0.1,0.2,0.3]},"result":{"y":[0.4,0.5,0.6]}}"#,
        );
        assert_eq!(stored_rows(&router, "c"), 3);

        let reply = run(
            &mut router,
            br#"{"hash":"c","parameters":{"x":[0.1,0.2,0.3,0.4]},
                "result":{"y":[0.4,0.5,0.6,0.7]},"n_batches":0}"#,
        );
        assert_eq!(suggestion_count(&reply), 1);
        assert_eq!(stored_rows(&router, "c"), 4);
    }
}
