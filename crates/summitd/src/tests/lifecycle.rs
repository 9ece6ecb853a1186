//! Lifecycle tests for the event loop and daemon process wiring.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rstest::{fixture, rstest};
use summit_protocol::Reply;

use crate::health::HealthReporter;
use crate::process::{LaunchError, run_daemon_with};
use crate::session::{NeverEvict, SessionRegistry};
use crate::strategy::BuiltinStrategies;
use crate::transport::{EventLoop, ListenerError, bind_tcp};

use super::support::{
    FailingConfigLoader, HealthEvent, RecordingHealthReporter, TestClient, TestShutdownSignal,
};

#[fixture]
fn reporter() -> Arc<RecordingHealthReporter> {
    Arc::new(RecordingHealthReporter::default())
}

fn event_loop(reporter: &Arc<RecordingHealthReporter>, workers: usize) -> EventLoop {
    let registry = SessionRegistry::new(
        Arc::new(BuiltinStrategies),
        Box::new(NeverEvict),
        Arc::clone(reporter) as Arc<dyn HealthReporter>,
    );
    EventLoop::new(registry, workers).expect("event loop")
}

#[rstest]
fn running_without_a_listener_fails(reporter: Arc<RecordingHealthReporter>) {
    let mut event_loop = event_loop(&reporter, 0);
    assert!(matches!(event_loop.run(), Err(ListenerError::NotListening)));
}

#[rstest]
fn stopping_twice_is_harmless(reporter: Arc<RecordingHealthReporter>) {
    let mut event_loop = event_loop(&reporter, 1);
    let listener = bind_tcp("127.0.0.1", 0).expect("bind");
    let addr = event_loop.register_listener(listener).expect("register");
    assert_eq!(event_loop.local_addr(), Some(addr));

    event_loop.stop();
    event_loop.stop();

    assert_eq!(event_loop.local_addr(), None);
    assert_eq!(event_loop.connection_count(), 0);
}

#[rstest]
fn stop_handle_ends_a_running_loop(reporter: Arc<RecordingHealthReporter>) {
    let mut event_loop = event_loop(&reporter, 2);
    let addr = event_loop
        .register_listener(bind_tcp("127.0.0.1", 0).expect("bind"))
        .expect("register");
    let stop = event_loop.stop_handle();
    let serving = thread::spawn(move || {
        let outcome = event_loop.run();
        event_loop.stop();
        outcome
    });

    let mut client = TcpStream::connect(addr).expect("connect");
    client
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("timeout");
    client
        .write_all(br#"{"hash":"h","close":true}"#)
        .expect("send close");
    let mut reply = vec![0_u8; 256];
    let read = client.read(&mut reply).expect("reply");
    assert_eq!(reply.get(..read), Some(br#"{"closed":"h"}"#.as_slice()));

    stop.stop().expect("wake loop");
    serving
        .join()
        .expect("loop thread")
        .expect("loop exits cleanly");
    let mut rest = [0_u8; 8];
    assert_eq!(client.read(&mut rest).expect("eof after stop"), 0);
}

#[rstest]
fn reset_connections_are_dropped_while_others_are_served(
    reporter: Arc<RecordingHealthReporter>,
) {
    let mut event_loop = event_loop(&reporter, 1);
    let addr = event_loop
        .register_listener(bind_tcp("127.0.0.1", 0).expect("bind"))
        .expect("register");
    let stop = event_loop.stop_handle();
    let serving = thread::spawn(move || {
        let outcome = event_loop.run();
        (event_loop, outcome)
    });

    let mut doomed = TestClient::connect(addr).expect("connect first client");
    let reply = doomed.request(r#"{"hash":"r"}"#).expect("reply before reset");
    assert!(reply.is_error(), "uninitialised session: {reply:?}");
    doomed.reset().expect("reset first client");

    let mut survivor = TestClient::connect(addr).expect("connect second client");
    let reply = survivor
        .request(r#"{"hash":"r","close":true}"#)
        .expect("reply after reset");
    assert_eq!(
        reply,
        Reply::Closed {
            closed: "r".to_owned()
        }
    );

    stop.stop().expect("wake loop");
    let (event_loop, outcome) = serving.join().expect("loop thread");
    outcome.expect("clean exit");
    assert_eq!(event_loop.connection_count(), 1, "only the survivor remains");
}

#[rstest]
fn sessions_are_announced_to_the_reporter(reporter: Arc<RecordingHealthReporter>) {
    let mut event_loop = event_loop(&reporter, 0);
    let addr = event_loop
        .register_listener(bind_tcp("127.0.0.1", 0).expect("bind"))
        .expect("register");
    let stop = event_loop.stop_handle();
    let serving = thread::spawn(move || event_loop.run());

    let mut client = TcpStream::connect(addr).expect("connect");
    client
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("timeout");
    client.write_all(br#"{"hash":"fresh"}"#).expect("send");
    let mut reply = vec![0_u8; 512];
    let read = client.read(&mut reply).expect("reply");
    assert!(read > 0);

    stop.stop().expect("wake loop");
    serving.join().expect("loop thread").expect("clean exit");
    assert!(
        reporter
            .events()
            .contains(&HealthEvent::SessionCreated("fresh".to_owned()))
    );
}

#[rstest]
fn launch_fails_when_configuration_cannot_load(reporter: Arc<RecordingHealthReporter>) {
    let result = run_daemon_with(
        &FailingConfigLoader,
        Arc::clone(&reporter) as Arc<dyn HealthReporter>,
        Arc::new(BuiltinStrategies),
        TestShutdownSignal::default(),
    );
    assert!(matches!(result, Err(LaunchError::Bootstrap(_))));
    assert!(
        !reporter
            .events()
            .iter()
            .any(|event| matches!(event, HealthEvent::ListenerReady(_)))
    );
}
