//! End-to-end runs with real sockets and real child processes.
//!
//! The "service" is a listener thread that starts late; the supervised process
//! is a long `sleep`. This exercises the TCP prober, the poller's sleeps, and
//! group termination together.

#![cfg(unix)]

use std::net::TcpListener;
use std::thread;
use std::time::{Duration, Instant};

use readiness::core::endpoint::Endpoint;
use readiness::core::policy::PollPolicy;
use readiness::error::HarnessError;
use readiness::io::probe::TcpProber;
use readiness::io::supervisor::ProcessSupervisor;
use readiness::io::verify::ReachableOnly;
use readiness::orchestrate::{OrchestratorConfig, orchestrate};
use readiness::test_support::LaunchDir;

fn endpoint_for(port: u16) -> Endpoint {
    Endpoint::parse(&format!("ws://127.0.0.1:{port}")).expect("endpoint")
}

/// Bind `port` after `delay` and accept connections until the test process exits.
fn listen_later(port: u16, delay: Duration) {
    thread::spawn(move || {
        thread::sleep(delay);
        let listener = TcpListener::bind(("127.0.0.1", port)).expect("bind late listener");
        for stream in listener.incoming() {
            drop(stream);
        }
    });
}

#[test]
fn late_service_is_detected_and_launched_process_is_stopped() {
    let port = portpicker::pick_unused_port().expect("free port");
    let dir = LaunchDir::new().expect("launch dir");
    dir.write_fixture("chain.json").expect("fixture");
    let config = OrchestratorConfig::new(endpoint_for(port))
        .with_launch(dir.plan("sleep", &["30"], "chain.json"))
        .with_poll(
            PollPolicy::new(Duration::from_millis(100), 50)
                .expect("policy")
                .with_probe_timeout(Duration::from_millis(200)),
        );
    let mut supervisor = ProcessSupervisor::new();

    listen_later(port, Duration::from_millis(300));
    let report =
        orchestrate(&TcpProber, &mut supervisor, &config, &ReachableOnly).expect("ready");

    assert!(report.launched_pid.is_some());
    assert!(report.poll_attempts > 1);
    assert!(report.stopped);
    assert!(!supervisor.is_running());
}

#[test]
fn unreachable_after_launch_fails_within_poll_ceiling() {
    let port = portpicker::pick_unused_port().expect("free port");
    let dir = LaunchDir::new().expect("launch dir");
    dir.write_fixture("chain.json").expect("fixture");
    let poll = PollPolicy::new(Duration::from_millis(20), 3)
        .expect("policy")
        .with_probe_timeout(Duration::from_millis(100));
    let config = OrchestratorConfig::new(endpoint_for(port))
        .with_launch(dir.plan("sleep", &["30"], "chain.json"))
        .with_poll(poll);
    let mut supervisor = ProcessSupervisor::new();

    let started = Instant::now();
    let err = orchestrate(&TcpProber, &mut supervisor, &config, &ReachableOnly).unwrap_err();

    assert!(matches!(err, HarnessError::Unreachable { .. }));
    assert!(!supervisor.is_running());
    assert!(
        started.elapsed() < poll.ceiling() + config.fast_probe_timeout + Duration::from_secs(3)
    );
}

#[test]
fn unknown_program_degrades_to_unreachable() {
    let port = portpicker::pick_unused_port().expect("free port");
    let dir = LaunchDir::new().expect("launch dir");
    dir.write_fixture("chain.json").expect("fixture");
    let config = OrchestratorConfig::new(endpoint_for(port))
        .with_launch(dir.plan("no-such-node-binary-7c2e", &[], "chain.json"));
    let mut supervisor = ProcessSupervisor::new();

    let err = orchestrate(&TcpProber, &mut supervisor, &config, &ReachableOnly).unwrap_err();

    assert!(matches!(err, HarnessError::Unreachable { .. }));
    assert!(!supervisor.is_running());
}
