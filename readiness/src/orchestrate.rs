//! Orchestration for a single readiness run.
//!
//! Probe once; if the endpoint is down and a launch plan is available, start the
//! supervised process and poll; fail hard if it is still down; otherwise run the
//! caller's verification. A process started here is stopped exactly once on
//! every way out, including a panicking verifier.

use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::core::endpoint::Endpoint;
use crate::core::phase::{Phase, PhaseTrail};
use crate::core::policy::{LaunchPlan, PollPolicy};
use crate::error::HarnessError;
use crate::io::poller::poll;
use crate::io::probe::Prober;
use crate::io::supervisor::Supervisor;
use crate::io::verify::Verifier;

pub const DEFAULT_FAST_PROBE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Inputs for one orchestration run.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub endpoint: Endpoint,
    /// Connect timeout for the initial probe.
    pub fast_probe_timeout: Duration,
    /// Polling after a supervised launch.
    pub poll: PollPolicy,
    /// `None` disables the slow path entirely.
    pub launch: Option<LaunchPlan>,
}

impl OrchestratorConfig {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            fast_probe_timeout: DEFAULT_FAST_PROBE_TIMEOUT,
            poll: PollPolicy::default(),
            launch: None,
        }
    }

    pub fn with_launch(mut self, plan: LaunchPlan) -> Self {
        self.launch = Some(plan);
        self
    }

    pub fn with_poll(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }
}

/// Record of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub trail: PhaseTrail,
    /// Pid of the supervised process, when one was launched.
    pub launched_pid: Option<u32>,
    /// Probes issued by the poller (zero on the fast path).
    pub poll_attempts: u32,
    /// Whether cleanup issued a stop.
    pub stopped: bool,
}

/// Stops the supervised process when dropped, unless already stopped.
struct Cleanup<'a, S: Supervisor + ?Sized> {
    supervisor: &'a mut S,
    started: bool,
}

impl<'a, S: Supervisor + ?Sized> Cleanup<'a, S> {
    fn new(supervisor: &'a mut S) -> Self {
        Self {
            supervisor,
            started: false,
        }
    }

    fn start(&mut self, plan: &LaunchPlan) -> Option<u32> {
        match self.supervisor.start(plan) {
            Ok(pid) => {
                self.started = true;
                Some(pid)
            }
            Err(err) => {
                warn!(err = %err, program = %plan.program, "supervised launch unavailable");
                None
            }
        }
    }

    /// Stop the process if one was started. Returns whether a stop was issued.
    fn finish(&mut self) -> bool {
        if !self.started {
            return false;
        }
        self.started = false;
        self.supervisor.stop();
        true
    }
}

impl<S: Supervisor + ?Sized> Drop for Cleanup<'_, S> {
    fn drop(&mut self) {
        if self.finish() {
            warn!("supervised process stopped during unwinding");
        }
    }
}

/// Run the readiness state machine against `config.endpoint`.
///
/// Returns [`HarnessError::Unreachable`] when the endpoint cannot be reached and
/// [`HarnessError::Verification`] when `verifier` fails. Cleanup has completed
/// before either is returned.
#[instrument(skip_all, fields(endpoint = %config.endpoint))]
pub fn orchestrate<P, S, V>(
    prober: &P,
    supervisor: &mut S,
    config: &OrchestratorConfig,
    verifier: &V,
) -> Result<RunReport, HarnessError>
where
    P: Prober + ?Sized,
    S: Supervisor + ?Sized,
    V: Verifier + ?Sized,
{
    let mut report = RunReport {
        trail: PhaseTrail::default(),
        launched_pid: None,
        poll_attempts: 0,
        stopped: false,
    };
    let mut cleanup = Cleanup::new(supervisor);

    let result = drive(prober, &mut cleanup, config, verifier, &mut report);

    report.trail.enter(Phase::Cleanup);
    report.stopped = cleanup.finish();
    debug!(stopped = report.stopped, "cleanup complete");

    result.map(|()| report)
}

fn drive<P, S, V>(
    prober: &P,
    cleanup: &mut Cleanup<'_, S>,
    config: &OrchestratorConfig,
    verifier: &V,
    report: &mut RunReport,
) -> Result<(), HarnessError>
where
    P: Prober + ?Sized,
    S: Supervisor + ?Sized,
    V: Verifier + ?Sized,
{
    let endpoint = &config.endpoint;

    report.trail.enter(Phase::FastProbe);
    let ready = if prober.probe(endpoint, config.fast_probe_timeout) {
        info!("endpoint already reachable");
        true
    } else {
        slow_path(prober, cleanup, config, report)
    };

    if !ready {
        report.trail.enter(Phase::Unreachable);
        report.trail.enter(Phase::Done);
        warn!("endpoint unreachable");
        return Err(HarnessError::Unreachable {
            endpoint: endpoint.url().to_string(),
        });
    }

    report.trail.enter(Phase::Ready);
    report.trail.enter(Phase::Verifying);
    let verified = verifier.verify(endpoint);
    report.trail.enter(Phase::Done);
    verified.map_err(|source| HarnessError::Verification {
        endpoint: endpoint.url().to_string(),
        source,
    })
}

/// Launch and poll. Returns whether the endpoint became reachable.
fn slow_path<P, S>(
    prober: &P,
    cleanup: &mut Cleanup<'_, S>,
    config: &OrchestratorConfig,
    report: &mut RunReport,
) -> bool
where
    P: Prober + ?Sized,
    S: Supervisor + ?Sized,
{
    let Some(plan) = &config.launch else {
        debug!("no launch plan configured");
        return false;
    };
    if !plan.fixture_exists() {
        info!(fixture = %plan.fixture_path().display(), "launch fixture missing, not launching");
        return false;
    }

    report.trail.enter(Phase::SlowPath);
    let Some(pid) = cleanup.start(plan) else {
        return false;
    };
    report.launched_pid = Some(pid);

    let outcome = poll(prober, &config.endpoint, &config.poll);
    report.poll_attempts = outcome.attempts;
    outcome.ready
}
