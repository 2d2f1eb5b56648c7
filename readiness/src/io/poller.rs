//! Bounded readiness polling.

use std::thread;

use tracing::{debug, instrument, warn};

use crate::core::endpoint::Endpoint;
use crate::core::policy::PollPolicy;
use crate::io::probe::Prober;

/// Result of a poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOutcome {
    pub ready: bool,
    /// Number of probes issued, including the successful one.
    pub attempts: u32,
}

/// Probe `endpoint` until it answers or `policy.max_attempts` probes have failed.
///
/// Probes are strictly sequential. The loop sleeps `policy.interval` between
/// attempts, never after the last attempt or after a success.
#[instrument(skip_all, fields(endpoint = %endpoint, max_attempts = policy.max_attempts))]
pub fn poll<P: Prober + ?Sized>(
    prober: &P,
    endpoint: &Endpoint,
    policy: &PollPolicy,
) -> PollOutcome {
    for attempt in 1..=policy.max_attempts {
        if prober.probe(endpoint, policy.probe_timeout) {
            debug!(attempt, "endpoint ready");
            return PollOutcome {
                ready: true,
                attempts: attempt,
            };
        }
        debug!(attempt, "endpoint not ready yet");
        if attempt < policy.max_attempts {
            thread::sleep(policy.interval);
        }
    }
    warn!(attempts = policy.max_attempts, "readiness polling exhausted");
    PollOutcome {
        ready: false,
        attempts: policy.max_attempts,
    }
}

/// Boolean view of [`poll`].
pub fn wait_until_ready<P: Prober + ?Sized>(
    prober: &P,
    endpoint: &Endpoint,
    policy: &PollPolicy,
) -> bool {
    poll(prober, endpoint, policy).ready
}
