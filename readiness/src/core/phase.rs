//! Orchestration phases and the trail a run leaves behind.

use std::fmt;

/// States of a single orchestration run.
///
/// ```text
/// Idle -> FastProbe -> Ready ------------------> Verifying -> Done -> Cleanup
///                   \-> SlowPath -> Ready -----/
///                   \           \-> Unreachable -> Done -> Cleanup
///                    \-> Unreachable -> Done -> Cleanup
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    FastProbe,
    Ready,
    SlowPath,
    Unreachable,
    Verifying,
    Done,
    Cleanup,
}

impl Phase {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_enter(self, next: Phase) -> bool {
        use Phase::{Cleanup, Done, FastProbe, Idle, Ready, SlowPath, Unreachable, Verifying};
        match (self, next) {
            (Idle, FastProbe) => true,
            (FastProbe, Ready | SlowPath | Unreachable) => true,
            (SlowPath, Ready | Unreachable) => true,
            (Ready, Verifying) => true,
            (Unreachable | Verifying, Done) => true,
            (Idle | Cleanup, Cleanup) => false,
            (_, Cleanup) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::FastProbe => "fast_probe",
            Phase::Ready => "ready",
            Phase::SlowPath => "slow_path",
            Phase::Unreachable => "unreachable",
            Phase::Verifying => "verifying",
            Phase::Done => "done",
            Phase::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

/// Ordered record of the phases a run passed through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseTrail {
    phases: Vec<Phase>,
}

impl Default for PhaseTrail {
    fn default() -> Self {
        Self {
            phases: vec![Phase::Idle],
        }
    }
}

impl PhaseTrail {
    pub fn current(&self) -> Phase {
        self.phases.last().copied().unwrap_or(Phase::Idle)
    }

    /// Move to `next`. Illegal transitions are a programming error.
    pub fn enter(&mut self, next: Phase) {
        debug_assert!(
            self.current().can_enter(next),
            "illegal phase transition {} -> {}",
            self.current(),
            next
        );
        self.phases.push(next);
    }

    pub fn contains(&self, phase: Phase) -> bool {
        self.phases.contains(&phase)
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }
}
