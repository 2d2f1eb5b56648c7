//! Polling and launch policies for the orchestrator.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, anyhow};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(1000);

/// How long and how often to poll for readiness after a supervised launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Sleep between consecutive probes.
    pub interval: Duration,
    /// Total number of probes, including the first.
    pub max_attempts: u32,
    /// Connect timeout applied to each probe.
    pub probe_timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Result<Self> {
        let policy = Self {
            interval,
            max_attempts,
            ..Self::default()
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(anyhow!("poll interval must be > 0"));
        }
        if self.max_attempts == 0 {
            return Err(anyhow!("poll max_attempts must be > 0"));
        }
        if self.probe_timeout.is_zero() {
            return Err(anyhow!("probe timeout must be > 0"));
        }
        Ok(())
    }

    /// Upper bound on the wall-clock time a full poll loop can take.
    pub fn ceiling(&self) -> Duration {
        let sleeps = self.interval * self.max_attempts.saturating_sub(1);
        sleeps + self.probe_timeout * self.max_attempts
    }
}

/// What to launch when the endpoint is not already reachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    /// Executable name, resolved through `PATH` unless it contains a separator.
    pub program: String,
    pub args: Vec<String>,
    pub workdir: PathBuf,
    /// Artifact that must exist before a launch is attempted.
    pub fixture: PathBuf,
    /// Time allowed between SIGTERM and SIGKILL when stopping.
    pub stop_grace: Duration,
}

impl LaunchPlan {
    /// Fixture path with relative paths anchored at `workdir`.
    pub fn fixture_path(&self) -> PathBuf {
        anchor(&self.workdir, &self.fixture)
    }

    pub fn fixture_exists(&self) -> bool {
        self.fixture_path().is_file()
    }
}

fn anchor(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
