//! Test-only collaborators for driving orchestration without real services.

use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

use crate::core::endpoint::Endpoint;
use crate::core::policy::LaunchPlan;
use crate::io::probe::Prober;
use crate::io::supervisor::{LaunchError, Supervisor};
use crate::io::verify::CapabilitySource;

/// Prober that answers from a script, repeating the last answer once exhausted.
///
/// An empty script always answers `false`.
#[derive(Debug, Default)]
pub struct ScriptedProber {
    script: RefCell<VecDeque<bool>>,
    last: RefCell<bool>,
    timeouts: RefCell<Vec<Duration>>,
}

impl ScriptedProber {
    pub fn new(script: impl IntoIterator<Item = bool>) -> Self {
        Self {
            script: RefCell::new(script.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn never() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.timeouts.borrow().len()
    }

    /// Timeout passed to each probe, in call order.
    pub fn timeouts(&self) -> Vec<Duration> {
        self.timeouts.borrow().clone()
    }
}

impl Prober for ScriptedProber {
    fn probe(&self, _endpoint: &Endpoint, timeout: Duration) -> bool {
        self.timeouts.borrow_mut().push(timeout);
        let next = self.script.borrow_mut().pop_front();
        match next {
            Some(answer) => {
                *self.last.borrow_mut() = answer;
                answer
            }
            None => *self.last.borrow(),
        }
    }
}

/// Supervisor that records calls instead of spawning.
#[derive(Debug, Default)]
pub struct RecordingSupervisor {
    /// When set, `start` fails with [`LaunchError::NotFound`].
    pub fail_start: bool,
    starts: Vec<LaunchPlan>,
    stops: usize,
    running: bool,
}

impl RecordingSupervisor {
    pub fn failing() -> Self {
        Self {
            fail_start: true,
            ..Self::default()
        }
    }

    pub fn starts(&self) -> usize {
        self.starts.len()
    }

    pub fn started_plans(&self) -> &[LaunchPlan] {
        &self.starts
    }

    /// Number of `stop` calls, including no-op ones.
    pub fn stops(&self) -> usize {
        self.stops
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl Supervisor for RecordingSupervisor {
    fn start(&mut self, plan: &LaunchPlan) -> Result<u32, LaunchError> {
        if self.fail_start {
            return Err(LaunchError::NotFound {
                program: plan.program.clone(),
            });
        }
        self.starts.push(plan.clone());
        self.running = true;
        Ok(4242)
    }

    fn stop(&mut self) {
        self.stops += 1;
        self.running = false;
    }
}

/// Capability source returning a fixed set of names.
#[derive(Debug, Clone, Default)]
pub struct StaticCapabilities {
    names: BTreeSet<String>,
}

impl StaticCapabilities {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl CapabilitySource for StaticCapabilities {
    fn capabilities(&self, _endpoint: &Endpoint) -> Result<BTreeSet<String>> {
        Ok(self.names.clone())
    }
}

/// Temporary working directory for launch plans.
pub struct LaunchDir {
    dir: tempfile::TempDir,
}

impl LaunchDir {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir().context("create launch dir")?,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a fixture file relative to the launch dir.
    pub fn write_fixture(&self, name: &str) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        fs::write(&path, "{}\n").with_context(|| format!("write fixture {}", path.display()))?;
        Ok(path)
    }

    /// Launch plan rooted at this dir that expects `fixture`.
    pub fn plan(&self, program: &str, args: &[&str], fixture: &str) -> LaunchPlan {
        LaunchPlan {
            program: program.to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
            workdir: self.dir.path().to_path_buf(),
            fixture: PathBuf::from(fixture),
            stop_grace: Duration::from_secs(2),
        }
    }
}
