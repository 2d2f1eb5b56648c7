//! Harness configuration stored in `readiness.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::endpoint::{DEFAULT_ENDPOINT, Endpoint};
use crate::core::policy::{LaunchPlan, PollPolicy};
use crate::io::verify::CommandCapabilitySource;
use crate::orchestrate::OrchestratorConfig;

pub const DEFAULT_CONFIG_FILE: &str = "readiness.toml";

/// Harness configuration (TOML).
///
/// Missing fields default to values suitable for a local development node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HarnessConfig {
    /// URL of the service under test. Overridden by `--endpoint` / `POLKADOT_WS`.
    pub endpoint: String,

    /// Connect timeout for the initial probe, before any launch.
    pub fast_probe_timeout_ms: u64,

    pub poll: PollConfig,

    /// Supervised launch. Absent means the service must already be running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launch: Option<LaunchConfig>,

    pub verify: VerifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PollConfig {
    pub interval_ms: u64,
    pub max_attempts: u32,
    pub probe_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LaunchConfig {
    /// Executable name, looked up on `PATH`.
    pub program: String,
    pub args: Vec<String>,
    pub workdir: PathBuf,
    /// Must exist (relative to `workdir`) before a launch is attempted.
    pub fixture: PathBuf,
    pub stop_grace_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VerifyConfig {
    /// Module that must be published by the service (case-insensitive).
    pub module: String,
    /// Client command printing published modules, one per line. Empty skips verification.
    pub command: Vec<String>,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            fast_probe_timeout_ms: 1000,
            poll: PollConfig::default(),
            launch: None,
            verify: VerifyConfig::default(),
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        let policy = PollPolicy::default();
        Self {
            interval_ms: policy.interval.as_millis() as u64,
            max_attempts: policy.max_attempts,
            probe_timeout_ms: policy.probe_timeout.as_millis() as u64,
        }
    }
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            program: String::new(),
            args: Vec::new(),
            workdir: PathBuf::from("."),
            fixture: PathBuf::new(),
            stop_grace_ms: 5000,
        }
    }
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            module: "nfts".to_string(),
            command: Vec::new(),
            timeout_secs: 60,
            output_limit_bytes: 100_000,
        }
    }
}

impl HarnessConfig {
    pub fn validate(&self) -> Result<()> {
        Endpoint::parse(&self.endpoint).context("endpoint")?;
        if self.fast_probe_timeout_ms == 0 {
            return Err(anyhow!("fast_probe_timeout_ms must be > 0"));
        }
        self.poll.policy().validate().context("poll")?;
        if let Some(launch) = &self.launch {
            if launch.program.trim().is_empty() {
                return Err(anyhow!("launch.program must be non-empty"));
            }
            if launch.fixture.as_os_str().is_empty() {
                return Err(anyhow!("launch.fixture must be set"));
            }
        }
        if self.verify.module.trim().is_empty() {
            return Err(anyhow!("verify.module must be non-empty"));
        }
        if self.verify.timeout_secs == 0 {
            return Err(anyhow!("verify.timeout_secs must be > 0"));
        }
        if self.verify.output_limit_bytes == 0 {
            return Err(anyhow!("verify.output_limit_bytes must be > 0"));
        }
        Ok(())
    }

    /// Build the orchestrator input. `endpoint_override` wins over `self.endpoint`.
    pub fn orchestrator_config(
        &self,
        endpoint_override: Option<&str>,
    ) -> Result<OrchestratorConfig> {
        let raw = endpoint_override.unwrap_or(&self.endpoint);
        Ok(OrchestratorConfig {
            endpoint: Endpoint::parse(raw)?,
            fast_probe_timeout: Duration::from_millis(self.fast_probe_timeout_ms),
            poll: self.poll.policy(),
            launch: self.launch.as_ref().map(LaunchConfig::plan),
        })
    }

    /// Command-backed capability source, if a verify command is configured.
    pub fn capability_source(&self) -> Option<CommandCapabilitySource> {
        if self.verify.command.is_empty() {
            return None;
        }
        Some(CommandCapabilitySource {
            command: self.verify.command.clone(),
            timeout: Duration::from_secs(self.verify.timeout_secs),
            output_limit_bytes: self.verify.output_limit_bytes,
        })
    }
}

impl PollConfig {
    pub fn policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.interval_ms),
            max_attempts: self.max_attempts,
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
        }
    }
}

impl LaunchConfig {
    pub fn plan(&self) -> LaunchPlan {
        LaunchPlan {
            program: self.program.clone(),
            args: self.args.clone(),
            workdir: self.workdir.clone(),
            fixture: self.fixture.clone(),
            stop_grace: Duration::from_millis(self.stop_grace_ms),
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `HarnessConfig::default()`. A relative
/// `launch.workdir` is anchored at the config file's directory.
pub fn load_config(path: &Path) -> Result<HarnessConfig> {
    if !path.exists() {
        let cfg = HarnessConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let mut cfg: HarnessConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    if let (Some(launch), Some(base)) = (cfg.launch.as_mut(), path.parent())
        && launch.workdir.is_relative()
    {
        launch.workdir = base.join(&launch.workdir);
    }
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &HarnessConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
