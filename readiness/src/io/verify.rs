//! Verification collaborators run once the endpoint is reachable.
//!
//! The orchestrator only needs a [`Verifier`]. The common case, "the service
//! publishes a module with this name", is [`RequireModule`] over any
//! [`CapabilitySource`]. [`CommandCapabilitySource`] delegates the protocol work
//! to an external client that prints one module name per line.

use std::collections::BTreeSet;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, info, instrument};

use crate::core::endpoint::Endpoint;
use crate::io::process::run_verify_command;

/// Verification step executed against a reachable endpoint.
pub trait Verifier {
    fn verify(&self, endpoint: &Endpoint) -> Result<()>;
}

impl<F> Verifier for F
where
    F: Fn(&Endpoint) -> Result<()>,
{
    fn verify(&self, endpoint: &Endpoint) -> Result<()> {
        self(endpoint)
    }
}

/// Verifier that accepts any reachable endpoint.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReachableOnly;

impl Verifier for ReachableOnly {
    fn verify(&self, _endpoint: &Endpoint) -> Result<()> {
        Ok(())
    }
}

/// Source of the named modules a remote service publishes.
pub trait CapabilitySource {
    fn capabilities(&self, endpoint: &Endpoint) -> Result<BTreeSet<String>>;
}

/// Asserts that `module` is published by `source`, ignoring case.
#[derive(Debug, Clone)]
pub struct RequireModule<S> {
    pub module: String,
    pub source: S,
}

impl<S: CapabilitySource> RequireModule<S> {
    pub fn new(module: impl Into<String>, source: S) -> Self {
        Self {
            module: module.into(),
            source,
        }
    }
}

impl<S: CapabilitySource> Verifier for RequireModule<S> {
    #[instrument(skip_all, fields(module = %self.module, endpoint = %endpoint))]
    fn verify(&self, endpoint: &Endpoint) -> Result<()> {
        let published = self
            .source
            .capabilities(endpoint)
            .context("fetch published modules")?;
        let wanted = self.module.to_lowercase();
        if published.iter().any(|name| name.to_lowercase() == wanted) {
            info!(count = published.len(), "required module present");
            return Ok(());
        }
        let seen: Vec<&str> = published.iter().map(String::as_str).collect();
        bail!(
            "module {:?} not published by {} (saw: {})",
            self.module,
            endpoint.url(),
            if seen.is_empty() {
                "none".to_string()
            } else {
                seen.join(", ")
            }
        )
    }
}

/// Capability source backed by an external client command.
///
/// `{url}`, `{host}`, and `{port}` in the arguments are replaced with the
/// endpoint's values. Each non-empty stdout line is one module name.
#[derive(Debug, Clone)]
pub struct CommandCapabilitySource {
    pub command: Vec<String>,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl CommandCapabilitySource {
    fn build(&self, endpoint: &Endpoint) -> Result<Command> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("verify command is empty"))?;
        let mut cmd = Command::new(program);
        cmd.args(args.iter().map(|arg| substitute(arg, endpoint)));
        Ok(cmd)
    }
}

impl CapabilitySource for CommandCapabilitySource {
    #[instrument(skip_all, fields(program = ?self.command.first()))]
    fn capabilities(&self, endpoint: &Endpoint) -> Result<BTreeSet<String>> {
        let cmd = self.build(endpoint)?;
        let output = run_verify_command(cmd, self.timeout, self.output_limit_bytes)
            .context("run verify command")?;
        if output.timed_out {
            bail!("verify command timed out after {:?}", self.timeout);
        }
        if !output.status.success() {
            bail!(
                "verify command failed with status {:?}: {}",
                output.status.code(),
                output.stderr_lossy("verify")
            );
        }
        let names = parse_capabilities(&String::from_utf8_lossy(&output.stdout));
        debug!(count = names.len(), "parsed published modules");
        Ok(names)
    }
}

fn substitute(arg: &str, endpoint: &Endpoint) -> String {
    arg.replace("{url}", endpoint.url())
        .replace("{host}", endpoint.host())
        .replace("{port}", &endpoint.port().to_string())
}

/// One name per line; blank lines and surrounding whitespace are ignored.
pub fn parse_capabilities(stdout: &str) -> BTreeSet<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
