//! Readiness harness entry point.
//!
//! `readiness check` makes sure the service under test is reachable (launching
//! it if configured to), verifies it, and tears down anything it launched. The
//! exit code tells the calling test suite what happened.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use readiness::error::HarnessError;
use readiness::exit_codes;
use readiness::io::config::{DEFAULT_CONFIG_FILE, HarnessConfig, load_config, write_config};
use readiness::io::probe::TcpProber;
use readiness::io::supervisor::ProcessSupervisor;
use readiness::io::verify::{ReachableOnly, RequireModule, Verifier};
use readiness::logging;
use readiness::orchestrate::orchestrate;

#[derive(Parser)]
#[command(
    name = "readiness",
    version,
    about = "Make sure a service is up (launching it if needed) before integration tests run"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default configuration file.
    Init {
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Probe the endpoint, launch the service if needed, and verify it.
    Check {
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
        /// Endpoint URL, overriding the config file.
        #[arg(long, env = "POLKADOT_WS")]
        endpoint: Option<String>,
        /// Module that must be published, overriding the config file.
        #[arg(long)]
        module: Option<String>,
        /// Never launch a supervised process.
        #[arg(long)]
        no_launch: bool,
    },
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { config, force } => cmd_init(&config, force),
        Command::Check {
            config,
            endpoint,
            module,
            no_launch,
        } => cmd_check(&config, endpoint.as_deref(), module, no_launch),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &HarnessConfig::default())?;
    println!("init: config={}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_check(
    path: &Path,
    endpoint: Option<&str>,
    module: Option<String>,
    no_launch: bool,
) -> Result<i32> {
    let mut cfg = load_config(path).context("load config")?;
    if let Some(module) = module {
        cfg.verify.module = module;
    }
    let mut orchestrator_cfg = cfg.orchestrator_config(endpoint)?;
    if no_launch {
        orchestrator_cfg.launch = None;
    }

    let verifier: Box<dyn Verifier> = match cfg.capability_source() {
        Some(source) => Box::new(RequireModule::new(cfg.verify.module.clone(), source)),
        None => Box::new(ReachableOnly),
    };

    let mut supervisor = ProcessSupervisor::new();
    let result = orchestrate(
        &TcpProber,
        &mut supervisor,
        &orchestrator_cfg,
        verifier.as_ref(),
    );

    let url = orchestrator_cfg.endpoint.url();
    match result {
        Ok(report) => {
            println!(
                "check: endpoint={} outcome=ready launched={} poll_attempts={}",
                url,
                report.launched_pid.is_some(),
                report.poll_attempts
            );
            Ok(exit_codes::OK)
        }
        Err(err) => {
            let outcome = match &err {
                HarnessError::Unreachable { .. } => "unreachable",
                HarnessError::Verification { .. } => "verification_failed",
            };
            println!("check: endpoint={} outcome={}", url, outcome);
            let code = err.exit_code();
            eprintln!("{:#}", anyhow::Error::from(err));
            Ok(code)
        }
    }
}
