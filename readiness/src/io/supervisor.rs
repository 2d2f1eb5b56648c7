//! Supervised launch of the process that provides the endpoint.
//!
//! The child is placed in its own process group so that it, and anything it
//! spawns, can be terminated as a unit. Its standard streams go to the null
//! device so harness output is never interleaved with child output.

use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::policy::LaunchPlan;

/// Why a supervised launch could not happen.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("program {program:?} not found on PATH")]
    NotFound { program: String },
    #[error("working directory {} does not exist", path.display())]
    MissingWorkdir { path: PathBuf },
    #[error("spawn {program:?}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("a supervised process (pid {pid}) is already running")]
    AlreadyRunning { pid: u32 },
}

/// Abstraction over process supervision so orchestration can be tested without spawning.
pub trait Supervisor {
    /// Launch `plan` and return the pid of the group leader.
    fn start(&mut self, plan: &LaunchPlan) -> Result<u32, LaunchError>;

    /// Terminate whatever `start` launched. Idempotent and infallible.
    fn stop(&mut self);
}

/// A launched process group. Only [`ProcessSupervisor`] holds one.
#[derive(Debug)]
pub struct SupervisedProcess {
    pub pid: u32,
    pub process_group_id: u32,
    child: Child,
    stop_grace: Duration,
}

/// Supervisor backed by real OS processes.
#[derive(Debug, Default)]
pub struct ProcessSupervisor {
    process: Option<SupervisedProcess>,
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&self) -> Option<&SupervisedProcess> {
        self.process.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.process.is_some()
    }
}

impl Supervisor for ProcessSupervisor {
    #[instrument(skip_all, fields(program = %plan.program))]
    fn start(&mut self, plan: &LaunchPlan) -> Result<u32, LaunchError> {
        if let Some(process) = &self.process {
            return Err(LaunchError::AlreadyRunning { pid: process.pid });
        }
        if !plan.workdir.is_dir() {
            return Err(LaunchError::MissingWorkdir {
                path: plan.workdir.clone(),
            });
        }
        let program = resolve_program(&plan.program, &plan.workdir).ok_or_else(|| {
            LaunchError::NotFound {
                program: plan.program.clone(),
            }
        })?;

        let mut cmd = Command::new(&program);
        cmd.args(&plan.args)
            .current_dir(&plan.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        detach(&mut cmd);

        let child = cmd.spawn().map_err(|source| LaunchError::Spawn {
            program: plan.program.clone(),
            source,
        })?;
        let pid = child.id();
        info!(pid, program = %program.display(), "supervised process started");

        self.process = Some(SupervisedProcess {
            pid,
            process_group_id: pid,
            child,
            stop_grace: plan.stop_grace,
        });
        Ok(pid)
    }

    fn stop(&mut self) {
        let Some(mut process) = self.process.take() else {
            debug!("no supervised process to stop");
            return;
        };
        terminate(&mut process);
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Resolve `program` the way a shell would: bare names are searched on `PATH`,
/// names with a path separator are taken relative to `workdir`.
pub fn resolve_program(program: &str, workdir: &Path) -> Option<PathBuf> {
    if program.is_empty() {
        return None;
    }
    let as_path = Path::new(program);
    if as_path.components().count() > 1 {
        let candidate = workdir.join(as_path).canonicalize().ok()?;
        return is_executable(&candidate).then_some(candidate);
    }
    let search = env::var_os("PATH")?;
    env::split_paths(&search)
        .flat_map(|dir| executable_candidates(&dir, program))
        .find(|candidate| is_executable(candidate))
}

fn executable_candidates(dir: &Path, program: &str) -> Vec<PathBuf> {
    let mut candidates = vec![dir.join(program)];
    if cfg!(windows) {
        candidates.push(dir.join(format!("{program}{}", env::consts::EXE_SUFFIX)));
    }
    candidates
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(unix)]
fn detach(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn detach(_cmd: &mut Command) {}

#[cfg(unix)]
fn terminate(process: &mut SupervisedProcess) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    #[allow(clippy::cast_possible_wrap)]
    let group = Pid::from_raw(process.process_group_id as i32);
    if let Err(err) = killpg(group, Signal::SIGTERM) {
        warn!(pgid = process.process_group_id, err = %err, "SIGTERM to process group failed");
    }

    match process.child.wait_timeout(process.stop_grace) {
        Ok(Some(status)) => {
            debug!(pid = process.pid, exit_code = ?status.code(), "supervised process exited");
        }
        Ok(None) => {
            warn!(
                pid = process.pid,
                grace_ms = process.stop_grace.as_millis() as u64,
                "supervised process ignored SIGTERM, killing group"
            );
            kill_group(process, group);
            reap(process);
        }
        Err(err) => {
            warn!(pid = process.pid, err = %err, "wait for supervised process failed");
            kill_group(process, group);
            reap(process);
        }
    }
    // Stragglers that outlived the leader still share its group.
    match killpg(group, None) {
        Err(Errno::ESRCH) => debug!(pgid = process.process_group_id, "process group is empty"),
        _ => kill_group(process, group),
    }
    info!(pid = process.pid, "supervised process stopped");
}

#[cfg(unix)]
fn kill_group(process: &SupervisedProcess, group: nix::unistd::Pid) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};

    match killpg(group, Signal::SIGKILL) {
        Ok(()) => {}
        Err(Errno::ESRCH) => debug!(pgid = process.process_group_id, "process group already gone"),
        Err(err) => {
            warn!(pgid = process.process_group_id, err = %err, "SIGKILL to process group failed");
        }
    }
}

#[cfg(not(unix))]
fn terminate(process: &mut SupervisedProcess) {
    let tree_kill = Command::new("taskkill")
        .args(["/T", "/F", "/PID", &process.pid.to_string()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    if let Err(err) = tree_kill {
        warn!(pid = process.pid, err = %err, "taskkill failed");
    }
    if let Err(err) = process.child.kill() {
        debug!(pid = process.pid, err = %err, "kill after taskkill failed");
    }
    reap(process);
    info!(pid = process.pid, "supervised process stopped");
}

fn reap(process: &mut SupervisedProcess) {
    if let Err(err) = process.child.wait() {
        warn!(pid = process.pid, err = %err, "reap supervised process failed");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    fn plan(program: &str, args: &[&str], workdir: &Path) -> LaunchPlan {
        LaunchPlan {
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            workdir: workdir.to_path_buf(),
            fixture: PathBuf::from("fixture.json"),
            stop_grace: Duration::from_secs(2),
        }
    }

    #[allow(clippy::cast_possible_wrap)]
    fn alive(pid: u32) -> bool {
        kill(Pid::from_raw(pid as i32), None).is_ok()
    }

    #[test]
    fn stop_without_start_is_noop() {
        let mut supervisor = ProcessSupervisor::new();
        supervisor.stop();
        supervisor.stop();
        assert!(!supervisor.is_running());
    }

    #[test]
    fn start_then_stop_terminates_leader() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut supervisor = ProcessSupervisor::new();

        let pid = supervisor
            .start(&plan("sleep", &["30"], temp.path()))
            .expect("start sleep");
        assert!(alive(pid));
        let process = supervisor.process().expect("process");
        assert_eq!(process.process_group_id, pid);

        supervisor.stop();
        assert!(!supervisor.is_running());
        assert!(!alive(pid), "leader should be reaped");

        supervisor.stop();
    }

    #[test]
    fn second_start_is_rejected_while_running() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut supervisor = ProcessSupervisor::new();
        supervisor
            .start(&plan("sleep", &["30"], temp.path()))
            .expect("first start");

        let err = supervisor
            .start(&plan("sleep", &["30"], temp.path()))
            .unwrap_err();
        assert!(matches!(err, LaunchError::AlreadyRunning { .. }));
    }

    #[test]
    fn missing_program_is_launch_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut supervisor = ProcessSupervisor::new();

        let err = supervisor
            .start(&plan("definitely-not-a-real-binary-4d1f", &[], temp.path()))
            .unwrap_err();
        assert!(matches!(err, LaunchError::NotFound { .. }));
        supervisor.stop();
    }

    #[test]
    fn missing_workdir_is_launch_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut supervisor = ProcessSupervisor::new();

        let err = supervisor
            .start(&plan("sleep", &["1"], &temp.path().join("gone")))
            .unwrap_err();
        assert!(matches!(err, LaunchError::MissingWorkdir { .. }));
    }

    #[test]
    fn stop_escalates_when_sigterm_is_ignored() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut supervisor = ProcessSupervisor::new();
        let mut launch = plan("sh", &["-c", "trap '' TERM; sleep 30"], temp.path());
        launch.stop_grace = Duration::from_millis(200);

        let pid = supervisor.start(&launch).expect("start sh");
        // Give the shell time to install its trap.
        std::thread::sleep(Duration::from_millis(100));
        supervisor.stop();
        assert!(!alive(pid));
    }

    /// Dead or a zombie waiting for init; either way no longer running.
    #[allow(clippy::cast_possible_wrap)]
    fn gone(pid: u32) -> bool {
        if kill(Pid::from_raw(pid as i32), None).is_err() {
            return true;
        }
        if cfg!(target_os = "linux") {
            let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
                return true;
            };
            let state = stat
                .rfind(')')
                .and_then(|end| stat[end + 1..].trim_start().chars().next());
            return state == Some('Z');
        }
        false
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while std::time::Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        condition()
    }

    #[test]
    fn stop_terminates_grandchildren() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut supervisor = ProcessSupervisor::new();
        let mut launch = plan("sh", &["-c", "sleep 30 & echo $! > gc.pid; wait"], temp.path());
        launch.stop_grace = Duration::from_millis(500);
        supervisor.start(&launch).expect("start sh");

        let pid_file = temp.path().join("gc.pid");
        let mut grandchild = None;
        assert!(
            wait_for(|| {
                grandchild = std::fs::read_to_string(&pid_file)
                    .ok()
                    .and_then(|text| text.trim().parse::<u32>().ok());
                grandchild.is_some()
            }),
            "shell never recorded its background pid"
        );
        let grandchild = grandchild.expect("grandchild pid");
        assert!(!gone(grandchild));

        supervisor.stop();
        assert!(wait_for(|| gone(grandchild)), "grandchild {grandchild} survived stop");
    }

    #[test]
    fn resolve_program_finds_path_binaries() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(resolve_program("sh", temp.path()).is_some());
        assert!(resolve_program("", temp.path()).is_none());
        assert!(resolve_program("./no/such/program", temp.path()).is_none());
    }

    #[test]
    fn relative_program_resolves_against_workdir() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().expect("tempdir");
        let script = temp.path().join("node.sh");
        std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").expect("write script");
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).expect("chmod");

        let resolved = resolve_program("./node.sh", temp.path()).expect("resolve");
        assert!(resolved.is_absolute());

        let mut supervisor = ProcessSupervisor::new();
        let pid = supervisor
            .start(&plan("./node.sh", &[], temp.path()))
            .expect("start script");
        assert!(alive(pid));
        supervisor.stop();
        assert!(!alive(pid));
    }
}
