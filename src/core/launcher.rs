//! # Process launcher.
//!
//! Spawns the wrapped runtime binary for one task and decodes its exit status.
//!
//! ## Rules
//! - argv is passed verbatim (no shell interpretation)
//! - the environment is exactly the task's environment; the driver's own is not inherited
//! - stdin is closed; stdout/stderr go to a file (append) or are discarded
//! - the working directory is the task directory
//! - failure to start the child is a [`LaunchError`], never a task exit

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};

use crate::core::record::{DEFAULT_EXIT_CODE, ExitResult};
use crate::error::LaunchError;
use crate::runtime::TaskRequest;

/// Where one standard stream of the child goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdioSink {
    /// `/dev/null`.
    Discard,
    /// Append to the given file, creating it when missing.
    File(PathBuf),
}

impl StdioSink {
    /// Maps an optional configured path to a sink.
    pub fn from_path(path: Option<&Path>) -> Self {
        match path {
            Some(p) => StdioSink::File(p.to_path_buf()),
            None => StdioSink::Discard,
        }
    }

    fn open(&self, stream: &'static str) -> Result<Stdio, LaunchError> {
        match self {
            StdioSink::Discard => Ok(Stdio::null()),
            StdioSink::File(path) => OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map(Stdio::from)
                .map_err(|source| LaunchError::Stdio {
                    stream,
                    path: path.clone(),
                    source,
                }),
        }
    }
}

/// Everything needed to start one workload process.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Resolved runtime binary.
    pub binary: PathBuf,
    /// Arguments after `argv[0]`.
    pub argv: Vec<String>,
    /// Complete child environment.
    pub env: BTreeMap<String, String>,
    /// Working directory.
    pub work_dir: PathBuf,
    /// Stdout target.
    pub stdout: StdioSink,
    /// Stderr target.
    pub stderr: StdioSink,
}

impl LaunchSpec {
    /// Builds a spec from a task request.
    pub fn for_request(binary: PathBuf, argv: Vec<String>, request: &TaskRequest) -> Self {
        Self {
            binary,
            argv,
            env: request.env.clone(),
            work_dir: request.task_dir.clone(),
            stdout: StdioSink::from_path(request.stdout_path.as_deref()),
            stderr: StdioSink::from_path(request.stderr_path.as_deref()),
        }
    }
}

/// A started child process.
#[derive(Debug)]
pub struct ProcessHandle {
    /// Process id, known from the moment the child exists.
    pub pid: u32,
    /// Kernel start time of the child, see [`process_start_time`].
    pub start_time: Option<u64>,
    child: Child,
}

impl ProcessHandle {
    /// Waits for the child to terminate and reaps it.
    pub async fn wait(mut self) -> io::Result<ExitStatus> {
        self.child.wait().await
    }
}

/// Spawns the process described by `spec`.
///
/// Must be called from within a tokio runtime. Opening a file sink and the spawn
/// itself may block, so async callers run this on the blocking pool.
pub fn launch(spec: &LaunchSpec) -> Result<ProcessHandle, LaunchError> {
    let stdout = spec.stdout.open("stdout")?;
    let stderr = spec.stderr.open("stderr")?;

    let child = Command::new(&spec.binary)
        .args(&spec.argv)
        .env_clear()
        .envs(&spec.env)
        .current_dir(&spec.work_dir)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr)
        .spawn()
        .map_err(|source| LaunchError::Spawn {
            binary: spec.binary.clone(),
            source,
        })?;

    let pid = child.id().ok_or(LaunchError::MissingPid)?;
    // the child is not reaped yet, so its stat entry exists even if it already exited
    let start_time = process_start_time(pid);
    Ok(ProcessHandle {
        pid,
        start_time,
        child,
    })
}

/// Resolves the runtime binary: the configured path when given, otherwise `default` through `PATH`.
pub fn resolve_binary(configured: Option<&Path>, default: &str) -> Result<PathBuf, LaunchError> {
    match configured {
        Some(path) => Ok(path.to_path_buf()),
        None => which::which(default).map_err(|e| LaunchError::BinaryNotFound {
            name: default.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Decodes a wait status into an exit result.
///
/// A coded exit yields its code; death by signal yields [`DEFAULT_EXIT_CODE`] plus the signal.
pub fn decode_exit(status: ExitStatus) -> ExitResult {
    match status.code() {
        Some(code) => ExitResult::exited(code, None),
        None => ExitResult::exited(DEFAULT_EXIT_CODE, status.signal()),
    }
}

/// Sends `sig` to `pid`. A process that is already gone is not an error.
pub fn send_signal(pid: u32, sig: Signal) -> Result<(), Errno> {
    match signal::kill(to_pid(pid), sig) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Returns true when `pid` exists and is not a zombie.
pub fn process_alive(pid: u32) -> bool {
    match signal::kill(to_pid(pid), None) {
        Ok(()) | Err(Errno::EPERM) => !is_zombie(pid),
        Err(_) => false,
    }
}

/// Returns true when `pid` is alive and is the process that was started at `start_time`.
///
/// A pid reused by an unrelated process counts as gone. Without a recorded start
/// time only liveness is checked.
pub fn process_matches(pid: u32, start_time: Option<u64>) -> bool {
    if !process_alive(pid) {
        return false;
    }
    match start_time {
        Some(expected) => process_start_time(pid) == Some(expected),
        None => true,
    }
}

/// Kernel start time of `pid` in clock ticks since boot (field 22 of `/proc/<pid>/stat`).
///
/// `None` when procfs is unavailable or the process does not exist.
pub fn process_start_time(pid: u32) -> Option<u64> {
    let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    parse_start_time(&stat)
}

/// Parses `SIGTERM`, `TERM` or a signal number.
pub fn parse_signal(name: &str) -> Option<Signal> {
    let name = name.trim();
    if let Ok(num) = name.parse::<i32>() {
        return Signal::try_from(num).ok();
    }
    let upper = name.to_ascii_uppercase();
    if upper.starts_with("SIG") {
        upper.parse().ok()
    } else {
        format!("SIG{upper}").parse().ok()
    }
}

fn to_pid(pid: u32) -> Pid {
    Pid::from_raw(pid as i32)
}

// Fields after the command name; the name in field 2 may contain spaces and parens.
fn stat_fields(stat: &str) -> Option<std::str::SplitWhitespace<'_>> {
    Some(stat[stat.rfind(')')? + 1..].split_whitespace())
}

fn parse_start_time(stat: &str) -> Option<u64> {
    stat_fields(stat)?.nth(19)?.parse().ok()
}

// Third field of /proc/<pid>/stat; absent procfs means "not a zombie".
fn is_zombie(pid: u32) -> bool {
    std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .and_then(|stat| stat_fields(&stat)?.next().map(|s| s == "Z"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str, dir: &Path) -> LaunchSpec {
        LaunchSpec {
            binary: PathBuf::from("/bin/sh"),
            argv: vec!["-c".into(), script.into()],
            env: BTreeMap::from([("PATH".to_string(), "/usr/bin:/bin".to_string())]),
            work_dir: dir.to_path_buf(),
            stdout: StdioSink::Discard,
            stderr: StdioSink::Discard,
        }
    }

    #[tokio::test]
    async fn test_exit_code_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let proc = launch(&sh("exit 3", dir.path())).unwrap();
        assert!(proc.pid > 0);

        let status = proc.wait().await.unwrap();
        assert_eq!(decode_exit(status), ExitResult::exited(3, None));
    }

    #[tokio::test]
    async fn test_signal_death_uses_default_code() {
        let dir = tempfile::tempdir().unwrap();
        let proc = launch(&sh("sleep 30", dir.path())).unwrap();
        send_signal(proc.pid, Signal::SIGKILL).unwrap();

        let status = proc.wait().await.unwrap();
        assert_eq!(
            decode_exit(status),
            ExitResult::exited(DEFAULT_EXIT_CODE, Some(Signal::SIGKILL as i32))
        );
    }

    #[tokio::test]
    async fn test_stdout_goes_to_file_and_env_is_not_inherited() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("stdout.log");
        let mut spec = sh("echo \"$PWD|$HOME|$GREETING\"", dir.path());
        spec.env.insert("GREETING".into(), "hi".into());
        spec.stdout = StdioSink::File(out.clone());

        launch(&spec).unwrap().wait().await.unwrap();

        let written = std::fs::read_to_string(&out).unwrap();
        let pwd = dir.path().canonicalize().unwrap();
        assert_eq!(written.trim(), format!("{}||hi", pwd.display()));
    }

    #[tokio::test]
    async fn test_missing_binary_fails_launch() {
        let dir = tempfile::tempdir().unwrap();
        let mut spec = sh("true", dir.path());
        spec.binary = dir.path().join("no-such-runtime");

        let err = launch(&spec).unwrap_err();
        assert_eq!(err.as_label(), "launch_spawn");
    }

    #[test]
    fn test_parse_start_time_with_spaces_in_name() {
        let stat = "42 (my (odd) task) S 1 42 42 0 -1 4194560 100 0 0 0 17 5 0 0 20 0 1 0 98765 1000 50";
        assert_eq!(parse_start_time(stat), Some(98765));
        assert_eq!(parse_start_time("42 (short) S 1"), None);
    }

    #[tokio::test]
    async fn test_reused_pid_does_not_match() {
        let dir = tempfile::tempdir().unwrap();
        let proc = launch(&sh("sleep 30", dir.path())).unwrap();
        let pid = proc.pid;
        let start_time = proc.start_time.expect("procfs start time");

        assert!(process_matches(pid, Some(start_time)));
        assert!(process_matches(pid, None));
        assert!(!process_matches(pid, Some(start_time + 1)));

        send_signal(pid, Signal::SIGKILL).unwrap();
        proc.wait().await.unwrap();
        assert!(!process_matches(pid, Some(start_time)));
    }

    #[test]
    fn test_parse_signal_forms() {
        assert_eq!(parse_signal("SIGTERM"), Some(Signal::SIGTERM));
        assert_eq!(parse_signal("term"), Some(Signal::SIGTERM));
        assert_eq!(parse_signal("9"), Some(Signal::SIGKILL));
        assert_eq!(parse_signal("SIGNOPE"), None);
    }

    #[test]
    fn test_resolve_prefers_configured_path() {
        let path = resolve_binary(Some(Path::new("/opt/runtime")), "singularity").unwrap();
        assert_eq!(path, PathBuf::from("/opt/runtime"));

        let err = resolve_binary(None, "definitely-not-a-real-binary-xyz").unwrap_err();
        assert_eq!(err.as_label(), "launch_binary_not_found");
    }
}
