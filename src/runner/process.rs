//! Spawning a single external command under a deadline.

use std::collections::BTreeMap;
use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use command_group::{AsyncCommandGroup, AsyncGroupChild};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::error::RunnerError;

/// Time a process group gets between SIGTERM and SIGKILL.
const KILL_GRACE: Duration = Duration::from_secs(2);

/// An external command, its environment overrides and its deadline.
///
/// Overrides apply to the spawned child only; the environment of this
/// process is never modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub timeout: Duration,
    /// Written to the child's stdin, then stdin is closed.
    pub stdin: Option<StdinPayload>,
}

/// Sensitive stdin content; zeroed on drop and never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct StdinPayload(Zeroizing<String>);

impl StdinPayload {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for StdinPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StdinPayload(<redacted>)")
    }
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            timeout,
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn stdin(mut self, payload: StdinPayload) -> Self {
        self.stdin = Some(payload);
        self
    }

    /// Human-readable command line, env overrides first. Values of
    /// sensitive-looking variables are masked.
    pub fn display(&self) -> String {
        let mut parts: Vec<String> = self
            .env
            .iter()
            .map(|(k, v)| {
                if is_sensitive(k) {
                    format!("{k}=***")
                } else {
                    format!("{k}={v}")
                }
            })
            .collect();
        parts.push(self.program.clone());
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

fn is_sensitive(key: &str) -> bool {
    let key = key.to_ascii_uppercase();
    ["PASSWORD", "SECRET", "TOKEN", "CONNECTIONSTRING"]
        .iter()
        .any(|marker| key.replace('_', "").contains(marker))
}

/// How a timed command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Exited zero within the deadline.
    Succeeded,
    /// Exited non-zero within the deadline. `code` is `None` when killed by a signal.
    Failed { code: Option<i32> },
    /// Deadline elapsed; the child's process group was killed and the child reaped.
    TimedOut,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    fn from_status(status: ExitStatus) -> Self {
        if status.success() {
            Self::Succeeded
        } else {
            Self::Failed {
                code: status.code(),
            }
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed { code: Some(code) } => write!(f, "failed (exit {code})"),
            Self::Failed { code: None } => write!(f, "failed"),
            Self::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Output of a command run with piped stdio.
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    pub outcome: Outcome,
    pub stdout: String,
    pub stderr: String,
}

/// Everything known about a finished child.
#[derive(Debug)]
pub(crate) struct Finished {
    pub outcome: Outcome,
    pub pid: Option<u32>,
    pub elapsed: Duration,
    pub stdout: String,
    pub stderr: String,
}

impl Finished {
    fn log(&self, spec: &CommandSpec) {
        debug!(
            command = %spec.program,
            pid = ?self.pid,
            elapsed_ms = self.elapsed.as_millis() as u64,
            outcome = %self.outcome,
            "child finished"
        );
    }
}

/// Run a command with inherited stdio until it exits or its deadline passes.
pub async fn run_timed(spec: &CommandSpec) -> Result<Outcome, RunnerError> {
    let finished = supervise(spec, false).await?;
    finished.log(spec);
    Ok(finished.outcome)
}

/// Run a command with piped stdio and return what it printed.
pub async fn capture(spec: &CommandSpec) -> Result<CapturedOutput, RunnerError> {
    let finished = supervise(spec, true).await?;
    finished.log(spec);
    Ok(CapturedOutput {
        outcome: finished.outcome,
        stdout: finished.stdout,
        stderr: finished.stderr,
    })
}

pub(crate) async fn supervise(spec: &CommandSpec, piped: bool) -> Result<Finished, RunnerError> {
    if spec.program.trim().is_empty() {
        return Err(RunnerError::EmptyCommand);
    }

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .envs(&spec.env)
        .kill_on_drop(true);

    if spec.stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }

    if piped {
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    } else {
        cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
    }

    debug!(command = %spec.display(), timeout_secs = spec.timeout.as_secs(), "spawning");

    let started = Instant::now();
    let deadline = tokio::time::Instant::now() + spec.timeout;

    // Own process group, so a timeout also takes down anything the child forked.
    let mut child: AsyncGroupChild = cmd.group_spawn().map_err(|source| RunnerError::Spawn {
        program: spec.program.clone(),
        source,
    })?;
    let pid = child.inner().id();

    let stdin = child.inner().stdin.take();
    let mut stdout_task = tokio::spawn(read_to_string(child.inner().stdout.take()));
    let mut stderr_task = tokio::spawn(read_to_string(child.inner().stderr.take()));

    // Grandchildren holding the output pipes keep the readers open, so the
    // stdin write, the wait and both joins share one deadline.
    let run = async {
        if let (Some(payload), Some(mut stdin)) = (&spec.stdin, stdin) {
            if let Err(e) = stdin.write_all(payload.as_bytes()).await {
                debug!("error writing child stdin: {}", e);
            }
            // Dropping the handle closes the pipe so the child sees EOF.
            drop(stdin);
        }
        let status = child.wait().await?;
        let stdout = (&mut stdout_task).await.unwrap_or_default();
        let stderr = (&mut stderr_task).await.unwrap_or_default();
        Ok::<_, std::io::Error>((status, stdout, stderr))
    };

    let result = tokio::time::timeout_at(deadline, run).await;
    match result {
        Ok(Ok((status, stdout, stderr))) => Ok(Finished {
            outcome: Outcome::from_status(status),
            pid,
            elapsed: started.elapsed(),
            stdout,
            stderr,
        }),
        Ok(Err(source)) => {
            terminate(&mut child, pid, &spec.program).await;
            stdout_task.abort();
            stderr_task.abort();
            Err(RunnerError::Wait {
                program: spec.program.clone(),
                source,
            })
        }
        Err(_) => {
            warn!(
                command = %spec.display(),
                timeout_secs = spec.timeout.as_secs(),
                "deadline elapsed, killing process group"
            );
            terminate(&mut child, pid, &spec.program).await;
            stdout_task.abort();
            stderr_task.abort();
            Ok(Finished {
                outcome: Outcome::TimedOut,
                pid,
                elapsed: started.elapsed(),
                stdout: String::new(),
                stderr: String::new(),
            })
        }
    }
}

/// Signal the whole process group: SIGTERM, a short grace period, then
/// SIGKILL. The group leader is reaped so no zombie is left behind.
///
/// `pid` is the leader's pid at spawn time; the group id outlives the
/// leader while any member is still running.
#[cfg(unix)]
async fn terminate(child: &mut AsyncGroupChild, pid: Option<u32>, program: &str) {
    use nix::errno::Errno;
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid else {
        return;
    };
    let group = Pid::from_raw(-(pid as i32));

    match signal::kill(group, Signal::SIGTERM) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!(pid, error = ?e, "SIGTERM to process group of {} failed", program),
    }

    let grace = tokio::time::Instant::now() + KILL_GRACE;
    while tokio::time::Instant::now() < grace {
        if child.inner().try_wait().ok().flatten().is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    // Members may have ignored SIGTERM or outlived the leader.
    match signal::kill(group, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!(pid, error = ?e, "SIGKILL to process group of {} failed", program),
    }

    if let Err(e) = child.wait().await {
        warn!("Failed to reap {}: {}", program, e);
    }
}

#[cfg(not(unix))]
async fn terminate(child: &mut AsyncGroupChild, _pid: Option<u32>, program: &str) {
    if let Err(e) = child.kill().await {
        warn!("Failed to kill {}: {}", program, e);
    }
    if let Err(e) = child.wait().await {
        warn!("Failed to reap {}: {}", program, e);
    }
}

async fn read_to_string<R: AsyncRead + Unpin>(stream: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut stream) = stream {
        if let Err(e) = stream.read_to_end(&mut buf).await {
            debug!("error reading child output: {}", e);
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_puts_env_first() {
        let spec = CommandSpec::new("docker", Duration::from_secs(1))
            .args(["build", "-t", "app"])
            .env("DOCKER_BUILDKIT", "0");
        assert_eq!(spec.display(), "DOCKER_BUILDKIT=0 docker build -t app");
    }

    #[test]
    fn test_display_masks_sensitive_env() {
        let spec = CommandSpec::new("docker", Duration::from_secs(1))
            .env("ConnectionStrings__DefaultConnection", "Password=pw")
            .env("POSTGRES_PASSWORD", "pw");
        let shown = spec.display();
        assert!(!shown.contains("pw"));
        assert!(shown.contains("POSTGRES_PASSWORD=***"));
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(Outcome::Succeeded.to_string(), "succeeded");
        assert_eq!(Outcome::Failed { code: Some(2) }.to_string(), "failed (exit 2)");
        assert_eq!(Outcome::TimedOut.to_string(), "timed out");
    }

    #[tokio::test]
    async fn test_empty_program_is_rejected() {
        let spec = CommandSpec::new("  ", Duration::from_secs(1));
        assert!(matches!(run_timed(&spec).await, Err(RunnerError::EmptyCommand)));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let spec = CommandSpec::new("todo-ops-no-such-binary", Duration::from_secs(1));
        assert!(matches!(
            run_timed(&spec).await,
            Err(RunnerError::Spawn { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_codes_map_to_outcomes() {
        let ok = CommandSpec::new("true", Duration::from_secs(5));
        assert_eq!(run_timed(&ok).await.unwrap(), Outcome::Succeeded);

        let failed = CommandSpec::new("sh", Duration::from_secs(5)).args(["-c", "exit 3"]);
        assert_eq!(
            run_timed(&failed).await.unwrap(),
            Outcome::Failed { code: Some(3) }
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_capture_collects_stdout_and_env() {
        let spec = CommandSpec::new("sh", Duration::from_secs(5))
            .args(["-c", "echo \"value=$TODO_OPS_PROBE\"; echo oops >&2"])
            .env("TODO_OPS_PROBE", "42");

        let out = capture(&spec).await.unwrap();

        assert_eq!(out.outcome, Outcome::Succeeded);
        assert_eq!(out.stdout.trim(), "value=42");
        assert_eq!(out.stderr.trim(), "oops");
        // The override never reached this process.
        assert!(std::env::var("TODO_OPS_PROBE").is_err());
    }

    #[test]
    fn test_stdin_payload_is_redacted() {
        let spec = CommandSpec::new("gh", Duration::from_secs(1)).stdin(StdinPayload::new("hunter2"));
        assert!(!format!("{:?}", spec).contains("hunter2"));
        assert_eq!(spec.display(), "gh");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdin_reaches_child() {
        let spec = CommandSpec::new("cat", Duration::from_secs(5)).stdin(StdinPayload::new("s3cret"));
        let out = capture(&spec).await.unwrap();
        assert_eq!(out.stdout, "s3cret");
    }

    /// Gone, or a zombie waiting for init to reap it.
    #[cfg(target_os = "linux")]
    fn is_dead(pid: u32) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Err(_) => true,
            Ok(stat) => stat
                .rsplit(')')
                .next()
                .is_some_and(|rest| rest.trim_start().starts_with('Z')),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_and_reaps_child() {
        let spec = CommandSpec::new("sleep", Duration::from_millis(200)).arg("30");

        let finished = supervise(&spec, false).await.unwrap();

        assert_eq!(finished.outcome, Outcome::TimedOut);
        assert!(finished.elapsed < Duration::from_secs(10));

        #[cfg(target_os = "linux")]
        {
            let pid = finished.pid.expect("child had a pid");
            assert!(
                !std::path::Path::new(&format!("/proc/{pid}")).exists(),
                "child {pid} still present after timeout"
            );
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_kills_grandchildren() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("grandchild.pid");
        let script = format!("sleep 300 & echo $! > {}; wait", pid_file.display());
        let spec = CommandSpec::new("sh", Duration::from_millis(500)).args(["-c", script.as_str()]);

        let outcome = run_timed(&spec).await.unwrap();
        assert_eq!(outcome, Outcome::TimedOut);

        let grandchild: u32 = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        // Give init a moment to reap the orphan.
        for _ in 0..20 {
            if is_dead(grandchild) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(is_dead(grandchild), "grandchild {grandchild} survived the timeout");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_capture_deadline_covers_inherited_pipes() {
        // The shell exits at once but its background job keeps stdout open.
        let spec = CommandSpec::new("sh", Duration::from_secs(1)).args(["-c", "sleep 30 & echo hi"]);

        let started = Instant::now();
        let out = capture(&spec).await.unwrap();

        assert_eq!(out.outcome, Outcome::TimedOut);
        assert!(
            started.elapsed() < Duration::from_secs(10),
            "capture took {:?}",
            started.elapsed()
        );
    }
}
