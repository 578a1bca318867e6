//
//  probe.rs
//  Restructure
//
//  Created by hak (tharun)
//

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Outcome of one verification run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeOutcome {
    pub passed: bool,
    pub timed_out: bool,
    /// Combined stdout and stderr.
    pub output: String,
    pub duration_ms: u64,
}

impl ProbeOutcome {
    pub fn pass(output: impl Into<String>) -> Self {
        Self {
            passed: true,
            timed_out: false,
            output: output.into(),
            duration_ms: 0,
        }
    }

    pub fn fail(output: impl Into<String>) -> Self {
        Self {
            passed: false,
            timed_out: false,
            output: output.into(),
            duration_ms: 0,
        }
    }
}

/// External check run against the migrated tree before commit.
pub trait VerificationProbe {
    fn verify(&self, root: &Path, timeout: Duration) -> ProbeOutcome;
}

impl<F> VerificationProbe for F
where
    F: Fn(&Path, Duration) -> ProbeOutcome,
{
    fn verify(&self, root: &Path, timeout: Duration) -> ProbeOutcome {
        self(root, timeout)
    }
}

/// Runs a command in the project root; exit status zero passes.
///
/// Blocks on its own current-thread runtime, so it must not be called from
/// inside an async context.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandProbe {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// `sh -c <command>`.
    pub fn shell(command: impl Into<String>) -> Self {
        Self::new("sh", vec!["-c".to_string(), command.into()])
    }

    async fn run(&self, root: &Path, limit: Duration) -> ProbeOutcome {
        let started = Instant::now();
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .current_dir(root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so a timeout can reach whatever the command spawned.
        #[cfg(unix)]
        cmd.process_group(0);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(program = %self.program.display(), error = %e, "probe failed to start");
                return ProbeOutcome::fail(format!("failed to start {}: {e}", self.program.display()));
            }
        };

        let pid = child.id();
        // Dropping the future on timeout kills the child; the group kill below
        // takes its descendants.
        let result = timeout(limit, child.wait_with_output()).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(output)) => {
                let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                text.push_str(&String::from_utf8_lossy(&output.stderr));
                debug!(status = ?output.status.code(), duration_ms, "probe finished");
                ProbeOutcome {
                    passed: output.status.success(),
                    timed_out: false,
                    output: text,
                    duration_ms,
                }
            }
            Ok(Err(e)) => ProbeOutcome {
                passed: false,
                timed_out: false,
                output: format!("probe I/O error: {e}"),
                duration_ms,
            },
            Err(_) => {
                warn!(timeout_secs = limit.as_secs(), "probe timed out");
                if let Some(pid) = pid {
                    kill_group(pid).await;
                }
                ProbeOutcome {
                    passed: false,
                    timed_out: true,
                    output: format!("timed out after {}s", limit.as_secs()),
                    duration_ms,
                }
            }
        }
    }
}

/// SIGKILL every process in the group led by `pid`.
#[cfg(unix)]
async fn kill_group(pid: u32) {
    let status = Command::new("kill")
        .args(["-KILL", "--", &format!("-{pid}")])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    match status {
        Ok(status) if status.success() => debug!(pid, "process group killed"),
        Ok(_) => debug!(pid, "process group already gone"),
        Err(e) => warn!(pid, error = %e, "could not kill process group"),
    }
}

#[cfg(not(unix))]
async fn kill_group(_pid: u32) {}

impl VerificationProbe for CommandProbe {
    fn verify(&self, root: &Path, limit: Duration) -> ProbeOutcome {
        let rt = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => return ProbeOutcome::fail(format!("failed to create runtime: {e}")),
        };
        rt.block_on(self.run(root, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_command_pass_and_fail() {
        let dir = tempdir().unwrap();
        let ok = CommandProbe::shell("echo checked").verify(dir.path(), Duration::from_secs(10));
        assert!(ok.passed);
        assert!(ok.output.contains("checked"));

        let bad = CommandProbe::shell("echo broken >&2; exit 3").verify(dir.path(), Duration::from_secs(10));
        assert!(!bad.passed);
        assert!(!bad.timed_out);
        assert!(bad.output.contains("broken"));
    }

    #[test]
    fn test_command_timeout() {
        let dir = tempdir().unwrap();
        let outcome = CommandProbe::shell("sleep 5").verify(dir.path(), Duration::from_millis(100));
        assert!(!outcome.passed);
        assert!(outcome.timed_out);
        assert!(outcome.duration_ms < 5000);
    }

    /// Running, as opposed to exited or a zombie nobody reaped yet.
    #[cfg(target_os = "linux")]
    fn running(pid: &str) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => stat
                .rsplit(')')
                .next()
                .map_or(false, |rest| !rest.trim_start().starts_with('Z')),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_timeout_kills_background_children() {
        let dir = tempdir().unwrap();
        let outcome = CommandProbe::shell("sleep 30 >/dev/null 2>&1 & echo $! > child.pid; wait")
            .verify(dir.path(), Duration::from_millis(500));
        assert!(outcome.timed_out);

        let pid = std::fs::read_to_string(dir.path().join("child.pid")).unwrap();
        let pid = pid.trim();
        let mut alive = running(pid);
        for _ in 0..40 {
            if !alive {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
            alive = running(pid);
        }
        assert!(!alive, "background child {pid} outlived the timeout");
    }

    #[test]
    fn test_command_runs_in_root() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "here").unwrap();
        let outcome = CommandProbe::shell("cat marker.txt").verify(dir.path(), Duration::from_secs(10));
        assert_eq!(outcome.output, "here");
    }

    #[test]
    fn test_closure_verifier() {
        let probe = |_: &Path, _: Duration| ProbeOutcome::pass("ok");
        assert!(probe.verify(Path::new("."), Duration::from_secs(1)).passed);
    }
}
