//! Long-lived provider subprocess registry.
//!
//! Keyed by provider id, at most one tracked process per key. Processes
//! are spawned with piped stdio so stdio sessions can be layered on top
//! of a running child at any point in its lifetime. Liveness is checked
//! lazily at query time; an exited child stays in the registry (with
//! its metadata intact) until the caller stops or restarts it.

use std::collections::HashMap;
use std::io::{self, BufReader};
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// How long a child gets between SIGTERM and SIGKILL.
const GRACE_PERIOD: Duration = Duration::from_secs(3);
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Shared handles to a tracked child's stdio pipes.
///
/// The registry retains its own clones, so dropping these does not
/// close the pipes; they close when the process is stopped or replaced.
pub(crate) struct StdioPipes {
    pub(crate) stdin: Arc<Mutex<ChildStdin>>,
    pub(crate) stdout: Arc<Mutex<BufReader<ChildStdout>>>,
}

struct TrackedProcess {
    child: Child,
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    started_at: DateTime<Utc>,
    stdin: Arc<Mutex<ChildStdin>>,
    stdout: Arc<Mutex<BufReader<ChildStdout>>>,
}

/// Point-in-time snapshot of a tracked process.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessInfo {
    pub provider_id: String,
    pub pid: u32,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub started_at: DateTime<Utc>,
}

/// Registry of provider subprocesses.
///
/// All methods take `&self`; mutations are serialized internally. The
/// lifecycle methods return booleans rather than errors so callers can
/// treat the outcome as a status, matching the idempotent semantics of
/// `stop_process`.
#[derive(Default)]
pub struct ProcessRegistry {
    processes: Mutex<HashMap<String, TrackedProcess>>,
}

impl ProcessRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a provider process, replacing (and first stopping) any
    /// process already tracked under this id. Returns whether the new
    /// process is up and tracked.
    ///
    /// The child inherits this process's environment with `env` laid
    /// over it, and gets piped stdin/stdout/stderr.
    pub fn start_process(
        &self,
        provider_id: &str,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> bool {
        // Terminate outside the lock; the graceful stop can take the
        // whole grace period and must not stall queries for other
        // providers.
        let existing = self.lock().remove(provider_id);
        if let Some(existing) = existing {
            tracing::info!(provider_id = %provider_id, "Stopping existing process before restart");
            // The old entry is gone either way; a failed stop only
            // means the old child may linger.
            stop_tracked(provider_id, existing);
        }

        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(
                    provider_id = %provider_id,
                    command = %command,
                    error = %e,
                    "Failed to start provider process"
                );
                return false;
            }
        };

        // Stdio::piped guarantees these handles exist.
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            tracing::error!(provider_id = %provider_id, "Spawned child is missing stdio pipes");
            let _ = child.kill();
            let _ = child.wait();
            return false;
        };

        tracing::info!(
            provider_id = %provider_id,
            pid = child.id(),
            command = %command,
            "Provider process started"
        );

        let raced = self.lock().insert(
            provider_id.to_string(),
            TrackedProcess {
                child,
                command: command.to_string(),
                args: args.to_vec(),
                env: env.clone(),
                started_at: Utc::now(),
                stdin: Arc::new(Mutex::new(stdin)),
                stdout: Arc::new(Mutex::new(BufReader::new(stdout))),
            },
        );
        // A concurrent start for the same id can slip in while the old
        // child is being stopped; the displaced entry must not leak.
        if let Some(raced) = raced {
            stop_tracked(provider_id, raced);
        }
        true
    }

    /// Stop the process tracked under `provider_id`.
    ///
    /// Idempotent: stopping an unknown id is a successful no-op. The
    /// entry is removed even when termination fails, so a wedged child
    /// never blocks a later restart.
    pub fn stop_process(&self, provider_id: &str) -> bool {
        let removed = self.lock().remove(provider_id);
        match removed {
            None => {
                tracing::debug!(provider_id = %provider_id, "No process to stop");
                true
            }
            Some(tracked) => stop_tracked(provider_id, tracked),
        }
    }

    /// Whether the tracked process exists and has not exited.
    pub fn is_running(&self, provider_id: &str) -> bool {
        let mut processes = self.lock();
        processes
            .get_mut(provider_id)
            .is_some_and(|tracked| matches!(tracked.child.try_wait(), Ok(None)))
    }

    /// Snapshot of a tracked process, running or not.
    pub fn get_process_info(&self, provider_id: &str) -> Option<ProcessInfo> {
        let processes = self.lock();
        processes.get(provider_id).map(|tracked| ProcessInfo {
            provider_id: provider_id.to_string(),
            pid: tracked.child.id(),
            command: tracked.command.clone(),
            args: tracked.args.clone(),
            env: tracked.env.clone(),
            started_at: tracked.started_at,
        })
    }

    /// Number of tracked processes that are still running.
    pub fn running_count(&self) -> usize {
        let mut processes = self.lock();
        processes
            .values_mut()
            .map(|tracked| tracked.child.try_wait())
            .filter(|status| matches!(status, Ok(None)))
            .count()
    }

    /// Stop every tracked process. Returns true when all stops
    /// succeeded.
    pub fn stop_all(&self) -> bool {
        let drained: Vec<(String, TrackedProcess)> = self.lock().drain().collect();
        let mut all_ok = true;
        for (provider_id, tracked) in drained {
            if !stop_tracked(&provider_id, tracked) {
                all_ok = false;
            }
        }
        all_ok
    }

    /// Shared pipe handles for an actively tracked process, if any.
    pub(crate) fn stdio_pipes(&self, provider_id: &str) -> Option<StdioPipes> {
        let processes = self.lock();
        processes.get(provider_id).map(|tracked| StdioPipes {
            stdin: Arc::clone(&tracked.stdin),
            stdout: Arc::clone(&tracked.stdout),
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, TrackedProcess>> {
        // A poisoned lock means a start or stop panicked mid-flight;
        // the map itself is still usable.
        self.processes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn stop_tracked(provider_id: &str, mut tracked: TrackedProcess) -> bool {
    match terminate(&mut tracked.child) {
        Ok(status) => {
            tracing::info!(provider_id = %provider_id, status = %status, "Provider process stopped");
            true
        }
        Err(e) => {
            tracing::error!(provider_id = %provider_id, error = %e, "Failed to stop provider process");
            false
        }
    }
}

/// Graceful termination: SIGTERM, a bounded wait, then SIGKILL.
fn terminate(child: &mut Child) -> io::Result<ExitStatus> {
    if let Some(status) = child.try_wait()? {
        return Ok(status);
    }

    send_term(child)?;

    let deadline = Instant::now() + GRACE_PERIOD;
    while Instant::now() < deadline {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        std::thread::sleep(EXIT_POLL_INTERVAL);
    }

    tracing::warn!(pid = child.id(), "Process ignored SIGTERM, killing");
    child.kill()?;
    child.wait()
}

#[cfg(unix)]
fn send_term(child: &mut Child) -> io::Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let pid = i32::try_from(child.id())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    match signal::kill(Pid::from_raw(pid), Signal::SIGTERM) {
        // ESRCH: already gone; try_wait in the caller reaps it.
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(io::Error::other(e)),
    }
}

#[cfg(not(unix))]
fn send_term(child: &mut Child) -> io::Result<()> {
    // No SIGTERM equivalent; go straight to a hard kill.
    child.kill()
}
