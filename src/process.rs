//! Deadline-bounded shell execution with process-group supervision.
//!
//! Every subprocess is started in its own process group and registered with a
//! [`Supervisor`]. Aborting the supervisor kills each registered group, which
//! reaches grandchildren that a plain `Child::kill` would leave running.

use std::collections::HashSet;
use std::io::Read;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use nix::sys::signal::{Signal, killpg};
use nix::sys::wait::{Id, WaitPidFlag, WaitStatus, waitid};
use nix::unistd::Pid;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Cancel token and registry of live process groups, shared by the whole campaign.
#[derive(Debug, Default)]
pub struct Supervisor {
    cancelled: AtomicBool,
    interrupted: AtomicBool,
    groups: Mutex<HashSet<i32>>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn was_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Stop accepting work and kill every registered process group.
    pub fn abort(&self) -> usize {
        self.cancelled.store(true, Ordering::SeqCst);
        self.kill_all()
    }

    /// Operator interrupt: same as [`abort`](Self::abort), but remembered.
    pub fn interrupt(&self) -> usize {
        self.interrupted.store(true, Ordering::SeqCst);
        self.abort()
    }

    pub fn live_groups(&self) -> usize {
        self.lock().len()
    }

    // Signals are sent under the lock: a group unregistered by its owner is
    // about to be reaped, and its id must not be signalled after that.
    fn kill_all(&self) -> usize {
        let groups = self.lock();
        for pgid in groups.iter() {
            kill_group(*pgid);
        }
        groups.len()
    }

    fn register(&self, pgid: i32) {
        self.lock().insert(pgid);
    }

    fn unregister(&self, pgid: i32) {
        self.lock().remove(&pgid);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<i32>> {
        self.groups.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn kill_group(pgid: i32) {
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
        Err(e) => tracing::debug!(pgid, error = %e, "failed to kill process group"),
    }
}

/// Owns a registered process group until its leader is reaped.
///
/// The group id equals the leader's pid, so it may only be signalled while the
/// leader is still unreaped. [`release`](Self::release) kills any stragglers
/// and unregisters the group; it must run before `wait` reaps the leader.
struct GroupGuard<'a> {
    supervisor: &'a Supervisor,
    pgid: i32,
    released: bool,
}

impl GroupGuard<'_> {
    fn release(&mut self) {
        if !self.released {
            kill_group(self.pgid);
            self.supervisor.unregister(self.pgid);
            self.released = true;
        }
    }
}

impl Drop for GroupGuard<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Whether the leader has exited, without reaping it.
fn leader_exited(pid: Pid) -> nix::Result<bool> {
    let flags = WaitPidFlag::WEXITED | WaitPidFlag::WNOHANG | WaitPidFlag::WNOWAIT;
    match waitid(Id::Pid(pid), flags)? {
        WaitStatus::StillAlive => Ok(false),
        _ => Ok(true),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Exited(ExitStatus),
    TimedOut,
    Cancelled,
}

/// Result of one subprocess invocation, with output buffered rather than streamed.
#[derive(Debug)]
pub struct Captured {
    pub exit: Exit,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub elapsed: Duration,
}

impl Captured {
    pub fn success(&self) -> bool {
        matches!(self.exit, Exit::Exited(status) if status.success())
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    fn cancelled() -> Self {
        Self {
            exit: Exit::Cancelled,
            stdout: Vec::new(),
            stderr: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            if let Err(e) = pipe.read_to_end(&mut buf) {
                tracing::debug!(error = %e, read = buf.len(), "failed to drain subprocess output");
            }
        }
        buf
    })
}

/// Run `cmd` through `sh -c` in `cwd`, killing its whole process group once
/// `deadline` passes or the supervisor is cancelled.
///
/// Only a failure to spawn is an `Err`; nonzero exits, timeouts and
/// cancellation are reported through [`Captured::exit`].
pub fn run_shell(
    cmd: &str,
    cwd: &Path,
    deadline: Duration,
    supervisor: &Supervisor,
) -> std::io::Result<Captured> {
    if supervisor.is_cancelled() {
        return Ok(Captured::cancelled());
    }

    let start = Instant::now();
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .spawn()?;

    let pgid = child.id() as i32;
    let leader = Pid::from_raw(pgid);
    supervisor.register(pgid);
    let mut guard = GroupGuard {
        supervisor,
        pgid,
        released: false,
    };

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    // A cancelled run reports `Cancelled` even when the kill already made the
    // leader exit: the abort may have come from another thread.
    let stopped = loop {
        match leader_exited(leader) {
            Ok(true) if supervisor.is_cancelled() => break Some(Exit::Cancelled),
            Ok(true) => break None,
            Ok(false) => {
                if supervisor.is_cancelled() {
                    break Some(Exit::Cancelled);
                }
                if start.elapsed() >= deadline {
                    break Some(Exit::TimedOut);
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                guard.release();
                let _ = child.wait();
                return Err(e.into());
            }
        }
    };

    // Background stragglers in the group would otherwise keep the pipes open.
    guard.release();
    let status = child.wait()?;
    let elapsed = start.elapsed();
    let exit = stopped.unwrap_or(Exit::Exited(status));

    Ok(Captured {
        exit,
        stdout: stdout.join().unwrap_or_default(),
        stderr: stderr.join().unwrap_or_default(),
        elapsed,
    })
}
