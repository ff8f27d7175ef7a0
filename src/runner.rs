use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use crate::mutants::{BuildFailure, JobOutcome, JobPosition, Mutation};
use crate::process::{self, Captured, Exit, Supervisor};
use crate::workspace::{self, Workspace};

/// The two opaque commands every job runs, in order.
#[derive(Debug, Clone)]
pub struct Commands {
    pub build: String,
    pub test: String,
}

/// Independent wall-clock limits for the build and test subprocesses.
#[derive(Debug, Clone, Copy)]
pub struct Deadlines {
    pub build: Duration,
    pub test: Duration,
}

/// Everything a worker needs to turn a mutation into an outcome.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub project_root: PathBuf,
    pub mutant_dir: PathBuf,
    pub commands: Commands,
    pub deadlines: Deadlines,
    /// Campaign id embedded in workspace directory names.
    pub session: String,
}

impl JobContext {
    pub fn mutant_path(&self, mutation: &Mutation) -> PathBuf {
        self.mutant_dir.join(&mutation.name)
    }
}

fn log_output(header: &str, out: &Captured) {
    if out.stdout.is_empty() && out.stderr.is_empty() {
        return;
    }
    debug!(
        "[OUTPUT] {}\n--- STDOUT ---\n{}\n--- STDERR ---\n{}",
        header,
        out.stdout_text(),
        out.stderr_text()
    );
}

/// Build then test one materialized workspace and classify the result.
///
/// A build that fails or overruns its deadline short-circuits with
/// `BuildFailed`; the test phase only ever runs against a clean build.
pub fn execute(
    mutation: &Mutation,
    workspace: &Workspace,
    commands: &Commands,
    deadlines: &Deadlines,
    position: JobPosition,
    supervisor: &Supervisor,
) -> JobOutcome {
    let name = mutation.name.as_str();

    debug!("{} Running build: {}", position, commands.build);
    let build = match process::run_shell(&commands.build, workspace.root(), deadlines.build, supervisor) {
        Ok(out) => out,
        Err(e) => {
            return JobOutcome::ExecutionError(format!("failed to run build command: {}", e));
        }
    };
    log_output(&format!("{} build of {}", position, name), &build);
    match build.exit {
        Exit::Cancelled => return JobOutcome::ExecutionError("cancelled".to_string()),
        Exit::Exited(status) if status.success() => {}
        exit => {
            return JobOutcome::BuildFailed(BuildFailure {
                stdout: build.stdout_text(),
                stderr: build.stderr_text(),
                timed_out: exit == Exit::TimedOut,
            });
        }
    }

    debug!("{} Running: {}", position, commands.test);
    let test = match process::run_shell(&commands.test, workspace.root(), deadlines.test, supervisor) {
        Ok(out) => out,
        Err(e) => {
            return JobOutcome::ExecutionError(format!("failed to run test command: {}", e));
        }
    };
    log_output(&format!("{} test of {}", position, name), &test);

    let elapsed = test.elapsed.as_secs_f64();
    match test.exit {
        Exit::Cancelled => JobOutcome::ExecutionError("cancelled".to_string()),
        Exit::TimedOut => {
            debug!(
                "{} TIMEOUT after {:.2}s for mutation: {}",
                position,
                deadlines.test.as_secs_f64(),
                name
            );
            JobOutcome::TestTimedOut
        }
        Exit::Exited(status) if status.success() => {
            debug!("{} UNCAUGHT (test suite PASSED) for mutation: {} (elapsed: {:.2}s)", position, name, elapsed);
            JobOutcome::Undetected
        }
        Exit::Exited(_) => {
            debug!("{} CAUGHT (test suite FAILED) for mutation: {} (elapsed: {:.2}s)", position, name, elapsed);
            JobOutcome::Detected
        }
    }
}

/// Materialize a workspace for `mutation`, execute it, and remove the workspace.
pub fn run_job(
    mutation: &Mutation,
    position: JobPosition,
    ctx: &JobContext,
    supervisor: &Supervisor,
) -> JobOutcome {
    if supervisor.is_cancelled() {
        return JobOutcome::ExecutionError("cancelled".to_string());
    }
    let mutant_path = ctx.mutant_path(mutation);
    let ws = match workspace::materialize(&ctx.project_root, &mutant_path, &mutation.original, &ctx.session) {
        Ok(ws) => ws,
        Err(e) if e.is_skip() => {
            debug!("{} {}. Skipping.", position, e);
            return JobOutcome::Skipped(e.to_string());
        }
        Err(e) => {
            debug!("{} Exception in mutation {}: {}", position, mutation.name, e);
            return JobOutcome::ExecutionError(e.to_string());
        }
    };

    debug!("{} Starting mutation: {} in {}", position, mutation.name, ws.root().display());
    let outcome = execute(mutation, &ws, &ctx.commands, &ctx.deadlines, position, supervisor);
    match &outcome {
        JobOutcome::ExecutionError(msg) => debug!("{} Error for mutation {}: {}", position, mutation.name, msg),
        JobOutcome::BuildFailed(f) => debug!("{} Build failed for mutation {} (timed out: {})", position, mutation.name, f.timed_out),
        _ => {}
    }

    let root = ws.root().to_path_buf();
    if let Err(e) = ws.close() {
        warn!("failed to remove workspace {}: {}", root.display(), e);
    }
    outcome
}

#[derive(Debug)]
pub enum PhaseFailure {
    Spawn(std::io::Error),
    /// Exited nonzero or ran past its deadline; see `Captured::exit`.
    Unsuccessful(Captured),
}

/// Why the unmutated project is not a valid baseline.
#[derive(Debug)]
pub enum PreflightFailure {
    Build(PhaseFailure),
    Test(PhaseFailure),
    Interrupted,
}

enum Phase {
    Passed(Captured),
    Failed(PhaseFailure),
    Interrupted,
}

fn baseline_phase(label: &str, cmd: &str, root: &Path, deadline: Duration, supervisor: &Supervisor) -> Phase {
    let out = match process::run_shell(cmd, root, deadline, supervisor) {
        Ok(out) => out,
        Err(e) => return Phase::Failed(PhaseFailure::Spawn(e)),
    };
    if out.exit == Exit::Cancelled {
        return Phase::Interrupted;
    }
    log_output(label, &out);
    if out.success() {
        Phase::Passed(out)
    } else {
        Phase::Failed(PhaseFailure::Unsuccessful(out))
    }
}

/// Build and test the unmutated project in place. Any failure here means
/// mutation results would be meaningless, so the campaign must not start.
pub fn preflight(
    project_root: &Path,
    commands: &Commands,
    deadlines: &Deadlines,
    supervisor: &Supervisor,
) -> Result<Duration, PreflightFailure> {
    debug!("Running build command: {}", commands.build);
    let build = match baseline_phase("baseline build", &commands.build, project_root, deadlines.build, supervisor) {
        Phase::Passed(out) => out,
        Phase::Failed(f) => return Err(PreflightFailure::Build(f)),
        Phase::Interrupted => return Err(PreflightFailure::Interrupted),
    };

    debug!("Running test suite in main project context: {}", commands.test);
    let test = match baseline_phase("baseline test", &commands.test, project_root, deadlines.test, supervisor) {
        Phase::Passed(out) => out,
        Phase::Failed(f) => return Err(PreflightFailure::Test(f)),
        Phase::Interrupted => return Err(PreflightFailure::Interrupted),
    };
    Ok(build.elapsed + test.elapsed)
}
