//! Campaign configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::mutants::MANIFEST_FILE;
use crate::runner::{Commands, Deadlines, JobContext};

pub const DEFAULT_MUTANT_DIR: &str = "./gambit_out";
pub const DEFAULT_OUTPUT: &str = "gambit_test_results.json";
pub const DEFAULT_BUILD_CMD: &str = "forge build";
pub const DEFAULT_TEST_TIMEOUT_SECS: f64 = 3.0;
pub const DEFAULT_BUILD_TIMEOUT_SECS: f64 = 60.0;

/// Logical core count, falling back to a single worker.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Parse a positive, finite number of seconds.
pub fn parse_seconds(s: &str) -> Result<f64, String> {
    let secs: f64 = s
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number of seconds", s))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(format!("timeout must be a positive number of seconds, got {}", s));
    }
    Ok(secs)
}

pub fn parse_workers(s: &str) -> Result<usize, String> {
    match s.trim().parse::<usize>() {
        Ok(0) => Err("at least one worker is required".to_string()),
        Ok(n) => Ok(n),
        Err(_) => Err(format!("'{}' is not a worker count", s)),
    }
}

/// Resolved settings for one `run` invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Directory holding the manifest and one file per mutant.
    pub mutant_dir: PathBuf,
    /// Project copied into every workspace.
    pub project_root: PathBuf,
    /// Escaped-set output; also the prior result in `uncaught` mode.
    pub output: PathBuf,
    pub test_cmd: String,
    pub build_cmd: String,
    pub test_timeout: Duration,
    pub build_timeout: Duration,
    pub workers: usize,
    pub debug: bool,
    /// Only re-run mutations listed in the existing output file.
    pub uncaught: bool,
}

impl RunConfig {
    pub fn new(test_cmd: impl Into<String>) -> Self {
        Self {
            mutant_dir: PathBuf::from(DEFAULT_MUTANT_DIR),
            project_root: PathBuf::from("."),
            output: PathBuf::from(DEFAULT_OUTPUT),
            test_cmd: test_cmd.into(),
            build_cmd: DEFAULT_BUILD_CMD.to_string(),
            test_timeout: Duration::from_secs_f64(DEFAULT_TEST_TIMEOUT_SECS),
            build_timeout: Duration::from_secs_f64(DEFAULT_BUILD_TIMEOUT_SECS),
            workers: default_workers(),
            debug: false,
            uncaught: false,
        }
    }

    pub fn with_mutant_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.mutant_dir = dir.into();
        self
    }

    pub fn with_project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = root.into();
        self
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = output.into();
        self
    }

    pub fn with_build_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.build_cmd = cmd.into();
        self
    }

    pub fn with_test_timeout(mut self, timeout: Duration) -> Self {
        self.test_timeout = timeout;
        self
    }

    pub fn with_build_timeout(mut self, timeout: Duration) -> Self {
        self.build_timeout = timeout;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_uncaught(mut self, uncaught: bool) -> Self {
        self.uncaught = uncaught;
        self
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.mutant_dir.join(MANIFEST_FILE)
    }

    pub fn commands(&self) -> Commands {
        Commands {
            build: self.build_cmd.clone(),
            test: self.test_cmd.clone(),
        }
    }

    pub fn deadlines(&self) -> Deadlines {
        Deadlines {
            build: self.build_timeout,
            test: self.test_timeout,
        }
    }

    pub fn job_context(&self, session: &str) -> JobContext {
        JobContext {
            project_root: self.project_root.clone(),
            mutant_dir: self.mutant_dir.clone(),
            commands: self.commands(),
            deadlines: self.deadlines(),
            session: session.to_string(),
        }
    }
}
