use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File name of the generator's manifest inside the mutant directory.
pub const MANIFEST_FILE: &str = "gambit_results.json";

/// One mutation as produced by the external mutant generator.
///
/// `name` doubles as the mutant file's path relative to the mutant directory,
/// `original` is the project-relative path of the file it replaces. Any other
/// fields the generator emits are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    pub name: String,
    pub original: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Mutation {
    pub fn new(name: impl Into<String>, original: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            original: original.into(),
            description: None,
            diff: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// Captured output of a build step that did not succeed.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildFailure {
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// Test command exited nonzero: the mutation was caught.
    Detected,
    /// Test command exited zero: the mutation escaped.
    Undetected,
    BuildFailed(BuildFailure),
    TestTimedOut,
    Skipped(String),
    ExecutionError(String),
}

impl JobOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            JobOutcome::Detected => "caught",
            JobOutcome::Undetected => "uncaught",
            JobOutcome::BuildFailed(_) => "build failed",
            JobOutcome::TestTimedOut => "timeout",
            JobOutcome::Skipped(_) => "skipped",
            JobOutcome::ExecutionError(_) => "error",
        }
    }
}

/// Position of a job within the campaign, used for `[i/N]` log prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobPosition {
    pub index: usize,
    pub total: usize,
}

impl std::fmt::Display for JobPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}/{}]", self.index + 1, self.total)
    }
}

/// A finished job, as sent from a worker back to the coordinator.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub position: JobPosition,
    pub mutation: Mutation,
    pub outcome: JobOutcome,
}

pub fn parse_records(path: &Path, data: &str) -> Result<Vec<Mutation>, ConfigError> {
    let value: serde_json::Value =
        serde_json::from_str(data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    if !value.is_array() {
        return Err(ConfigError::NotAList(path.to_path_buf()));
    }
    serde_json::from_value(value).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Read and validate `<mutant_dir>/gambit_results.json`.
pub fn load_manifest(mutant_dir: &Path) -> Result<Vec<Mutation>, ConfigError> {
    let path = mutant_dir.join(MANIFEST_FILE);
    let data = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    let mutations = parse_records(&path, &data)?;
    if mutations.is_empty() {
        return Err(ConfigError::EmptyManifest(path));
    }

    let mut seen = HashSet::new();
    for m in &mutations {
        if !seen.insert(m.name.as_str()) {
            return Err(ConfigError::DuplicateName {
                path,
                name: m.name.clone(),
            });
        }
    }
    Ok(mutations)
}
