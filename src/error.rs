use std::path::PathBuf;

use thiserror::Error;

/// Unreadable or malformed campaign inputs. Always fatal before any job runs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0} is not a valid list of mutations")]
    NotAList(PathBuf),
    #[error("no mutations found in {0}")]
    EmptyManifest(PathBuf),
    #[error("mutation name '{name}' appears more than once in {path}")]
    DuplicateName { path: PathBuf, name: String },
    #[error("no valid mutant names found in {0}")]
    NoPriorNames(PathBuf),
    #[error("none of the uncaught mutants from {prior} are present in {manifest}")]
    NoMatches { prior: PathBuf, manifest: PathBuf },
}

/// Why a workspace could not be prepared for one mutation.
#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("mutant file missing: {0}")]
    MissingMutant(PathBuf),
    #[error("original file not found in workspace: {0}")]
    MissingTarget(PathBuf),
    #[error("original path escapes the project root: {0}")]
    OutsideProject(String),
    #[error("failed to prepare workspace: {0}")]
    Io(#[from] std::io::Error),
}

impl MaterializeError {
    /// Missing files mean the mutation is skipped, anything else is an execution error.
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::MissingMutant(_) | Self::MissingTarget(_))
    }
}

#[derive(Debug, Error)]
pub enum ResultsError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize results: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("'gambit' command not found. Please ensure Gambit is installed and in your PATH.")]
    GambitNotFound,
    #[error("failed to run gambit: {0}")]
    Spawn(std::io::Error),
    #[error("gambit mutate failed with exit code {0:?}")]
    GambitFailed(Option<i32>),
}
