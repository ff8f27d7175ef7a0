use std::collections::HashSet;
use std::path::Path;

use crate::error::ConfigError;
use crate::mutants::{JobOutcome, JobReport, Mutation};

/// The escaped set: every `Undetected` mutation, in completion order.
pub fn escaped(reports: &[JobReport]) -> Vec<Mutation> {
    reports
        .iter()
        .filter(|r| r.outcome == JobOutcome::Undetected)
        .map(|r| r.mutation.clone())
        .collect()
}

/// Names listed in a previously persisted result file.
///
/// Records only need a string `name`; anything else about them is ignored.
pub fn prior_names(path: &Path) -> Result<HashSet<String>, ConfigError> {
    let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let value: serde_json::Value =
        serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    let records = value
        .as_array()
        .ok_or_else(|| ConfigError::NotAList(path.to_path_buf()))?;

    let names: HashSet<String> = records
        .iter()
        .filter_map(|r| r.get("name")?.as_str())
        .map(str::to_string)
        .collect();
    if names.is_empty() {
        return Err(ConfigError::NoPriorNames(path.to_path_buf()));
    }
    Ok(names)
}

/// Keep only the manifest entries whose name appears in `names`, preserving
/// manifest order.
pub fn restrict(manifest: Vec<Mutation>, names: &HashSet<String>) -> Vec<Mutation> {
    manifest
        .into_iter()
        .filter(|m| names.contains(&m.name))
        .collect()
}

/// Resume/focus mode: re-run only what escaped last time.
pub fn restrict_to_prior(
    manifest: Vec<Mutation>,
    manifest_path: &Path,
    prior_path: &Path,
) -> Result<Vec<Mutation>, ConfigError> {
    let names = prior_names(prior_path)?;
    let filtered = restrict(manifest, &names);
    if filtered.is_empty() {
        return Err(ConfigError::NoMatches {
            prior: prior_path.to_path_buf(),
            manifest: manifest_path.to_path_buf(),
        });
    }
    Ok(filtered)
}
