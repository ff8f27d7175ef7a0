//! Thin wrapper around the external `gambit mutate` generator.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Serialize;
use walkdir::WalkDir;

use crate::error::GenerateError;

/// One input record for `gambit mutate --json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GambitEntry {
    pub filename: String,
    pub sourceroot: String,
    pub solc_remappings: Vec<String>,
}

/// Solidity remappings from a foundry.toml, preferring `[profile.default]`.
pub fn parse_remappings(foundry_toml: &Path) -> Result<Vec<String>, GenerateError> {
    let data = std::fs::read_to_string(foundry_toml).map_err(|source| GenerateError::Read {
        path: foundry_toml.to_path_buf(),
        source,
    })?;
    let doc: toml::Table = data.parse().map_err(|source| GenerateError::Toml {
        path: foundry_toml.to_path_buf(),
        source,
    })?;

    let remappings = doc
        .get("profile")
        .and_then(|p| p.get("default"))
        .and_then(|d| d.get("remappings"))
        .or_else(|| doc.get("remappings"));

    Ok(match remappings {
        Some(toml::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect(),
        Some(toml::Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    })
}

/// Every `.sol` file under `dir`, sorted.
pub fn find_sol_files(dir: &Path) -> Result<Vec<PathBuf>, GenerateError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(|source| GenerateError::Walk {
            path: dir.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file() && entry.path().extension().is_some_and(|e| e == "sol") {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

pub fn make_entries(files: &[PathBuf], remappings: &[String], sourceroot: &str) -> Vec<GambitEntry> {
    files
        .iter()
        .map(|f| GambitEntry {
            filename: f.to_string_lossy().into_owned(),
            sourceroot: sourceroot.to_string(),
            solc_remappings: remappings.to_vec(),
        })
        .collect()
}

/// Write the generator config with four-space indentation.
pub fn write_config(path: &Path, entries: &[GambitEntry]) -> Result<(), GenerateError> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    entries
        .serialize(&mut ser)
        .map_err(|e| GenerateError::Write {
            path: path.to_path_buf(),
            source: e.into(),
        })?;
    std::fs::write(path, buf).map_err(|source| GenerateError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Run `gambit mutate --json <config> <extra_args...>` with inherited stdio.
pub fn run_gambit(config: &Path, extra_args: &[String]) -> Result<(), GenerateError> {
    let status = Command::new("gambit")
        .arg("mutate")
        .arg("--json")
        .arg(config)
        .args(extra_args)
        .status()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => GenerateError::GambitNotFound,
            _ => GenerateError::Spawn(e),
        })?;
    if status.success() {
        Ok(())
    } else {
        Err(GenerateError::GambitFailed(status.code()))
    }
}

/// Crawl `input_dir`, write the generator config to `config_path`, and run
/// the generator. Returns the number of entries written.
pub fn generate(
    input_dir: &Path,
    foundry_toml: &Path,
    config_path: &Path,
    sourceroot: &str,
    extra_args: &[String],
) -> Result<usize, GenerateError> {
    let remappings = parse_remappings(foundry_toml)?;
    let files = find_sol_files(input_dir)?;
    let entries = make_entries(&files, &remappings, sourceroot);
    write_config(config_path, &entries)?;
    println!("Wrote {} entries to {}", entries.len(), config_path.display());

    let shown: Vec<String> = ["gambit", "mutate", "--json"]
        .iter()
        .map(|s| s.to_string())
        .chain(std::iter::once(config_path.display().to_string()))
        .chain(extra_args.iter().cloned())
        .collect();
    println!("Running: {}", shown.join(" "));
    run_gambit(config_path, extra_args)?;
    println!("gambit mutate completed successfully.");
    Ok(entries.len())
}
