use std::io::Write;
use std::path::Path;

use crate::error::{ConfigError, ResultsError};
use crate::mutants::{self, Mutation};

/// Persist the escaped set as a pretty JSON list.
///
/// The file is written to a sibling temp file and renamed into place, so a
/// reader never sees a partially written result.
pub fn save_escaped(path: &Path, escaped: &[Mutation]) -> Result<(), ResultsError> {
    let json = serde_json::to_string_pretty(escaped)?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let write_err = |source| ResultsError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(json.as_bytes()).map_err(write_err)?;
    tmp.write_all(b"\n").map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

/// Load a persisted result file with strict record parsing.
pub fn load(path: &Path) -> Result<Vec<Mutation>, ConfigError> {
    let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    mutants::parse_records(path, &data)
}
