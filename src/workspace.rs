use std::fs;
use std::path::{Component, Path, PathBuf};

use tempfile::TempDir;

use crate::copy_tree;
use crate::error::MaterializeError;

/// Prefix shared by every workspace directory of one campaign.
pub fn session_prefix(session: &str) -> String {
    format!("mutant-runner-{}-", session)
}

/// An isolated copy of the project with one mutant overlaid.
///
/// The backing temp directory is removed when the workspace is dropped, so
/// every exit path out of a job (including unwinds) releases it.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    target: PathBuf,
    dir: TempDir,
}

impl Workspace {
    /// Root of the copied project; subprocesses run here.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The overlaid file inside the copy.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Remove the workspace now, surfacing any I/O error instead of ignoring it.
    pub fn close(self) -> std::io::Result<()> {
        self.dir.close()
    }
}

fn is_contained(rel: &Path) -> bool {
    rel.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Copy `project_root` into a fresh temp directory and overwrite
/// `original_rel` in the copy with the contents of `mutant_file`.
pub fn materialize(
    project_root: &Path,
    mutant_file: &Path,
    original_rel: &str,
    session: &str,
) -> Result<Workspace, MaterializeError> {
    if !mutant_file.is_file() {
        return Err(MaterializeError::MissingMutant(mutant_file.to_path_buf()));
    }
    let rel = Path::new(original_rel);
    if rel.as_os_str().is_empty() || !is_contained(rel) {
        return Err(MaterializeError::OutsideProject(original_rel.to_string()));
    }

    let dir = tempfile::Builder::new()
        .prefix(&session_prefix(session))
        .tempdir()?;
    let root = dir.path().join("proj");
    copy_tree::copy_tree(project_root, &root)?;

    let target = root.join(rel);
    if !target.is_file() {
        return Err(MaterializeError::MissingTarget(target));
    }
    fs::copy(mutant_file, &target)?;

    Ok(Workspace { root, target, dir })
}

/// Best-effort removal of workspaces a terminating campaign left behind.
/// Returns how many directories were removed.
pub fn sweep_abandoned(session: &str) -> usize {
    let prefix = session_prefix(session);
    let Ok(entries) = fs::read_dir(std::env::temp_dir()) else {
        return 0;
    };
    entries
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().starts_with(&prefix))
        .filter(|e| fs::remove_dir_all(e.path()).is_ok())
        .count()
}
