//! Source acquisition. The cloning layer proper is a collaborator; this
//! module carries its interface plus the git shim the CLI runs with.

use crate::error::{HarvestError, Result};
use crate::paths;
use crate::record::{RepositoryRecord, TreeInfo};
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Materializes a repository's source tree and points the record at it.
/// Implementations raise on failure; the task unit converts that into a
/// terminal clone-fail status.
pub trait Cloner: Send + Sync {
    fn clone_repository(&self, record: &mut RepositoryRecord) -> Result<()>;
}

/// Shallow git clone into the run's source directory. An already-populated
/// checkout is reused instead of re-cloned, so repeated runs against the same
/// source tree are cheap.
pub struct GitCloner {
    source_root: PathBuf,
}

impl GitCloner {
    pub fn new(source_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
        }
    }
}

impl Cloner for GitCloner {
    fn clone_repository(&self, record: &mut RepositoryRecord) -> Result<()> {
        let dest = paths::repo_source_dir(&self.source_root, &record.name);
        if dest.is_dir() && std::fs::read_dir(&dest)?.next().is_some() {
            record.source = Some(TreeInfo::new(dest));
            return Ok(());
        }

        let url = record
            .url
            .as_deref()
            .ok_or_else(|| HarvestError::MissingSource(record.name.clone()))?;

        let output = Command::new("git")
            .args(["clone", "--depth", "1", url])
            .arg(&dest)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| HarvestError::Subprocess {
                command: format!("git clone {url}"),
                source: e,
            })?;

        if !output.status.success() {
            return Err(HarvestError::CloneFailed {
                name: record.name.clone(),
                detail: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        record.source = Some(TreeInfo::new(dest));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
