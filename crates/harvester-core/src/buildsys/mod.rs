//! The build-system capability set and the recognition registry.
//!
//! Each variant interprets one kind of build configuration; the registry
//! probes variants in a fixed priority order and the first one that
//! recognizes a repository claims it. At most one instance is active per
//! repository per run.

pub mod travis;

use crate::config::RunConfig;
use crate::error::Result;
use crate::io;
use crate::logging::WorkerLogs;
use crate::paths;
use crate::record::{BuildStatus, RepositoryRecord, TreeInfo};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ArtifactKind
// ---------------------------------------------------------------------------

/// The two artifact families harvested out of a build tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Bitcode,
    SyntaxTree,
}

impl ArtifactKind {
    pub fn all() -> &'static [ArtifactKind] {
        &[ArtifactKind::Bitcode, ArtifactKind::SyntaxTree]
    }

    pub fn extension(self) -> &'static str {
        match self {
            ArtifactKind::Bitcode => "bc",
            ArtifactKind::SyntaxTree => "ast",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Bitcode => "bitcode",
            ArtifactKind::SyntaxTree => "syntax tree",
        }
    }
}

// ---------------------------------------------------------------------------
// BuildSystem
// ---------------------------------------------------------------------------

/// The uniform capability set every interpreter variant exposes. Phase
/// failures come back as boolean signals with the detail recorded on the
/// repository record; errors never cross this boundary as panics.
pub trait BuildSystem {
    fn name(&self) -> &'static str;
    fn configure(&mut self, record: &mut RepositoryRecord, logs: &mut WorkerLogs) -> bool;
    fn build(&mut self, record: &mut RepositoryRecord, logs: &mut WorkerLogs) -> bool;
    fn clean(&mut self) -> Result<()>;
    fn extract(&self, kind: ArtifactKind, target_dir: &Path, logs: &mut WorkerLogs)
        -> Result<usize>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

pub struct Variant {
    pub name: &'static str,
    pub recognize: fn(&Path) -> bool,
    pub create: fn(PathBuf, PathBuf, usize, &RunConfig) -> Box<dyn BuildSystem>,
}

/// Probe order is priority order; first match wins.
static VARIANTS: &[Variant] = &[Variant {
    name: "travis",
    recognize: travis::TravisBuild::recognize,
    create: travis::TravisBuild::boxed,
}];

pub fn recognize(dir: &Path) -> Option<&'static Variant> {
    VARIANTS.iter().find(|v| (v.recognize)(dir))
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Drive one repository through recognition, configure, build, and artifact
/// extraction, recording a terminal status on the record.
pub fn build_repository(record: &mut RepositoryRecord, cfg: &RunConfig, logs: &mut WorkerLogs) {
    let Some(source_dir) = record.source.as_ref().map(|s| s.dir.clone()) else {
        record.status = BuildStatus::Unrecognized;
        logs.error(record.index, "no source tree to build");
        return;
    };

    let Some(variant) = recognize(&source_dir) else {
        record.status = BuildStatus::Unrecognized;
        logs.error(record.index, "no build system recognized");
        return;
    };
    logs.info(record.index, &format!("recognized {} project", variant.name));

    let build_dir = paths::repo_build_dir(&cfg.paths.build_dir, &record.name);
    if let Err(e) = io::ensure_dir(&build_dir) {
        record.status = BuildStatus::BuildFail;
        record.record_failure("workspace", None, e.to_string());
        logs.error(record.index, &format!("cannot create build dir: {e}"));
        return;
    }
    record.build = Some(TreeInfo::new(build_dir.clone()));

    let mut system = (variant.create)(source_dir, build_dir, record.index, cfg);

    if !system.configure(record, logs) {
        record.status = BuildStatus::BuildFail;
        return;
    }
    if !system.build(record, logs) {
        record.status = BuildStatus::BuildFail;
        return;
    }

    let target_dir = paths::repo_target_dir(&cfg.paths.target_dir, &record.name);
    for &kind in ArtifactKind::all() {
        match system.extract(kind, &target_dir, logs) {
            Ok(moved) => logs.info(
                record.index,
                &format!("extracted {moved} {} file(s)", kind.as_str()),
            ),
            Err(e) => logs.error(
                record.index,
                &format!("{} extraction failed: {e}", kind.as_str()),
            ),
        }
    }

    record.status = BuildStatus::Success;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_kind_extensions() {
        assert_eq!(ArtifactKind::Bitcode.extension(), "bc");
        assert_eq!(ArtifactKind::SyntaxTree.extension(), "ast");
        assert_eq!(ArtifactKind::all().len(), 2);
    }

    #[test]
    fn registry_recognizes_descriptor_dirs_only() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(recognize(tmp.path()).is_none());
        std::fs::write(tmp.path().join(".travis.yml"), "script: true").unwrap();
        assert_eq!(recognize(tmp.path()).map(|v| v.name), Some("travis"));
    }
}
