//! Build-workspace materialization, artifact extraction, size accounting,
//! and retention cleanup.

use crate::buildsys::ArtifactKind;
use crate::env::BuildEnv;
use crate::error::{HarvestError, Result};
use crate::logging::WorkerLogs;
use crate::paths;
use crate::shell;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Workspace sync
// ---------------------------------------------------------------------------

/// Materialize the build workspace from the source checkout. A no-op when the
/// build directory is already populated and `force` is unset; otherwise the
/// directory is cleared (log files survive) and the whole source tree is
/// copied in, hidden entries included. Copy failure is fatal for the
/// repository.
pub fn sync_into(build_dir: &Path, source_dir: &Path, force: bool) -> Result<()> {
    std::fs::create_dir_all(build_dir)?;
    if !force && !dir_is_empty(build_dir)? {
        return Ok(());
    }

    for entry in std::fs::read_dir(build_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if paths::is_log_file(&name.to_string_lossy()) {
            continue;
        }
        remove_entry(&entry.path())?;
    }

    // cp -a with dotglob picks up hidden entries the way a plain glob won't.
    let command = format!(
        "shopt -s dotglob; cp -a {}/* {}",
        source_dir.display(),
        build_dir.display()
    );
    let out = shell::run_command(&command, source_dir, &BuildEnv::new())?;
    if !out.success {
        return Err(HarvestError::WorkspaceSync(out.stderr));
    }
    Ok(())
}

fn dir_is_empty(dir: &Path) -> Result<bool> {
    Ok(std::fs::read_dir(dir)?.next().is_none())
}

/// Remove one workspace entry. Another process may have cleaned it up
/// concurrently, so a structured remove that reports the file already gone
/// falls back to a shell-level recursive remove.
fn remove_entry(path: &Path) -> Result<()> {
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            let command = format!("rm -rf {}", path.display());
            let _ = shell::run_command(&command, Path::new("."), &BuildEnv::new());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

// ---------------------------------------------------------------------------
// Artifact extraction
// ---------------------------------------------------------------------------

/// Relocate every file of the requested kind out of the build tree,
/// recreating its build-relative directory structure under `target_dir`.
/// Returns how many files moved. A file that does not live under the
/// build-tree root is a per-file error: logged, extraction continues.
pub fn extract_artifacts(
    build_dir: &Path,
    kind: ArtifactKind,
    target_dir: &Path,
    index: usize,
    logs: &mut WorkerLogs,
) -> Result<usize> {
    let mut files = Vec::new();
    collect_files(build_dir, kind.extension(), &mut files)?;

    let mut moved = 0;
    for file in files {
        let relative = match file.strip_prefix(build_dir) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => {
                logs.error(
                    index,
                    &format!(
                        "artifact outside build tree, skipping: {}",
                        file.display()
                    ),
                );
                continue;
            }
        };
        let dest = target_dir.join(&relative);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        move_file(&file, &dest)?;
        moved += 1;
    }
    Ok(moved)
}

fn collect_files(dir: &Path, extension: &str, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_symlink() {
            continue;
        }
        let path = entry.path();
        if file_type.is_dir() {
            collect_files(&path, extension, files)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some(extension) {
            files.push(path);
        }
    }
    Ok(())
}

/// Move across filesystems: the build tree may be container-local while the
/// target tree is host-persistent, so `rename` cannot be assumed to work.
fn move_file(src: &Path, dest: &Path) -> Result<()> {
    match std::fs::rename(src, dest) {
        Ok(()) => Ok(()),
        Err(_) => {
            std::fs::copy(src, dest)?;
            std::fs::remove_file(src)?;
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Size accounting
// ---------------------------------------------------------------------------

/// Recursive (size, file count) for a directory, symlinks excluded.
pub fn dir_stats(dir: &Path) -> Result<(u64, u64)> {
    let mut size = 0u64;
    let mut count = 0u64;
    walk_stats(dir, &mut size, &mut count)?;
    Ok((size, count))
}

fn walk_stats(dir: &Path, size: &mut u64, count: &mut u64) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_symlink() {
            continue;
        }
        if file_type.is_dir() {
            walk_stats(&entry.path(), size, count)?;
        } else {
            *count += 1;
            *size += entry.metadata()?.len();
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Retention
// ---------------------------------------------------------------------------

/// Delete everything in a build directory except log files and the persisted
/// output record. Deletion failures are logged, not fatal; running this on an
/// already-clean directory is a no-op.
pub fn clean_build_dir(dir: &Path) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return,
        Err(e) => {
            tracing::warn!("cannot list build dir {}: {e}", dir.display());
            return;
        }
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if paths::is_log_file(&name) || name == paths::OUTPUT_RECORD_FILE {
            continue;
        }
        let path = entry.path();
        let result = if path.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        if let Err(e) = result {
            tracing::warn!("error removing {}: {e}", path.display());
        }
    }
}

/// Best-effort recursive delete of the source checkout.
pub fn remove_source_tree(dir: &Path) {
    if let Err(e) = std::fs::remove_dir_all(dir) {
        if e.kind() != ErrorKind::NotFound {
            tracing::warn!("error removing source tree {}: {e}", dir.display());
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn logs(dir: &Path) -> WorkerLogs {
        WorkerLogs::open(dir, 0, 1).unwrap()
    }

    fn write(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn sync_copies_hidden_entries() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("src");
        let build = tmp.path().join("build");
        write(&source.join(".travis.yml"), "script: make");
        write(&source.join("main.c"), "int main() {}");

        sync_into(&build, &source, false).unwrap();
        assert!(build.join(".travis.yml").is_file());
        assert!(build.join("main.c").is_file());
    }

    #[test]
    fn sync_skips_populated_dir_without_force() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("src");
        let build = tmp.path().join("build");
        write(&source.join("a.txt"), "new");
        write(&build.join("stale.txt"), "old");

        sync_into(&build, &source, false).unwrap();
        assert!(build.join("stale.txt").is_file());
        assert!(!build.join("a.txt").exists());

        sync_into(&build, &source, true).unwrap();
        assert!(!build.join("stale.txt").exists());
        assert!(build.join("a.txt").is_file());
    }

    #[test]
    fn sync_preserves_log_files() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("src");
        let build = tmp.path().join("build");
        write(&source.join("a.txt"), "x");
        write(&build.join("build.log"), "previous run");

        sync_into(&build, &source, true).unwrap();
        assert!(build.join("build.log").is_file());
        assert!(build.join("a.txt").is_file());
    }

    #[test]
    fn extraction_recreates_relative_structure() {
        let tmp = TempDir::new().unwrap();
        let build = tmp.path().join("build");
        let target = tmp.path().join("out");
        write(&build.join("sub/dir/x.bc"), "bitcode");
        write(&build.join("top.bc"), "more");
        write(&build.join("sub/readme.txt"), "not an artifact");

        let mut logs = logs(tmp.path());
        let moved =
            extract_artifacts(&build, ArtifactKind::Bitcode, &target, 0, &mut logs).unwrap();
        assert_eq!(moved, 2);
        assert_eq!(
            std::fs::read_to_string(target.join("sub/dir/x.bc")).unwrap(),
            "bitcode"
        );
        assert!(!build.join("sub/dir/x.bc").exists());
        assert!(build.join("sub/readme.txt").exists());
    }

    #[test]
    fn extraction_kind_selects_extension() {
        let tmp = TempDir::new().unwrap();
        let build = tmp.path().join("build");
        let target = tmp.path().join("out");
        write(&build.join("a.bc"), "bc");
        write(&build.join("a.ast"), "ast");

        let mut logs = logs(tmp.path());
        let moved =
            extract_artifacts(&build, ArtifactKind::SyntaxTree, &target, 0, &mut logs).unwrap();
        assert_eq!(moved, 1);
        assert!(target.join("a.ast").is_file());
        assert!(build.join("a.bc").is_file());
    }

    #[test]
    fn dir_stats_counts_files_not_symlinks() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("tree");
        write(&dir.join("a.txt"), "12345");
        write(&dir.join("sub/b.txt"), "123");
        #[cfg(unix)]
        std::os::unix::fs::symlink(dir.join("a.txt"), dir.join("link.txt")).unwrap();

        let (size, count) = dir_stats(&dir).unwrap();
        assert_eq!(size, 8);
        assert_eq!(count, 2);
    }

    #[test]
    fn retention_keeps_logs_and_output_record() {
        let tmp = TempDir::new().unwrap();
        let build = tmp.path().join("build");
        write(&build.join("build.log"), "log");
        write(&build.join("output.json"), "{}");
        write(&build.join("obj/a.o"), "obj");
        write(&build.join("Makefile"), "all:");

        clean_build_dir(&build);
        let names: Vec<String> = std::fs::read_dir(&build)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"build.log".to_string()));
        assert!(names.contains(&"output.json".to_string()));
    }

    #[test]
    fn retention_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let build = tmp.path().join("build");
        write(&build.join("build.log"), "log");
        write(&build.join("junk.o"), "x");

        clean_build_dir(&build);
        clean_build_dir(&build);
        assert!(build.join("build.log").is_file());
        assert!(!build.join("junk.o").exists());
    }

    #[test]
    fn retention_tolerates_missing_dir() {
        let tmp = TempDir::new().unwrap();
        clean_build_dir(&tmp.path().join("never-created"));
        remove_source_tree(&tmp.path().join("also-missing"));
    }
}
