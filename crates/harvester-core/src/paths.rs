use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// File name constants
// ---------------------------------------------------------------------------

/// Checkpoint written as soon as every build has completed, before reporting.
pub const CHECKPOINT_FILE: &str = "current_build.json";

/// Per-repository record persisted into the build directory; exempt from
/// retention cleanup along with `*.log` files.
pub const OUTPUT_RECORD_FILE: &str = "output.json";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// Directory name for a repository, with path separators flattened so names
/// like `github.com/user/repo` stay a single directory level.
pub fn repo_dir_name(name: &str) -> String {
    name.chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect()
}

pub fn repo_source_dir(source_root: &Path, name: &str) -> PathBuf {
    source_root.join(repo_dir_name(name))
}

pub fn repo_build_dir(build_root: &Path, name: &str) -> PathBuf {
    build_root.join(repo_dir_name(name))
}

pub fn repo_target_dir(target_root: &Path, name: &str) -> PathBuf {
    target_root.join(repo_dir_name(name))
}

pub fn checkpoint_path(log_dir: &Path) -> PathBuf {
    log_dir.join(CHECKPOINT_FILE)
}

pub fn summary_path(log_dir: &Path, timestamp: &str, count: usize) -> PathBuf {
    log_dir.join(format!("summary_{timestamp}_{count}.txt"))
}

pub fn build_details_path(log_dir: &Path, timestamp: &str, count: usize) -> PathBuf {
    log_dir.join(format!("build_details_{timestamp}_{count}.json"))
}

pub fn rebuild_path(log_dir: &Path, timestamp: &str, count: usize) -> PathBuf {
    log_dir.join(format!("rebuild_{timestamp}_{count}.json"))
}

pub fn errortypes_path(log_dir: &Path, timestamp: &str, count: usize) -> PathBuf {
    log_dir.join(format!("errortypes_{timestamp}_{count}.json"))
}

pub fn dependencies_path(log_dir: &Path, timestamp: &str, count: usize) -> PathBuf {
    log_dir.join(format!("dependencies_{timestamp}_{count}.json"))
}

/// Log files survive workspace sync and retention cleanup.
pub fn is_log_file(name: &str) -> bool {
    name.ends_with(".log")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
