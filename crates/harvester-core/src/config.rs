use crate::error::{HarvestError, Result};
use crate::io;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// MatrixPolicy
// ---------------------------------------------------------------------------

/// How a stage's job matrix collapses to a single representative job.
///
/// The farm never fans out across a matrix; one job stands in for the whole
/// stage. `Representative` narrows by amd64 → linux → clang before picking the
/// first survivor, `First` takes the stage's first job unconditionally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatrixPolicy {
    #[default]
    Representative,
    First,
}

impl MatrixPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            MatrixPolicy::Representative => "representative",
            MatrixPolicy::First => "first",
        }
    }
}

// ---------------------------------------------------------------------------
// PathsConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,
    #[serde(default = "default_target_dir")]
    pub target_dir: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

fn default_source_dir() -> PathBuf {
    PathBuf::from("sources")
}

fn default_build_dir() -> PathBuf {
    PathBuf::from("builds")
}

fn default_target_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            source_dir: default_source_dir(),
            build_dir: default_build_dir(),
            target_dir: default_target_dir(),
            log_dir: default_log_dir(),
        }
    }
}

// ---------------------------------------------------------------------------
// BuildConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Keep the per-repository build tree after size accounting. When false,
    /// retention deletes everything except log files and the output record.
    #[serde(default = "default_keep")]
    pub keep_build_files: bool,
    /// Keep the cloned source tree after the build.
    #[serde(default = "default_keep")]
    pub keep_source_files: bool,
    /// Re-sync the build directory from source even when already populated.
    #[serde(default)]
    pub force_update: bool,
    #[serde(default)]
    pub matrix_policy: MatrixPolicy,
}

fn default_keep() -> bool {
    true
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            keep_build_files: default_keep(),
            keep_source_files: default_keep(),
            force_update: false,
            matrix_policy: MatrixPolicy::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// WorkersConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersConfig {
    #[serde(default = "default_worker_count")]
    pub count: usize,
}

fn default_worker_count() -> usize {
    1
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
        }
    }
}

// ---------------------------------------------------------------------------
// OutputConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Fixed run timestamp for report file names; defaults to now.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl OutputConfig {
    pub fn run_timestamp(&self) -> String {
        self.timestamp
            .clone()
            .unwrap_or_else(|| Utc::now().format("%Y_%m_%d_%H_%M_%S").to_string())
    }
}

// ---------------------------------------------------------------------------
// RunConfig
// ---------------------------------------------------------------------------

/// Immutable run-wide configuration, shared by reference across all tasks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(HarvestError::ConfigNotFound(path.display().to_string()));
        }
        let data = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&data)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        io::atomic_write(path, data.as_bytes())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_from_empty_yaml() {
        let cfg: RunConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg.workers.count, 1);
        assert!(cfg.build.keep_build_files);
        assert!(cfg.build.keep_source_files);
        assert!(!cfg.build.force_update);
        assert_eq!(cfg.build.matrix_policy, MatrixPolicy::Representative);
        assert_eq!(cfg.paths.build_dir, PathBuf::from("builds"));
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let cfg: RunConfig = serde_yaml::from_str(
            "build:\n  keep_build_files: false\nworkers:\n  count: 8\n",
        )
        .unwrap();
        assert!(!cfg.build.keep_build_files);
        assert!(cfg.build.keep_source_files);
        assert_eq!(cfg.workers.count, 8);
    }

    #[test]
    fn matrix_policy_parses() {
        let cfg: RunConfig =
            serde_yaml::from_str("build:\n  matrix_policy: first\n").unwrap();
        assert_eq!(cfg.build.matrix_policy, MatrixPolicy::First);
    }

    #[test]
    fn roundtrip_through_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("harvester.yaml");
        let mut cfg = RunConfig::default();
        cfg.workers.count = 4;
        cfg.build.force_update = true;
        cfg.save(&path).unwrap();

        let loaded = RunConfig::load(&path).unwrap();
        assert_eq!(loaded.workers.count, 4);
        assert!(loaded.build.force_update);
    }

    #[test]
    fn load_missing_config_errors() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            RunConfig::load(&dir.path().join("nope.yaml")),
            Err(HarvestError::ConfigNotFound(_))
        ));
    }

    #[test]
    fn fixed_timestamp_wins() {
        let out = OutputConfig {
            timestamp: Some("2026_01_02_03_04_05".into()),
        };
        assert_eq!(out.run_timestamp(), "2026_01_02_03_04_05");
    }
}
