use crate::error::Result;
use crate::io;
use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// BuildStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Pending,
    CloneFail,
    BuildFail,
    Crashed,
    Unrecognized,
    Success,
}

impl BuildStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BuildStatus::Pending => "pending",
            BuildStatus::CloneFail => "clone_fail",
            BuildStatus::BuildFail => "build_fail",
            BuildStatus::Crashed => "crashed",
            BuildStatus::Unrecognized => "unrecognized",
            BuildStatus::Success => "success",
        }
    }

    pub fn is_success(self) -> bool {
        self == BuildStatus::Success
    }

    pub fn is_terminal(self) -> bool {
        self != BuildStatus::Pending
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TreeInfo / FailureInfo
// ---------------------------------------------------------------------------

/// An on-disk tree attached to a repository (source checkout or build
/// workspace) with its accounted size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeInfo {
    pub dir: PathBuf,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default)]
    pub file_count: u64,
}

impl TreeInfo {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            size_bytes: 0,
            file_count: 0,
        }
    }
}

/// Which lifecycle phase failed, and what the shell said about it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureInfo {
    pub phase: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub diagnostic: String,
}

// ---------------------------------------------------------------------------
// RepositoryRecord
// ---------------------------------------------------------------------------

/// Per-repository state, created at enumeration and mutated through the task
/// pipeline. Always present in the final result map, whatever happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryRecord {
    pub index: usize,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub status: BuildStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<TreeInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<TreeInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureInfo>,
    /// Add-on packages installed before the build; feeds the dependency report.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl RepositoryRecord {
    pub fn new(index: usize, name: impl Into<String>, url: Option<String>) -> Self {
        Self {
            index,
            name: name.into(),
            url,
            status: BuildStatus::Pending,
            source: None,
            build: None,
            failure: None,
            packages: Vec::new(),
            finished_at: None,
        }
    }

    pub fn record_failure(
        &mut self,
        phase: impl Into<String>,
        command: Option<String>,
        diagnostic: impl Into<String>,
    ) {
        self.failure = Some(FailureInfo {
            phase: phase.into(),
            command,
            diagnostic: diagnostic.into(),
        });
    }
}

// ---------------------------------------------------------------------------
// ResultMap
// ---------------------------------------------------------------------------

/// Aggregate name → record mapping whose iteration and serialization order is
/// insertion order (= submission order). Kept as an ordered vec because the
/// workspace carries no ordered-map crate.
#[derive(Debug, Clone, Default)]
pub struct ResultMap(Vec<(String, RepositoryRecord)>);

impl ResultMap {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn insert(&mut self, name: String, record: RepositoryRecord) {
        self.0.push((name, record));
    }

    pub fn get(&self, name: &str) -> Option<&RepositoryRecord> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, r)| r)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, (String, RepositoryRecord)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)?;
        io::atomic_write(path, &data)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }
}

impl Serialize for ResultMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, record) in &self.0 {
            map.serialize_entry(name, record)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ResultMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct MapVisitor;

        impl<'de> Visitor<'de> for MapVisitor {
            type Value = ResultMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of repository name to record")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<ResultMap, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, record)) =
                    access.next_entry::<String, RepositoryRecord>()?
                {
                    entries.push((name, record));
                }
                Ok(ResultMap(entries))
            }
        }

        deserializer.deserialize_map(MapVisitor)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
