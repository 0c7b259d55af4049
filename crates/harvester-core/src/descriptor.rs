//! Typed intermediate representation of the CI lifecycle descriptor.
//!
//! The descriptor format is loosely typed: scripts may be a string or a list,
//! `env` may be a list, a table, or a bare string, and matrix jobs live under
//! either `jobs.include` or `matrix.include`. Everything is parsed into
//! tagged variants up front so unexpected shapes surface as explicit errors
//! instead of panics deep in the lifecycle replay.

use crate::config::MatrixPolicy;
use crate::error::{HarvestError, Result};
use serde::Deserialize;
use serde_yaml::Value;
use std::path::Path;

/// The provider's lifecycle descriptor file; its presence is what makes this
/// interpreter claim a repository.
pub const DESCRIPTOR_FILE: &str = ".travis.yml";

// ---------------------------------------------------------------------------
// ScriptSpec
// ---------------------------------------------------------------------------

/// A lifecycle phase value: one command, several, or something malformed.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ScriptSpec {
    One(String),
    Many(Vec<String>),
    Other(Value),
}

impl ScriptSpec {
    /// The ordered command list, or a shape error for anything that is not a
    /// string or list of strings. Shape errors are reported as phase
    /// failures, never crashes.
    pub fn commands(&self) -> Result<Vec<&str>> {
        match self {
            ScriptSpec::One(cmd) => Ok(vec![cmd.as_str()]),
            ScriptSpec::Many(cmds) => Ok(cmds.iter().map(String::as_str).collect()),
            ScriptSpec::Other(value) => {
                Err(HarvestError::ScriptShape(value_type_name(value).to_string()))
            }
        }
    }
}

pub fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

// ---------------------------------------------------------------------------
// ValueList
// ---------------------------------------------------------------------------

/// A field that may be a single scalar or a sequence of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ValueList {
    Many(Vec<Value>),
    One(Value),
}

impl Default for ValueList {
    fn default() -> Self {
        ValueList::Many(Vec::new())
    }
}

impl ValueList {
    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        match self {
            ValueList::Many(values) => values.iter(),
            ValueList::One(value) => std::slice::from_ref(value).iter(),
        }
    }

    /// Only the string entries, in order.
    pub fn strings(&self) -> impl Iterator<Item = &str> {
        self.iter().filter_map(|v| v.as_str())
    }
}

// ---------------------------------------------------------------------------
// EnvSection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnvTable {
    #[serde(default)]
    pub global: ValueList,
    #[serde(default)]
    pub jobs: ValueList,
    #[serde(default)]
    pub matrix: ValueList,
}

/// The top-level `env` key in all the shapes it occurs in the wild.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EnvSection {
    List(Vec<Value>),
    Table(EnvTable),
    Scalar(String),
    Other(Value),
}

// ---------------------------------------------------------------------------
// Jobs / matrix
// ---------------------------------------------------------------------------

/// One matrix job: a free-form record of which we read the selection keys,
/// the env, the add-ons, and the lifecycle phases.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Job {
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub compiler: Option<String>,
    #[serde(default)]
    pub env: Option<ValueList>,
    #[serde(default)]
    pub addons: Option<Value>,
    #[serde(default)]
    pub before_install: Option<ScriptSpec>,
    #[serde(default)]
    pub install: Option<ScriptSpec>,
    #[serde(default)]
    pub before_script: Option<ScriptSpec>,
    #[serde(default)]
    pub script: Option<ScriptSpec>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MatrixSection {
    #[serde(default)]
    pub include: Option<Vec<Job>>,
}

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Descriptor {
    #[serde(default)]
    pub env: Option<EnvSection>,
    #[serde(default)]
    pub addons: Option<Value>,
    #[serde(default)]
    pub before_install: Option<ScriptSpec>,
    #[serde(default)]
    pub install: Option<ScriptSpec>,
    #[serde(default)]
    pub before_script: Option<ScriptSpec>,
    #[serde(default)]
    pub script: Option<ScriptSpec>,
    #[serde(default)]
    pub jobs: Option<MatrixSection>,
    #[serde(default)]
    pub matrix: Option<MatrixSection>,
}

impl Descriptor {
    /// Recognition is a pure existence check, no parsing.
    pub fn exists(dir: &Path) -> bool {
        dir.join(DESCRIPTOR_FILE).is_file()
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(DESCRIPTOR_FILE);
        if !path.is_file() {
            return Err(HarvestError::DescriptorNotFound(dir.display().to_string()));
        }
        let data = std::fs::read_to_string(&path)?;
        Ok(serde_yaml::from_str(&data)?)
    }

    /// Matrix jobs from `jobs.include`, falling back to `matrix.include` only
    /// when the `jobs` key is absent entirely. Empty lists count as absent.
    pub fn matrix_jobs(&self) -> Option<&[Job]> {
        let include = match &self.jobs {
            Some(section) => section.include.as_deref(),
            None => self.matrix.as_ref().and_then(|m| m.include.as_deref()),
        };
        include.filter(|jobs| !jobs.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Stage partitioning & representative selection
// ---------------------------------------------------------------------------

/// Split the declared job list into stages. A new stage begins whenever a job
/// carries an explicit `stage` tag and the current stage already has members;
/// otherwise the job joins the current stage. Every job lands in exactly one
/// stage and every stage is non-empty.
pub fn partition_stages(jobs: &[Job]) -> Vec<Vec<&Job>> {
    let mut stages: Vec<Vec<&Job>> = Vec::new();
    if jobs.is_empty() {
        return stages;
    }
    stages.push(Vec::new());
    for job in jobs {
        let current_has_members = stages.last().map(|s| !s.is_empty()).unwrap_or(false);
        if job.stage.is_some() && current_has_members {
            stages.push(Vec::new());
        }
        if let Some(stage) = stages.last_mut() {
            stage.push(job);
        }
    }
    stages
}

fn narrow<'a>(jobs: Vec<&'a Job>, pred: impl Fn(&Job) -> bool) -> Vec<&'a Job> {
    let kept: Vec<&Job> = jobs.iter().copied().filter(|j| pred(j)).collect();
    if kept.is_empty() {
        jobs
    } else {
        kept
    }
}

/// Pick the single job that stands in for a whole stage. Under
/// `Representative`, narrow by amd64, then linux, then clang — each filter
/// applied only when it leaves candidates — and take the first survivor.
/// All other jobs in the stage are discarded.
pub fn select_representative<'a>(stage: &[&'a Job], policy: MatrixPolicy) -> Option<&'a Job> {
    if stage.is_empty() {
        return None;
    }
    if policy == MatrixPolicy::First {
        return Some(stage[0]);
    }
    let candidates = narrow(stage.to_vec(), |j| j.os.as_deref() == Some("amd64"));
    let candidates = narrow(candidates, |j| j.os.as_deref() == Some("linux"));
    let candidates = narrow(candidates, |j| j.compiler.as_deref() == Some("clang"));
    candidates.first().copied()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
