//! Per-task environment resolution.
//!
//! Resolved variables live in an explicit [`BuildEnv`] carried by the task and
//! layered onto every shell invocation — the ambient process environment is
//! never mutated, so repositories sharing a worker cannot leak variables into
//! each other's builds.

use crate::descriptor::{Descriptor, EnvSection, ValueList};
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

static TOKEN_RE: OnceLock<Regex> = OnceLock::new();

fn token_re() -> &'static Regex {
    TOKEN_RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*=").unwrap())
}

#[derive(Debug, Clone, Default)]
pub struct BuildEnv {
    vars: HashMap<String, String>,
}

impl BuildEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Apply one declared env entry: a whitespace-separated sequence of
    /// `KEY=VALUE` tokens. Malformed tokens are skipped, not fatal. The value
    /// is everything after the first `=`.
    pub fn apply_entry(&mut self, entry: &str) {
        for token in entry.split_whitespace() {
            if !token_re().is_match(token) {
                continue;
            }
            if let Some((key, value)) = token.split_once('=') {
                self.set(key, value);
            }
        }
    }

    /// Resolve the descriptor's top-level `env` section. Order matters and
    /// the first match per sub-section wins: a list contributes only its
    /// first string entry; a table contributes every `global` entry, then the
    /// first string under `jobs`, then the first string under `matrix`.
    pub fn resolve_global(&mut self, descriptor: &Descriptor) {
        match &descriptor.env {
            None | Some(EnvSection::Other(_)) => {}
            Some(EnvSection::Scalar(entry)) => self.apply_entry(entry),
            Some(EnvSection::List(entries)) => {
                if let Some(entry) = entries.iter().find_map(|v| v.as_str()) {
                    self.apply_entry(entry);
                }
            }
            Some(EnvSection::Table(table)) => {
                for entry in table.global.strings() {
                    self.apply_entry(entry);
                }
                if let Some(entry) = table.jobs.strings().next() {
                    self.apply_entry(entry);
                }
                if let Some(entry) = table.matrix.strings().next() {
                    self.apply_entry(entry);
                }
            }
        }
    }

    /// A job's env may be a single string or a list; every string entry
    /// applies.
    pub fn apply_job_env(&mut self, env: &ValueList) {
        for entry in env.strings() {
            self.apply_entry(entry);
        }
    }

    /// Fixed provider variables, set unconditionally during configure.
    pub fn set_provider_vars(&mut self, build_dir: &Path) {
        self.set("TRAVIS_BUILD_DIR", build_dir.to_string_lossy());
        self.set("CI", "true");
        self.set("TRAVIS", "true");
        self.set("TRAVIS_OS", "linux");
    }

    pub fn set_compilers(&mut self, cc: &str, cxx: &str) {
        self.set("CC", cc);
        self.set("CC_FOR_BUILD", cc);
        self.set("CXX", cxx);
        self.set("CXX_FOR_BUILD", cxx);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
