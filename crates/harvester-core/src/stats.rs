//! Aggregation of build outcomes into the run's report set: status tallies,
//! error classification, a rebuild list for the failures, and the dependency
//! report fed by installed add-ons.

use crate::error::Result;
use crate::io;
use crate::paths;
use crate::record::RepositoryRecord;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub status: String,
    pub phase: String,
    pub diagnostic: String,
}

const DIAGNOSTIC_CAP: usize = 2048;

#[derive(Debug, Default)]
pub struct Statistics {
    total: usize,
    processed: usize,
    by_status: BTreeMap<String, usize>,
    by_phase: BTreeMap<String, usize>,
    rebuild: BTreeMap<String, Option<String>>,
    errors: BTreeMap<String, ErrorDetail>,
    dependencies: BTreeMap<String, Vec<String>>,
    source_bytes: u64,
    source_files: u64,
    build_bytes: u64,
    build_files: u64,
}

impl Statistics {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn update(&mut self, record: &RepositoryRecord, name: &str) {
        self.processed += 1;
        *self
            .by_status
            .entry(record.status.as_str().to_string())
            .or_default() += 1;

        if let Some(failure) = &record.failure {
            *self.by_phase.entry(failure.phase.clone()).or_default() += 1;
            let diagnostic: String = failure.diagnostic.chars().take(DIAGNOSTIC_CAP).collect();
            self.errors.insert(
                name.to_string(),
                ErrorDetail {
                    status: record.status.as_str().to_string(),
                    phase: failure.phase.clone(),
                    diagnostic,
                },
            );
        }

        if !record.status.is_success() {
            self.rebuild.insert(name.to_string(), record.url.clone());
        }
        if !record.packages.is_empty() {
            self.dependencies
                .insert(name.to_string(), record.packages.clone());
        }
        if let Some(source) = &record.source {
            self.source_bytes += source.size_bytes;
            self.source_files += source.file_count;
        }
        if let Some(build) = &record.build {
            self.build_bytes += build.size_bytes;
            self.build_files += build.file_count;
        }
    }

    pub fn success_count(&self) -> usize {
        self.by_status.get("success").copied().unwrap_or(0)
    }

    pub fn print_stats<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        writeln!(out, "{} of {} repositories processed", self.processed, self.total)?;
        writeln!(out, "by status:")?;
        for (status, count) in &self.by_status {
            writeln!(out, "  {status}: {count}")?;
        }
        if !self.by_phase.is_empty() {
            writeln!(out, "failures by phase:")?;
            for (phase, count) in &self.by_phase {
                writeln!(out, "  {phase}: {count}")?;
            }
        }
        writeln!(
            out,
            "source trees: {} files, {} bytes",
            self.source_files, self.source_bytes
        )?;
        writeln!(
            out,
            "build trees: {} files, {} bytes",
            self.build_files, self.build_bytes
        )?;
        Ok(())
    }

    /// Persist the report set, each file keyed by the run timestamp and the
    /// repository count.
    pub fn save_reports(&self, log_dir: &Path, timestamp: &str) -> Result<()> {
        let count = self.processed;
        save_json(
            &paths::rebuild_path(log_dir, timestamp, count),
            &self.rebuild,
        )?;
        save_json(
            &paths::errortypes_path(log_dir, timestamp, count),
            &self.errors,
        )?;
        save_json(
            &paths::dependencies_path(log_dir, timestamp, count),
            &self.dependencies,
        )?;

        let mut summary = Vec::new();
        self.print_stats(&mut summary)?;
        io::atomic_write(&paths::summary_path(log_dir, timestamp, count), &summary)?;
        Ok(())
    }
}

fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let data = serde_json::to_vec_pretty(value)?;
    io::atomic_write(path, &data)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
