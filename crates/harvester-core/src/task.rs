//! The per-repository task unit: clone → build-system dispatch → size
//! accounting → retention. Every failure mode is contained here; a task
//! always hands a record with a terminal status back to the orchestrator.

use crate::buildsys;
use crate::cloner::Cloner;
use crate::config::RunConfig;
use crate::io;
use crate::logging::WorkerLogs;
use crate::paths;
use crate::record::{BuildStatus, RepositoryRecord};
use crate::workspace;
use chrono::Utc;
use std::panic::{catch_unwind, AssertUnwindSafe};

pub struct TaskOutcome {
    pub index: usize,
    pub name: String,
    pub record: RepositoryRecord,
}

pub fn run_task(
    cloner: &dyn Cloner,
    mut record: RepositoryRecord,
    cfg: &RunConfig,
    logs: &mut WorkerLogs,
) -> TaskOutcome {
    let index = record.index;
    let name = record.name.clone();

    if let Err(e) = cloner.clone_repository(&mut record) {
        logs.error(index, &format!("error cloning {name}: {e}"));
        record.status = BuildStatus::CloneFail;
        record.record_failure("clone", None, e.to_string());
        record.finished_at = Some(Utc::now());
        return TaskOutcome {
            index,
            name,
            record,
        };
    }

    // Panics inside a build-system variant must not take the worker down;
    // the pipeline continues with whatever partial state exists.
    let dispatch = catch_unwind(AssertUnwindSafe(|| {
        buildsys::build_repository(&mut record, cfg, logs)
    }));
    if let Err(payload) = dispatch {
        let message = panic_message(payload);
        logs.error(index, &format!("builder crashed for {name}: {message}"));
        record.status = BuildStatus::Crashed;
        record.record_failure("dispatch", None, message);
    }

    account_sizes(&mut record);
    record.finished_at = Some(Utc::now());
    persist_output_record(&record);

    if !cfg.build.keep_build_files {
        if let Some(build) = &record.build {
            workspace::clean_build_dir(&build.dir);
        }
    }
    if !cfg.build.keep_source_files {
        if let Some(source) = &record.source {
            workspace::remove_source_tree(&source.dir);
        }
    }

    logs.info(index, &format!("DONE building {name} ({})", record.status));
    TaskOutcome {
        index,
        name,
        record,
    }
}

/// Size accounting is fail-soft: a half-built record never aborts the task.
fn account_sizes(record: &mut RepositoryRecord) {
    if let Some(build) = record.build.as_mut() {
        match workspace::dir_stats(&build.dir) {
            Ok((size, count)) => {
                build.size_bytes = size;
                build.file_count = count;
            }
            Err(e) => tracing::warn!("size accounting failed for {}: {e}", build.dir.display()),
        }
    }
    if let Some(source) = record.source.as_mut() {
        match workspace::dir_stats(&source.dir) {
            Ok((size, count)) => {
                source.size_bytes = size;
                source.file_count = count;
            }
            Err(e) => tracing::warn!("size accounting failed for {}: {e}", source.dir.display()),
        }
    }
}

/// Drop the final record next to the build so it survives retention cleanup.
fn persist_output_record(record: &RepositoryRecord) {
    let Some(build) = &record.build else { return };
    let path = build.dir.join(paths::OUTPUT_RECORD_FILE);
    match serde_json::to_vec_pretty(record) {
        Ok(data) => {
            if let Err(e) = io::atomic_write(&path, &data) {
                tracing::warn!("cannot write {}: {e}", path.display());
            }
        }
        Err(e) => tracing::warn!("cannot serialize output record: {e}"),
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
