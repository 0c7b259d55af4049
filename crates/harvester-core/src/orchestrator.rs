//! The parallel build orchestrator: a fixed pool of worker threads draining a
//! queue of repository tasks, a shared live-progress registry, deterministic
//! submission-order aggregation, and the checkpoint that makes the raw
//! results durable before any reporting runs.

use crate::cloner::Cloner;
use crate::config::RunConfig;
use crate::error::Result;
use crate::io;
use crate::logging::WorkerLogs;
use crate::paths;
use crate::progress::ProgressRegistry;
use crate::record::{BuildStatus, RepositoryRecord, ResultMap};
use crate::stats::Statistics;
use crate::task::{self, TaskOutcome};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::mpsc;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

// ---------------------------------------------------------------------------
// Repository database
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryEntry {
    #[serde(default)]
    pub url: Option<String>,
}

/// Input database: database name → repository name → entry. BTreeMaps keep
/// enumeration (and therefore submission) order deterministic across runs.
pub type RepositoryDb = BTreeMap<String, BTreeMap<String, RepositoryEntry>>;

pub fn load_database(path: &Path) -> Result<RepositoryDb> {
    let data = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

fn enumerate(db: &RepositoryDb) -> Vec<RepositoryRecord> {
    let mut records = Vec::new();
    for repositories in db.values() {
        for (name, entry) in repositories {
            let index = records.len();
            records.push(RepositoryRecord::new(index, name.clone(), entry.url.clone()));
        }
    }
    records
}

// ---------------------------------------------------------------------------
// Worker pool
// ---------------------------------------------------------------------------

/// Build every enumerated repository on the worker pool and aggregate the
/// outcomes in submission order. The checkpoint is written before this
/// returns, so a crash in anything downstream cannot lose the results.
pub fn build_repositories(
    db: &RepositoryDb,
    cfg: &RunConfig,
    cloner: &dyn Cloner,
) -> Result<ResultMap> {
    for dir in [
        &cfg.paths.source_dir,
        &cfg.paths.build_dir,
        &cfg.paths.target_dir,
        &cfg.paths.log_dir,
    ] {
        io::ensure_dir(dir)?;
    }

    let pending = enumerate(db);
    let total = pending.len();
    tracing::info!("submitted {total} task(s) to queue");

    let progress = ProgressRegistry::new(total);
    let queue: Mutex<VecDeque<RepositoryRecord>> = Mutex::new(pending.into_iter().collect());
    let (tx, rx) = mpsc::channel::<TaskOutcome>();
    let worker_count = cfg.workers.count.max(1);
    let start = Instant::now();

    let slots = std::thread::scope(|scope| {
        for worker in 0..worker_count {
            let tx = tx.clone();
            let queue = &queue;
            let progress = &progress;
            scope.spawn(move || {
                worker_loop(worker, total, queue, progress, cloner, cfg, tx);
            });
        }
        drop(tx);

        // Completion order is arbitrary; indexed slots restore submission
        // order for the aggregate.
        let mut slots: Vec<Option<TaskOutcome>> = (0..total).map(|_| None).collect();
        for outcome in rx {
            let index = outcome.index;
            if index < total {
                slots[index] = Some(outcome);
            }
        }
        slots
    });

    let mut results = ResultMap::new();
    for slot in slots {
        match slot {
            Some(outcome) => results.insert(outcome.name, outcome.record),
            None => tracing::error!("a submitted task produced no result"),
        }
    }
    tracing::info!(
        "processed {total} repositories in {:.1}s",
        start.elapsed().as_secs_f64()
    );

    results.save(&paths::checkpoint_path(&cfg.paths.log_dir))?;
    Ok(results)
}

fn worker_loop(
    worker: usize,
    total: usize,
    queue: &Mutex<VecDeque<RepositoryRecord>>,
    progress: &ProgressRegistry,
    cloner: &dyn Cloner,
    cfg: &RunConfig,
    tx: mpsc::Sender<TaskOutcome>,
) {
    // Log sinks open on the worker's first task and are reused for every
    // task this worker picks up afterwards.
    let mut logs: Option<WorkerLogs> = None;
    loop {
        let record = queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let Some(record) = record else { break };

        progress.begin(worker, record.index, &record.name);
        println!("{}", progress.snapshot());

        if logs.is_none() {
            match WorkerLogs::open(&cfg.paths.log_dir, worker, total) {
                Ok(opened) => logs = Some(opened),
                Err(e) => {
                    tracing::error!("worker {worker}: cannot open log sinks: {e}");
                    let mut record = record;
                    record.status = BuildStatus::Crashed;
                    record.record_failure("logging", None, e.to_string());
                    let outcome = TaskOutcome {
                        index: record.index,
                        name: record.name.clone(),
                        record,
                    };
                    progress.finish(worker);
                    if tx.send(outcome).is_err() {
                        break;
                    }
                    continue;
                }
            }
        }
        let Some(sinks) = logs.as_mut() else { break };

        let outcome = task::run_task(cloner, record, cfg, sinks);
        sinks.flush();
        progress.finish(worker);

        if tx.send(outcome).is_err() {
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// Full run: build, checkpoint, report
// ---------------------------------------------------------------------------

/// Build everything, then feed the aggregate to statistics and persist the
/// report set plus the final build-details snapshot.
pub fn execute(
    db: &RepositoryDb,
    cfg: &RunConfig,
    cloner: &dyn Cloner,
) -> Result<(ResultMap, Statistics)> {
    let results = build_repositories(db, cfg, cloner)?;

    let timestamp = cfg.output.run_timestamp();
    let mut stats = Statistics::new(results.len());
    for (name, record) in results.iter() {
        stats.update(record, name);
    }
    stats.save_reports(&cfg.paths.log_dir, &timestamp)?;
    results.save(&paths::build_details_path(
        &cfg.paths.log_dir,
        &timestamp,
        results.len(),
    ))?;
    Ok((results, stats))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HarvestError;
    use crate::record::TreeInfo;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Succeeds when a seeded checkout exists, raises otherwise.
    struct SeededCloner {
        source_root: PathBuf,
    }

    impl Cloner for SeededCloner {
        fn clone_repository(&self, record: &mut RepositoryRecord) -> Result<()> {
            let dir = self.source_root.join(&record.name);
            if !dir.is_dir() {
                return Err(HarvestError::CloneFailed {
                    name: record.name.clone(),
                    detail: "no such checkout".into(),
                });
            }
            record.source = Some(TreeInfo::new(dir));
            Ok(())
        }
    }

    fn cfg_in(root: &Path) -> RunConfig {
        let mut cfg = RunConfig::default();
        cfg.paths.source_dir = root.join("sources");
        cfg.paths.build_dir = root.join("builds");
        cfg.paths.target_dir = root.join("artifacts");
        cfg.paths.log_dir = root.join("logs");
        cfg.output.timestamp = Some("2026_01_01_00_00_00".into());
        cfg
    }

    fn seed_repo(root: &Path, name: &str, descriptor: &str) {
        let dir = root.join("sources").join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(".travis.yml"), descriptor).unwrap();
    }

    fn db(names: &[&str]) -> RepositoryDb {
        let mut repos = BTreeMap::new();
        for name in names {
            repos.insert(
                name.to_string(),
                RepositoryEntry {
                    url: Some(format!("https://src/{name}")),
                },
            );
        }
        BTreeMap::from([("test-db".to_string(), repos)])
    }

    #[test]
    fn every_repository_lands_in_the_map_with_a_terminal_status() {
        let tmp = TempDir::new().unwrap();
        let cfg = cfg_in(tmp.path());
        seed_repo(tmp.path(), "ok", "script: 'true'\n");
        seed_repo(tmp.path(), "fails", "script: exit 1\n");
        // "missing" has no checkout, so its clone raises

        let cloner = SeededCloner {
            source_root: cfg.paths.source_dir.clone(),
        };
        let results = build_repositories(&db(&["ok", "fails", "missing"]), &cfg, &cloner).unwrap();

        assert_eq!(results.len(), 3);
        for (_, record) in results.iter() {
            assert!(record.status.is_terminal());
        }
        assert_eq!(results.get("ok").unwrap().status, BuildStatus::Success);
        assert_eq!(results.get("fails").unwrap().status, BuildStatus::BuildFail);
        assert_eq!(results.get("missing").unwrap().status, BuildStatus::CloneFail);
    }

    #[test]
    fn aggregation_order_is_submission_order_even_with_many_workers() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = cfg_in(tmp.path());
        cfg.workers.count = 4;
        let names: Vec<String> = (0..12).map(|i| format!("repo-{i:02}")).collect();
        for name in &names {
            seed_repo(tmp.path(), name, "script: 'true'\n");
        }
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();

        let cloner = SeededCloner {
            source_root: cfg.paths.source_dir.clone(),
        };
        let results = build_repositories(&db(&name_refs), &cfg, &cloner).unwrap();

        let order: Vec<&str> = results.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(order, name_refs);
        for (i, (_, record)) in results.iter().enumerate() {
            assert_eq!(record.index, i);
        }
    }

    #[test]
    fn checkpoint_written_before_reporting() {
        let tmp = TempDir::new().unwrap();
        let cfg = cfg_in(tmp.path());
        seed_repo(tmp.path(), "only", "script: 'true'\n");

        let cloner = SeededCloner {
            source_root: cfg.paths.source_dir.clone(),
        };
        let results = build_repositories(&db(&["only"]), &cfg, &cloner).unwrap();

        // The checkpoint on disk already matches what reporting would get.
        let checkpoint =
            ResultMap::load(&paths::checkpoint_path(&cfg.paths.log_dir)).unwrap();
        assert_eq!(checkpoint.len(), results.len());
        assert_eq!(
            checkpoint.get("only").unwrap().status,
            results.get("only").unwrap().status
        );
    }

    #[test]
    fn execute_writes_reports_and_final_snapshot() {
        let tmp = TempDir::new().unwrap();
        let cfg = cfg_in(tmp.path());
        seed_repo(tmp.path(), "ok", "script: 'true'\n");

        let cloner = SeededCloner {
            source_root: cfg.paths.source_dir.clone(),
        };
        let (results, stats) = execute(&db(&["ok", "gone"]), &cfg, &cloner).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(stats.success_count(), 1);

        let logs = &cfg.paths.log_dir;
        assert!(logs.join("current_build.json").is_file());
        assert!(logs.join("build_details_2026_01_01_00_00_00_2.json").is_file());
        assert!(logs.join("summary_2026_01_01_00_00_00_2.txt").is_file());
        assert!(logs.join("rebuild_2026_01_01_00_00_00_2.json").is_file());
    }

    #[test]
    fn database_loads_from_json() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("repos.json");
        std::fs::write(
            &path,
            r#"{"debian": {"zlib": {"url": "https://example.org/zlib.git"}, "bare": {}}}"#,
        )
        .unwrap();
        let db = load_database(&path).unwrap();
        assert_eq!(db["debian"].len(), 2);
        assert_eq!(
            db["debian"]["zlib"].url.as_deref(),
            Some("https://example.org/zlib.git")
        );
        assert!(db["debian"]["bare"].url.is_none());
    }
}
