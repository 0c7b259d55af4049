use anyhow::Context;
use harvester_core::cloner::GitCloner;
use harvester_core::config::RunConfig;
use harvester_core::orchestrator;
use std::path::Path;

pub fn run(
    config: &Path,
    database: &Path,
    workers: Option<usize>,
    force_update: bool,
) -> anyhow::Result<()> {
    let mut cfg = if config.exists() {
        RunConfig::load(config)
            .with_context(|| format!("loading config {}", config.display()))?
    } else {
        tracing::warn!(
            "config {} not found, using defaults",
            config.display()
        );
        RunConfig::default()
    };
    if let Some(count) = workers {
        cfg.workers.count = count;
    }
    if force_update {
        cfg.build.force_update = true;
    }

    let db = orchestrator::load_database(database)
        .with_context(|| format!("loading database {}", database.display()))?;

    let cloner = GitCloner::new(cfg.paths.source_dir.clone());
    let (results, stats) = orchestrator::execute(&db, &cfg, &cloner)?;

    let mut stdout = std::io::stdout().lock();
    stats.print_stats(&mut stdout)?;
    tracing::info!(
        "{} repositories processed, results in {}",
        results.len(),
        cfg.paths.log_dir.display()
    );
    Ok(())
}
