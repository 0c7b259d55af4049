use anyhow::bail;
use harvester_core::config::MatrixPolicy;
use harvester_core::descriptor::{self, Descriptor, ScriptSpec};
use harvester_core::env::BuildEnv;
use std::path::Path;

/// Dry-run over the interpreter's selection logic: resolved global
/// environment, stage partitioning, and the representative job per stage —
/// without executing anything.
pub fn plan(dir: &Path) -> anyhow::Result<()> {
    if !Descriptor::exists(dir) {
        bail!("no CI descriptor found in {}", dir.display());
    }
    let loaded = Descriptor::load(dir)?;

    let mut env = BuildEnv::new();
    env.resolve_global(&loaded);
    println!("environment ({} variable(s)):", env.len());
    let mut vars: Vec<(&str, &str)> = env.iter().collect();
    vars.sort();
    for (key, value) in vars {
        println!("  {key}={value}");
    }

    match loaded.matrix_jobs() {
        Some(jobs) => {
            let stages = descriptor::partition_stages(jobs);
            println!("matrix: {} job(s) in {} stage(s)", jobs.len(), stages.len());
            for (i, stage) in stages.iter().enumerate() {
                if let Some(job) =
                    descriptor::select_representative(stage, MatrixPolicy::Representative)
                {
                    println!(
                        "  stage {i}: {} job(s), representative stage={} os={} compiler={}",
                        stage.len(),
                        job.stage.as_deref().unwrap_or("-"),
                        job.os.as_deref().unwrap_or("-"),
                        job.compiler.as_deref().unwrap_or("-"),
                    );
                }
            }
        }
        None => println!("matrix: no jobs declared"),
    }

    for (phase, spec) in [
        ("before_install", &loaded.before_install),
        ("install", &loaded.install),
        ("before_script", &loaded.before_script),
        ("script", &loaded.script),
    ] {
        println!("{phase}: {}", describe_phase(spec));
    }
    Ok(())
}

fn describe_phase(spec: &Option<ScriptSpec>) -> String {
    match spec {
        None => "absent".to_string(),
        Some(spec) => match spec.commands() {
            Ok(commands) => format!("{} command(s)", commands.len()),
            Err(e) => format!("malformed ({e})"),
        },
    }
}
