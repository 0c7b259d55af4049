//! Interpreter for Travis-style lifecycle descriptors.
//!
//! Configure replays the descriptor's environment resolution, representative
//! matrix job, add-ons, and the pre-`script` lifecycle phases; build runs the
//! top-level `script`. One representative job stands in for each stage — the
//! farm never fans out across the matrix (`matrix_policy` in the run config).

use crate::addons;
use crate::buildsys::{ArtifactKind, BuildSystem};
use crate::config::{MatrixPolicy, RunConfig};
use crate::descriptor::{self, Descriptor, Job, ScriptSpec};
use crate::env::BuildEnv;
use crate::error::Result;
use crate::logging::WorkerLogs;
use crate::probe;
use crate::record::RepositoryRecord;
use crate::shell;
use crate::workspace;
use std::path::{Path, PathBuf};

pub struct TravisBuild {
    index: usize,
    source_dir: PathBuf,
    build_dir: PathBuf,
    force_update: bool,
    matrix_policy: MatrixPolicy,
    env: BuildEnv,
    descriptor: Option<Descriptor>,
}

impl TravisBuild {
    pub fn new(
        source_dir: PathBuf,
        build_dir: PathBuf,
        index: usize,
        force_update: bool,
        matrix_policy: MatrixPolicy,
    ) -> Self {
        Self {
            index,
            source_dir,
            build_dir,
            force_update,
            matrix_policy,
            env: BuildEnv::new(),
            descriptor: None,
        }
    }

    pub fn recognize(dir: &Path) -> bool {
        Descriptor::exists(dir)
    }

    pub fn boxed(
        source_dir: PathBuf,
        build_dir: PathBuf,
        index: usize,
        cfg: &RunConfig,
    ) -> Box<dyn BuildSystem> {
        Box::new(Self::new(
            source_dir,
            build_dir,
            index,
            cfg.build.force_update,
            cfg.build.matrix_policy,
        ))
    }

    /// The environment as resolved so far; exposed for plan-style inspection.
    pub fn env(&self) -> &BuildEnv {
        &self.env
    }

    /// Run one lifecycle phase: each command is an independent shell
    /// invocation in the build directory, and the first failure stops the
    /// phase with the command and its stderr recorded.
    fn run_phase(
        &self,
        phase: &str,
        spec: &ScriptSpec,
        record: &mut RepositoryRecord,
        logs: &mut WorkerLogs,
    ) -> bool {
        let commands = match spec.commands() {
            Ok(commands) => commands,
            Err(e) => {
                logs.error(self.index, &format!("{phase}: {e}"));
                record.record_failure(phase, None, e.to_string());
                return false;
            }
        };
        for command in commands {
            logs.info(self.index, &format!("{phase}: {command}"));
            match shell::run_command(command, &self.build_dir, &self.env) {
                Ok(out) if out.success => {
                    if !out.stdout.is_empty() {
                        logs.info(self.index, out.stdout.trim_end());
                    }
                }
                Ok(out) => {
                    logs.error(
                        self.index,
                        &format!("running command\n{command}\nfailed"),
                    );
                    logs.error(self.index, &out.stderr);
                    record.record_failure(phase, Some(command.to_string()), out.stderr);
                    return false;
                }
                Err(e) => {
                    logs.error(self.index, &format!("{phase}: {e}"));
                    record.record_failure(phase, Some(command.to_string()), e.to_string());
                    return false;
                }
            }
        }
        true
    }

    fn install_addon_block(
        &self,
        value: &serde_yaml::Value,
        record: &mut RepositoryRecord,
        logs: &mut WorkerLogs,
    ) -> bool {
        let (ok, packages) =
            addons::install_addons(value, &self.build_dir, &self.env, self.index, logs);
        record.packages.extend(packages);
        if !ok {
            record.record_failure("addons", None, "addon installation failed");
        }
        ok
    }

    /// Replay one stage's representative job: env, add-ons, then every
    /// lifecycle phase including its own `script`.
    fn run_stage_job(
        &mut self,
        job: &Job,
        record: &mut RepositoryRecord,
        logs: &mut WorkerLogs,
    ) -> bool {
        if let Some(env) = &job.env {
            self.env.apply_job_env(env);
        }
        if let Some(addons) = &job.addons {
            if !self.install_addon_block(addons, record, logs) {
                return false;
            }
        }
        let phases = [
            ("before_install", &job.before_install),
            ("install", &job.install),
            ("before_script", &job.before_script),
            ("script", &job.script),
        ];
        for (phase, spec) in phases {
            if let Some(spec) = spec {
                if !self.run_phase(phase, spec, record, logs) {
                    return false;
                }
            }
        }
        true
    }
}

impl BuildSystem for TravisBuild {
    fn name(&self) -> &'static str {
        "travis"
    }

    fn configure(&mut self, record: &mut RepositoryRecord, logs: &mut WorkerLogs) -> bool {
        if let Err(e) = workspace::sync_into(&self.build_dir, &self.source_dir, self.force_update)
        {
            logs.error(self.index, &format!("workspace sync failed: {e}"));
            record.record_failure("sync", None, e.to_string());
            return false;
        }

        let loaded = match Descriptor::load(&self.build_dir) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                logs.error(self.index, &format!("descriptor load failed: {e}"));
                record.record_failure("descriptor", None, e.to_string());
                return false;
            }
        };

        self.env.resolve_global(&loaded);
        self.env.set_provider_vars(&self.build_dir);

        if let Some(jobs) = loaded.matrix_jobs() {
            let stages = descriptor::partition_stages(jobs);
            for stage in &stages {
                let Some(job) = descriptor::select_representative(stage, self.matrix_policy)
                else {
                    continue;
                };
                logs.info(
                    self.index,
                    &format!(
                        "stage of {} job(s), representative: stage={} os={} compiler={}",
                        stage.len(),
                        job.stage.as_deref().unwrap_or("-"),
                        job.os.as_deref().unwrap_or("-"),
                        job.compiler.as_deref().unwrap_or("-"),
                    ),
                );
                if !self.run_stage_job(job, record, logs) {
                    return false;
                }
            }
        }

        if let Some(addon_block) = &loaded.addons {
            if !self.install_addon_block(addon_block, record, logs) {
                return false;
            }
        }

        match (probe::c_compiler(), probe::cxx_compiler()) {
            (Some(cc), Some(cxx)) => self.env.set_compilers(cc, cxx),
            _ => logs.error(self.index, "no C/C++ compiler resolved in sandbox"),
        }

        let phases = [
            ("before_install", &loaded.before_install),
            ("install", &loaded.install),
            ("before_script", &loaded.before_script),
        ];
        for (phase, spec) in phases {
            if let Some(spec) = spec {
                logs.info(self.index, &format!("running {phase}"));
                if !self.run_phase(phase, spec, record, logs) {
                    return false;
                }
            }
        }

        self.descriptor = Some(loaded);
        true
    }

    fn build(&mut self, record: &mut RepositoryRecord, logs: &mut WorkerLogs) -> bool {
        let script = self
            .descriptor
            .as_ref()
            .and_then(|d| d.script.clone());
        match script {
            Some(spec) => {
                logs.info(self.index, "running script");
                self.run_phase("script", &spec, record, logs)
            }
            None => true,
        }
    }

    fn clean(&mut self) -> Result<()> {
        if self.build_dir.exists() {
            std::fs::remove_dir_all(&self.build_dir)?;
        }
        std::fs::create_dir_all(&self.build_dir)?;
        Ok(())
    }

    fn extract(
        &self,
        kind: ArtifactKind,
        target_dir: &Path,
        logs: &mut WorkerLogs,
    ) -> Result<usize> {
        workspace::extract_artifacts(&self.build_dir, kind, target_dir, self.index, logs)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{BuildStatus, RepositoryRecord};
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        source: PathBuf,
        build: PathBuf,
        logs: WorkerLogs,
        record: RepositoryRecord,
    }

    fn fixture(descriptor: &str) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("src");
        let build = tmp.path().join("build");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::write(source.join(".travis.yml"), descriptor).unwrap();
        let logs = WorkerLogs::open(&tmp.path().join("logs"), 0, 1).unwrap();
        let record = RepositoryRecord::new(0, "demo", None);
        Fixture {
            _tmp: tmp,
            source,
            build,
            logs,
            record,
        }
    }

    fn travis(fx: &Fixture) -> TravisBuild {
        TravisBuild::new(
            fx.source.clone(),
            fx.build.clone(),
            0,
            false,
            MatrixPolicy::Representative,
        )
    }

    #[test]
    fn recognize_is_a_pure_existence_check() {
        let tmp = TempDir::new().unwrap();
        assert!(!TravisBuild::recognize(tmp.path()));
        std::fs::write(tmp.path().join(".travis.yml"), "nonsense: [").unwrap();
        assert!(TravisBuild::recognize(tmp.path()));
    }

    #[test]
    fn configure_and_build_run_lifecycle_phases() {
        let mut fx = fixture(
            "install: echo ready > installed.txt\nscript:\n  - echo built > out.txt\n",
        );
        let mut travis = travis(&fx);
        assert!(travis.configure(&mut fx.record, &mut fx.logs));
        assert!(fx.build.join("installed.txt").is_file());

        assert!(travis.build(&mut fx.record, &mut fx.logs));
        assert!(fx.build.join("out.txt").is_file());
    }

    #[test]
    fn failing_phase_short_circuits_and_records_diagnostic() {
        let mut fx = fixture(
            "before_install: 'echo doomed >&2; exit 7'\ninstall: echo never > never.txt\n",
        );
        let mut travis = travis(&fx);
        assert!(!travis.configure(&mut fx.record, &mut fx.logs));
        assert!(!fx.build.join("never.txt").exists());

        let failure = fx.record.failure.as_ref().unwrap();
        assert_eq!(failure.phase, "before_install");
        assert!(failure.diagnostic.contains("doomed"));
        assert!(failure.command.is_some());
    }

    #[test]
    fn malformed_script_is_a_phase_failure_not_a_crash() {
        let mut fx = fixture("script:\n  broken: map\n");
        let mut travis = travis(&fx);
        assert!(travis.configure(&mut fx.record, &mut fx.logs));
        assert!(!travis.build(&mut fx.record, &mut fx.logs));
        assert_eq!(fx.record.failure.as_ref().unwrap().phase, "script");
    }

    #[test]
    fn global_env_reaches_script_commands() {
        let mut fx = fixture(
            "env:\n  global:\n    - PROBE=alive\nscript: echo $PROBE > probe.txt\n",
        );
        let mut travis = travis(&fx);
        assert!(travis.configure(&mut fx.record, &mut fx.logs));
        assert!(travis.build(&mut fx.record, &mut fx.logs));
        let content = std::fs::read_to_string(fx.build.join("probe.txt")).unwrap();
        assert_eq!(content.trim(), "alive");
    }

    #[test]
    fn provider_vars_resolved_during_configure() {
        let mut fx = fixture("script: 'true'\n");
        let mut travis = travis(&fx);
        assert!(travis.configure(&mut fx.record, &mut fx.logs));
        assert_eq!(travis.env().get("CI"), Some("true"));
        assert_eq!(travis.env().get("TRAVIS_OS"), Some("linux"));
        assert_eq!(
            travis.env().get("TRAVIS_BUILD_DIR"),
            Some(fx.build.to_string_lossy().as_ref())
        );
    }

    #[test]
    fn representative_job_phases_run_during_configure() {
        let mut fx = fixture(
            r#"
jobs:
  include:
    - os: windows
      script: echo windows > picked.txt
    - os: linux
      env: STAGEVAR=seen
      script: echo linux > picked.txt
"#,
        );
        let mut travis = travis(&fx);
        assert!(travis.configure(&mut fx.record, &mut fx.logs));
        let picked = std::fs::read_to_string(fx.build.join("picked.txt")).unwrap();
        assert_eq!(picked.trim(), "linux");
        assert_eq!(travis.env().get("STAGEVAR"), Some("seen"));
    }

    #[test]
    fn failing_stage_job_fails_configure() {
        let mut fx = fixture("jobs:\n  include:\n    - script: exit 1\n");
        let mut travis = travis(&fx);
        assert!(!travis.configure(&mut fx.record, &mut fx.logs));
    }

    #[test]
    fn build_without_script_succeeds() {
        let mut fx = fixture("install: 'true'\n");
        let mut travis = travis(&fx);
        assert!(travis.configure(&mut fx.record, &mut fx.logs));
        assert!(travis.build(&mut fx.record, &mut fx.logs));
        assert_eq!(fx.record.status, BuildStatus::Pending); // dispatch sets it
    }

    #[test]
    fn clean_resets_the_build_dir() {
        let mut fx = fixture("script: 'true'\n");
        let mut travis = travis(&fx);
        assert!(travis.configure(&mut fx.record, &mut fx.logs));
        assert!(fx.build.join(".travis.yml").is_file());
        travis.clean().unwrap();
        assert!(fx.build.is_dir());
        assert_eq!(std::fs::read_dir(&fx.build).unwrap().count(), 0);
    }
}
