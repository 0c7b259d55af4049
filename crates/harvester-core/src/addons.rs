//! Provider add-on installation. Only the apt add-on is materialized in the
//! sandbox; anything else in the addons block is tolerated and skipped.

use crate::descriptor::{value_type_name, ValueList};
use crate::env::BuildEnv;
use crate::logging::WorkerLogs;
use crate::shell;
use serde::Deserialize;
use serde_yaml::Value;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddonSpec {
    #[serde(default)]
    pub apt: Option<AptSection>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AptSection {
    Table(AptAddon),
    Bare(ValueList),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AptAddon {
    #[serde(default)]
    pub packages: Option<ValueList>,
    #[serde(default)]
    pub update: Option<bool>,
}

impl AddonSpec {
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_yaml::from_value(value.clone()).ok()
    }

    pub fn apt_packages(&self) -> Vec<String> {
        match &self.apt {
            None => Vec::new(),
            Some(AptSection::Bare(list)) => list.strings().map(String::from).collect(),
            Some(AptSection::Table(apt)) => apt
                .packages
                .as_ref()
                .map(|list| list.strings().map(String::from).collect())
                .unwrap_or_default(),
        }
    }

    fn wants_update(&self) -> bool {
        matches!(
            &self.apt,
            Some(AptSection::Table(apt)) if apt.update == Some(true)
        )
    }
}

/// Install the add-ons declared by a descriptor or a matrix job. Returns the
/// phase-style failure signal plus the package names that were requested, for
/// the dependency report.
pub fn install_addons(
    value: &Value,
    cwd: &Path,
    env: &BuildEnv,
    index: usize,
    logs: &mut WorkerLogs,
) -> (bool, Vec<String>) {
    let Some(spec) = AddonSpec::from_value(value) else {
        logs.error(
            index,
            &format!("unsupported addons shape: {}", value_type_name(value)),
        );
        return (true, Vec::new());
    };

    let packages = spec.apt_packages();
    if packages.is_empty() {
        return (true, packages);
    }

    let mut apt_env = env.clone();
    apt_env.set("DEBIAN_FRONTEND", "noninteractive");

    if spec.wants_update() && !run_apt(index, "apt-get update", cwd, &apt_env, logs) {
        return (false, packages);
    }

    let install = format!(
        "apt-get install -y --no-install-recommends {}",
        packages.join(" ")
    );
    let ok = run_apt(index, &install, cwd, &apt_env, logs);
    (ok, packages)
}

fn run_apt(index: usize, command: &str, cwd: &Path, env: &BuildEnv, logs: &mut WorkerLogs) -> bool {
    logs.info(index, command);
    match shell::run_command(command, cwd, env) {
        Ok(out) if out.success => true,
        Ok(out) => {
            logs.error(index, &format!("addon install failed: {command}"));
            logs.error(index, &out.stderr);
            false
        }
        Err(e) => {
            logs.error(index, &format!("addon install failed: {e}"));
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn value(yml: &str) -> Value {
        serde_yaml::from_str(yml).unwrap()
    }

    #[test]
    fn packages_from_table_form() {
        let spec = AddonSpec::from_value(&value(
            "apt:\n  update: true\n  packages:\n    - libssl-dev\n    - zlib1g-dev\n",
        ))
        .unwrap();
        assert_eq!(spec.apt_packages(), vec!["libssl-dev", "zlib1g-dev"]);
        assert!(spec.wants_update());
    }

    #[test]
    fn packages_from_bare_list() {
        let spec = AddonSpec::from_value(&value("apt:\n  - libssl-dev\n")).unwrap();
        assert_eq!(spec.apt_packages(), vec!["libssl-dev"]);
        assert!(!spec.wants_update());
    }

    #[test]
    fn single_package_string() {
        let spec = AddonSpec::from_value(&value("apt:\n  packages: libssl-dev\n")).unwrap();
        assert_eq!(spec.apt_packages(), vec!["libssl-dev"]);
    }

    #[test]
    fn unknown_addons_are_empty_not_errors() {
        let spec = AddonSpec::from_value(&value("homebrew:\n  packages:\n    - openssl\n"))
            .unwrap();
        assert!(spec.apt_packages().is_empty());
    }

    #[test]
    fn non_mapping_addons_value_is_rejected() {
        assert!(AddonSpec::from_value(&value("\"just a string\"")).is_none());
    }
}
