use crate::env::BuildEnv;
use crate::error::{HarvestError, Result};
use std::path::Path;
use std::process::{Command, Stdio};

pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Run one shell command with the task's resolved environment layered over
/// the inherited one, blocking until it exits. Both output streams are
/// captured. No timeout: a stalled command stalls its worker.
pub fn run_command(command: &str, cwd: &Path, env: &BuildEnv) -> Result<CommandOutput> {
    let child = Command::new("bash")
        .arg("-c")
        .arg(command)
        .current_dir(cwd)
        .envs(env.iter())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| HarvestError::Subprocess {
            command: command.to_string(),
            source: e,
        })?;

    // wait_with_output drains both pipes concurrently, so a chatty command
    // cannot deadlock on a full pipe buffer.
    let output = child
        .wait_with_output()
        .map_err(|e| HarvestError::Subprocess {
            command: command.to_string(),
            source: e,
        })?;

    Ok(CommandOutput {
        success: output.status.success(),
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}
