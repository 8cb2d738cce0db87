use anyhow::{Context, Result};
use std::path::Path;
use std::process::Command;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct ExecResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run a command and return an error if it exits non-zero.
pub fn run_cmd(cmd: &str, args: &[&str]) -> Result<ExecResult> {
    checked(cmd, args, run_cmd_unchecked(cmd, args)?)
}

/// Run a command inside `dir` and return an error if it exits non-zero.
pub fn run_cmd_in(dir: &Path, cmd: &str, args: &[&str]) -> Result<ExecResult> {
    checked(cmd, args, run_cmd_unchecked_in(Some(dir), cmd, args)?)
}

/// Run a command and return the result regardless of exit code.
pub fn run_cmd_unchecked(cmd: &str, args: &[&str]) -> Result<ExecResult> {
    run_cmd_unchecked_in(None, cmd, args)
}

/// Run a command (optionally inside `dir`) and return the result regardless of exit code.
pub fn run_cmd_unchecked_in(dir: Option<&Path>, cmd: &str, args: &[&str]) -> Result<ExecResult> {
    let start = Instant::now();
    let mut command = Command::new(cmd);
    command.args(args);
    if let Some(dir) = dir {
        command.current_dir(dir);
    }
    let output = command
        .output()
        .with_context(|| format!("failed to execute {cmd}"))?;
    let duration = start.elapsed();

    let result = ExecResult {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        duration,
    };
    tracing::debug!(
        cmd,
        args = %args.join(" "),
        exit_code = result.exit_code,
        elapsed_ms = result.duration.as_millis() as u64,
        "command finished"
    );
    Ok(result)
}

fn checked(cmd: &str, args: &[&str], result: ExecResult) -> Result<ExecResult> {
    if !result.success() {
        anyhow::bail!(
            "{} {} failed (exit {}): {}",
            cmd,
            args.join(" "),
            result.exit_code,
            result.stderr.trim()
        );
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_binary_is_an_error() {
        let result = run_cmd_unchecked("definitely-not-a-real-binary-xyz", &["--version"]);
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_is_reported() {
        let err = run_cmd("sh", &["-c", "echo boom >&2; exit 3"]).unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("exit 3"));
        assert!(msg.contains("boom"));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_in_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let result = run_cmd_in(dir.path(), "ls", &[]).unwrap();
        assert!(result.stdout.contains("marker.txt"));
    }
}
