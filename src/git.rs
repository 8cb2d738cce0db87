//! Thin wrappers over the `git` CLI for working with a hosting branch
//! (usually `gh-pages`): remote detection, shallow clones, commit and push.

use anyhow::{Context, Result};
use std::path::Path;

use crate::exec;

/// Return the URL of the `origin` remote of the repository in the current directory.
pub fn detect_remote() -> Result<String> {
    let result = exec::run_cmd_unchecked("git", &["remote", "get-url", "origin"])
        .context("Failed to run git remote get-url")?;
    if !result.success() {
        anyhow::bail!("No git remote 'origin' found. Pass a remote URL explicitly.");
    }
    Ok(result.stdout.trim().to_string())
}

/// Whether `branch` exists on `remote`. Any failure to reach the remote counts as "no".
pub fn branch_exists(remote: &str, branch: &str) -> bool {
    exec::run_cmd_unchecked("git", &["ls-remote", "--heads", remote, branch])
        .map(|r| r.success() && !r.stdout.trim().is_empty())
        .unwrap_or(false)
}

/// Shallow-clone a single branch of `remote` into `dest` (which must be empty or absent).
pub fn clone_branch(remote: &str, branch: &str, dest: &Path) -> Result<()> {
    let dest_str = dest
        .to_str()
        .with_context(|| format!("Non UTF-8 path: {}", dest.display()))?;
    exec::run_cmd(
        "git",
        &[
            "clone",
            "--depth",
            "1",
            "--branch",
            branch,
            "--single-branch",
            remote,
            dest_str,
        ],
    )
    .with_context(|| format!("Failed to clone branch '{branch}' from {remote}"))?;
    Ok(())
}

/// Initialize `dir` as a fresh repository on an orphan `branch` pointing at `remote`.
pub fn init_orphan(dir: &Path, remote: &str, branch: &str) -> Result<()> {
    run_git(dir, &["init"])?;
    run_git(dir, &["symbolic-ref", "HEAD", &format!("refs/heads/{branch}")])?;
    run_git(dir, &["remote", "add", "origin", remote])?;
    Ok(())
}

/// Whether the work tree in `dir` has anything to commit.
pub fn has_changes(dir: &Path) -> Result<bool> {
    let result = exec::run_cmd_in(dir, "git", &["status", "--porcelain"])?;
    Ok(!result.stdout.trim().is_empty())
}

/// Stage everything and commit with `message` as the given author.
///
/// The identity is written to the work tree's local config so a later
/// `pull --rebase` can rewrite the commit.
pub fn commit_all(dir: &Path, message: &str, author_name: &str, author_email: &str) -> Result<()> {
    run_git(dir, &["config", "user.name", author_name])?;
    run_git(dir, &["config", "user.email", author_email])?;
    run_git(dir, &["add", "-A"])?;
    run_git(dir, &["commit", "--no-gpg-sign", "-m", message])
}

/// Return the current HEAD commit SHA in `dir`.
pub fn head_sha(dir: &Path) -> Result<String> {
    let result = exec::run_cmd_in(dir, "git", &["rev-parse", "HEAD"])?;
    Ok(result.stdout.trim().to_string())
}

/// Push `branch` to origin, retrying once after `pull --rebase` if the first push is rejected.
pub fn push_with_retry(dir: &Path, branch: &str) -> Result<()> {
    let first = exec::run_cmd_unchecked_in(Some(dir), "git", &["push", "origin", branch]);
    match first {
        Ok(r) if r.success() => Ok(()),
        _ => {
            tracing::warn!(branch, "push failed, retrying with pull --rebase");
            run_git(dir, &["pull", "--rebase", "origin", branch])?;
            run_git(dir, &["push", "origin", branch])
        }
    }
}

pub fn run_git(dir: &Path, args: &[&str]) -> Result<()> {
    exec::run_cmd_in(dir, "git", args)
        .with_context(|| format!("Failed to run git {}", args.join(" ")))?;
    Ok(())
}
