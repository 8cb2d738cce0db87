//! Publish a prepared site directory, either by pushing it to a hosting
//! branch or by packing it into an upload artifact.

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Deserialize;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::{exec, files, git, progress};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DeployTarget {
    /// Commit the site to a branch (e.g. gh-pages) and push it.
    GitBranch,
    /// Pack the site into a tar archive for the platform's artifact upload.
    Artifact,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeployOptions {
    pub source_dir: PathBuf,
    pub target: DeployTarget,
    /// Remote to push to. Defaults to the `origin` of the current repository.
    pub remote: Option<String>,
    pub branch: String,
    /// Directory inside the branch to publish into; empty means the branch root.
    pub target_subdir: String,
    /// Keep files already on the branch instead of replacing them.
    pub keep_files: bool,
    pub nojekyll: bool,
    pub commit_message: Option<String>,
    pub author_name: String,
    pub author_email: String,
    pub artifact_path: PathBuf,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("site"),
            target: DeployTarget::GitBranch,
            remote: None,
            branch: "gh-pages".to_string(),
            target_subdir: String::new(),
            keep_files: false,
            nojekyll: true,
            commit_message: None,
            author_name: "github-actions[bot]".to_string(),
            author_email: "41898282+github-actions[bot]@users.noreply.github.com".to_string(),
            artifact_path: PathBuf::from("github-pages.tar"),
        }
    }
}

impl DeployOptions {
    pub fn validate(&self) -> Result<()> {
        if self.source_dir.as_os_str().is_empty() {
            anyhow::bail!("deploy: source_dir must not be empty");
        }
        if self.branch.trim().is_empty() {
            anyhow::bail!("deploy: branch must not be empty");
        }
        let subdir = Path::new(&self.target_subdir);
        if subdir
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            anyhow::bail!(
                "deploy: target_subdir '{}' must be a relative path inside the branch",
                self.target_subdir
            );
        }
        if self.target == DeployTarget::Artifact && self.artifact_path.as_os_str().is_empty() {
            anyhow::bail!("deploy: artifact_path must not be empty");
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum DeployOutcome {
    Published {
        remote: String,
        branch: String,
        commit: String,
    },
    /// The branch already held exactly this content.
    Unchanged { remote: String, branch: String },
    Artifact { path: PathBuf, bytes: u64 },
}

pub fn deploy(opts: &DeployOptions) -> Result<DeployOutcome> {
    opts.validate()?;
    if !opts.source_dir.is_dir() {
        anyhow::bail!(
            "Site directory not found at {}. Run `prepare-pages` first.",
            opts.source_dir.display()
        );
    }

    match opts.target {
        DeployTarget::GitBranch => deploy_to_branch(opts),
        DeployTarget::Artifact => build_artifact(opts),
    }
}

fn deploy_to_branch(opts: &DeployOptions) -> Result<DeployOutcome> {
    let remote = match &opts.remote {
        Some(r) => r.clone(),
        None => git::detect_remote()?,
    };
    tracing::info!(%remote, branch = %opts.branch, "publishing site");

    let tmp = tempfile::tempdir().context("Failed to create temp dir")?;
    let work = tmp.path().join("worktree");

    let pb = progress::stage_spinner(&format!("Checking out {}", opts.branch));
    let checkout = if git::branch_exists(&remote, &opts.branch) {
        git::clone_branch(&remote, &opts.branch, &work)
    } else {
        tracing::info!(branch = %opts.branch, "branch not found, bootstrapping");
        fs::create_dir_all(&work)
            .context("Failed to create work tree")
            .and_then(|_| git::init_orphan(&work, &remote, &opts.branch))
    };
    progress::finish_spinner(&pb, checkout.is_ok());
    checkout?;

    stage(opts, &work)?;

    if !git::has_changes(&work)? {
        tracing::info!("site content unchanged, nothing to publish");
        return Ok(DeployOutcome::Unchanged {
            remote,
            branch: opts.branch.clone(),
        });
    }

    let message = opts.commit_message.clone().unwrap_or_else(|| {
        format!(
            "deploy: {}",
            chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ")
        )
    });

    let pb = progress::stage_spinner(&format!("Pushing to {}", opts.branch));
    let pushed = git::commit_all(&work, &message, &opts.author_name, &opts.author_email)
        .and_then(|_| git::push_with_retry(&work, &opts.branch));
    progress::finish_spinner(&pb, pushed.is_ok());
    pushed.with_context(|| format!("Failed to publish to {}", opts.branch))?;

    Ok(DeployOutcome::Published {
        remote,
        branch: opts.branch.clone(),
        commit: git::head_sha(&work)?,
    })
}

fn build_artifact(opts: &DeployOptions) -> Result<DeployOutcome> {
    let tmp = tempfile::tempdir().context("Failed to create temp dir")?;
    let staging = tmp.path().join("site");
    fs::create_dir_all(&staging)?;
    stage(opts, &staging)?;

    let artifact = if opts.artifact_path.is_absolute() {
        opts.artifact_path.clone()
    } else {
        std::env::current_dir()?.join(&opts.artifact_path)
    };
    if let Some(parent) = artifact.parent() {
        fs::create_dir_all(parent)?;
    }

    let staging_str = staging
        .to_str()
        .with_context(|| format!("Non UTF-8 path: {}", staging.display()))?;
    let artifact_str = artifact
        .to_str()
        .with_context(|| format!("Non UTF-8 path: {}", artifact.display()))?;

    let pb = progress::stage_spinner("Packing site artifact");
    let packed = exec::run_cmd(
        "tar",
        &[
            "--dereference",
            "--directory",
            staging_str,
            "--exclude=.git",
            "-cf",
            artifact_str,
            ".",
        ],
    );
    progress::finish_spinner(&pb, packed.is_ok());
    packed.context("Failed to pack site artifact")?;

    let bytes = fs::metadata(&artifact)?.len();
    tracing::info!(path = %artifact.display(), bytes, "site artifact written");
    Ok(DeployOutcome::Artifact {
        path: artifact,
        bytes,
    })
}

/// Place the contents of `source_dir` at `target_subdir` inside `root`.
fn stage(opts: &DeployOptions, root: &Path) -> Result<()> {
    let subdir = opts.target_subdir.trim_matches('/');
    let dest = if subdir.is_empty() {
        root.to_path_buf()
    } else {
        root.join(subdir)
    };

    if !opts.keep_files {
        if subdir.is_empty() {
            files::clear_dir_except(root, &[".git"])?;
        } else {
            files::clear_dir_except(&dest, &[])?;
        }
    }

    files::copy_dir_recursive(&opts.source_dir, &dest)?;

    if opts.nojekyll {
        fs::write(root.join(".nojekyll"), "").context("Failed to write .nojekyll")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> (tempfile::TempDir, PathBuf) {
        let root = tempfile::tempdir().unwrap();
        let source = root.path().join("site");
        fs::create_dir_all(source.join("test-report")).unwrap();
        fs::write(source.join("test-report/index.html"), "<html/>").unwrap();
        (root, source)
    }

    #[test]
    fn test_stage_replaces_previous_content_but_keeps_git() {
        let (_root, source) = site();
        let work = tempfile::tempdir().unwrap();
        fs::create_dir_all(work.path().join(".git")).unwrap();
        fs::write(work.path().join("stale.html"), "old").unwrap();

        let opts = DeployOptions {
            source_dir: source,
            ..DeployOptions::default()
        };
        stage(&opts, work.path()).unwrap();

        assert!(work.path().join(".git").exists());
        assert!(!work.path().join("stale.html").exists());
        assert!(work.path().join("test-report/index.html").exists());
        assert!(work.path().join(".nojekyll").exists());
    }

    #[test]
    fn test_stage_into_subdir_with_keep_files() {
        let (_root, source) = site();
        let work = tempfile::tempdir().unwrap();
        fs::create_dir_all(work.path().join("pr-12")).unwrap();
        fs::write(work.path().join("pr-12/old.html"), "old").unwrap();
        fs::write(work.path().join("index.html"), "landing").unwrap();

        let opts = DeployOptions {
            source_dir: source,
            target_subdir: "pr-12".to_string(),
            keep_files: true,
            nojekyll: false,
            ..DeployOptions::default()
        };
        stage(&opts, work.path()).unwrap();

        assert!(work.path().join("pr-12/old.html").exists());
        assert!(work.path().join("pr-12/test-report/index.html").exists());
        assert!(work.path().join("index.html").exists());
        assert!(!work.path().join(".nojekyll").exists());
    }

    #[test]
    fn test_target_subdir_must_stay_inside_branch() {
        for bad in ["../elsewhere", "/abs"] {
            let opts = DeployOptions {
                target_subdir: bad.to_string(),
                ..DeployOptions::default()
            };
            assert!(opts.validate().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_missing_source_dir_is_fatal() {
        let root = tempfile::tempdir().unwrap();
        let opts = DeployOptions {
            source_dir: root.path().join("nope"),
            target: DeployTarget::Artifact,
            ..DeployOptions::default()
        };
        let err = deploy(&opts).unwrap_err();
        assert!(format!("{err:#}").contains("Site directory not found"));
    }

    #[test]
    fn test_branch_deploy_bootstraps_then_detects_unchanged_content() {
        if which::which("git").is_err() {
            return;
        }
        let (root, source) = site();
        let remote = root.path().join("remote.git");
        let remote_str = remote.to_str().unwrap().to_string();
        exec::run_cmd("git", &["init", "--bare", &remote_str]).unwrap();
        let opts = DeployOptions {
            source_dir: source.clone(),
            remote: Some(remote_str.clone()),
            ..DeployOptions::default()
        };

        let first = match deploy(&opts).unwrap() {
            DeployOutcome::Published { branch, commit, .. } => {
                assert_eq!(branch, "gh-pages");
                commit
            }
            other => panic!("unexpected outcome {other:?}"),
        };
        assert!(git::branch_exists(&remote_str, "gh-pages"));

        assert_eq!(
            deploy(&opts).unwrap(),
            DeployOutcome::Unchanged {
                remote: remote_str.clone(),
                branch: "gh-pages".to_string(),
            }
        );

        fs::write(source.join("test-report/index.html"), "<html>v2</html>").unwrap();
        let second = match deploy(&opts).unwrap() {
            DeployOutcome::Published { commit, .. } => commit,
            other => panic!("unexpected outcome {other:?}"),
        };
        assert_ne!(first, second);

        let check = root.path().join("check");
        git::clone_branch(&remote_str, "gh-pages", &check).unwrap();
        assert_eq!(
            fs::read_to_string(check.join("test-report/index.html")).unwrap(),
            "<html>v2</html>"
        );
        assert!(check.join(".nojekyll").exists());
        assert_eq!(git::head_sha(&check).unwrap(), second);
    }

    #[test]
    fn test_artifact_is_packed() {
        if which::which("tar").is_err() {
            return;
        }
        let (root, source) = site();
        let opts = DeployOptions {
            source_dir: source,
            target: DeployTarget::Artifact,
            artifact_path: root.path().join("out/github-pages.tar"),
            ..DeployOptions::default()
        };

        match deploy(&opts).unwrap() {
            DeployOutcome::Artifact { path, bytes } => {
                assert!(path.exists());
                assert!(bytes > 0);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}
