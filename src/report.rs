//! Report generation: merges prior-run history into the raw results and
//! renders an Allure report with the `allure` CLI.

use anyhow::{Context, Result};
use console::Style;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::{exec, files, git, progress};

/// Options for `report`. Every field has a default so a config file may set any subset.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportOptions {
    /// Raw result files produced by the test run.
    pub results_dir: PathBuf,
    /// Where the rendered report is written. Cleaned on every run.
    pub report_dir: PathBuf,
    /// Try to merge history from a previous run.
    pub history: bool,
    /// Local directory holding a previous report's `history/` contents. Takes precedence over the remote.
    pub history_dir: Option<PathBuf>,
    /// Git remote hosting the published report. Defaults to the `origin` of the current repository.
    pub history_remote: Option<String>,
    pub history_branch: String,
    /// Subdirectory of the hosting branch that holds the published report.
    pub history_subdir: String,
    pub allure_bin: String,
    pub executor_name: Option<String>,
    pub build_name: Option<String>,
    pub build_url: Option<String>,
    pub report_url: Option<String>,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("allure-results"),
            report_dir: PathBuf::from("allure-report"),
            history: true,
            history_dir: None,
            history_remote: None,
            history_branch: "gh-pages".to_string(),
            history_subdir: crate::pages::REPORT_SUBDIR.to_string(),
            allure_bin: "allure".to_string(),
            executor_name: None,
            build_name: None,
            build_url: None,
            report_url: None,
        }
    }
}

impl ReportOptions {
    pub fn validate(&self) -> Result<()> {
        if self.results_dir.as_os_str().is_empty() {
            anyhow::bail!("report: results_dir must not be empty");
        }
        if self.report_dir.as_os_str().is_empty() {
            anyhow::bail!("report: report_dir must not be empty");
        }
        if self.results_dir == self.report_dir {
            anyhow::bail!("report: results_dir and report_dir must differ");
        }
        if self.history_branch.trim().is_empty() {
            anyhow::bail!("report: history_branch must not be empty");
        }
        if self.allure_bin.trim().is_empty() {
            anyhow::bail!("report: allure_bin must not be empty");
        }
        Ok(())
    }
}

/// Allure executor metadata (`executor.json`).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExecutorInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    build_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    build_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    report_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ReportStatistic {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub passed: u64,
    #[serde(default)]
    pub failed: u64,
    #[serde(default)]
    pub broken: u64,
    #[serde(default)]
    pub skipped: u64,
}

#[derive(Debug, Deserialize)]
struct SummaryWidget {
    statistic: ReportStatistic,
}

#[derive(Debug)]
pub struct ReportSummary {
    pub report_dir: PathBuf,
    /// Where history came from, if any was merged.
    pub history_source: Option<String>,
    pub statistic: Option<ReportStatistic>,
}

/// Render a report from `results_dir` into `report_dir`.
///
/// History retrieval never fails the run: if it cannot be fetched the report
/// is generated without trend data.
pub fn generate(opts: &ReportOptions) -> Result<ReportSummary> {
    opts.validate()?;

    if !opts.results_dir.is_dir() {
        anyhow::bail!(
            "Results directory not found at {}. Did the test run produce any results?",
            opts.results_dir.display()
        );
    }

    let history_source = if opts.history {
        let pb = progress::stage_spinner("Fetching report history");
        match fetch_history(opts) {
            Ok(source) => {
                progress::finish_spinner(&pb, true);
                Some(source)
            }
            Err(e) => {
                progress::finish_spinner(&pb, false);
                tracing::warn!("continuing without history: {e:#}");
                None
            }
        }
    } else {
        None
    };

    write_executor(opts)?;

    let pb = progress::stage_spinner("Generating report");
    let rendered = render(opts);
    progress::finish_spinner(&pb, rendered.is_ok());
    rendered?;

    let index = opts.report_dir.join("index.html");
    if !index.exists() {
        anyhow::bail!(
            "{} finished but no report index was produced at {}",
            opts.allure_bin,
            index.display()
        );
    }

    Ok(ReportSummary {
        report_dir: opts.report_dir.clone(),
        history_source,
        statistic: read_statistic(&opts.report_dir),
    })
}

/// Copy a previous run's history into `<results_dir>/history`. Returns a description of the source.
fn fetch_history(opts: &ReportOptions) -> Result<String> {
    let dest = opts.results_dir.join("history");

    if let Some(dir) = &opts.history_dir {
        if !dir.is_dir() {
            anyhow::bail!("history directory {} does not exist", dir.display());
        }
        files::copy_dir_recursive(dir, &dest)?;
        tracing::info!(source = %dir.display(), "merged history from local directory");
        return Ok(dir.display().to_string());
    }

    let remote = match &opts.history_remote {
        Some(r) => r.clone(),
        None => git::detect_remote()?,
    };

    let tmp = tempfile::tempdir().context("Failed to create temp dir")?;
    let clone_dir = tmp.path().join("site");
    git::clone_branch(&remote, &opts.history_branch, &clone_dir)?;

    let history = published_history_path(&clone_dir, &opts.history_subdir);
    if !history.is_dir() {
        anyhow::bail!(
            "branch '{}' of {} has no history at {}",
            opts.history_branch,
            remote,
            opts.history_subdir
        );
    }
    files::copy_dir_recursive(&history, &dest)?;

    let source = format!("{}@{}", remote, opts.history_branch);
    tracing::info!(%source, "merged history from hosting branch");
    Ok(source)
}

fn published_history_path(site_root: &Path, subdir: &str) -> PathBuf {
    let subdir = subdir.trim_matches('/');
    if subdir.is_empty() {
        site_root.join("history")
    } else {
        site_root.join(subdir).join("history")
    }
}

fn write_executor(opts: &ReportOptions) -> Result<()> {
    if opts.executor_name.is_none()
        && opts.build_name.is_none()
        && opts.build_url.is_none()
        && opts.report_url.is_none()
    {
        return Ok(());
    }
    let info = ExecutorInfo {
        name: opts.executor_name.clone(),
        kind: "github",
        build_name: opts.build_name.clone(),
        build_url: opts.build_url.clone(),
        report_url: opts.report_url.clone(),
    };
    let path = opts.results_dir.join("executor.json");
    let json = serde_json::to_string_pretty(&info).context("Failed to serialize executor info")?;
    fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn render(opts: &ReportOptions) -> Result<()> {
    let results = path_arg(&opts.results_dir)?;
    let report = path_arg(&opts.report_dir)?;
    exec::run_cmd(
        &opts.allure_bin,
        &["generate", results, "--clean", "-o", report],
    )
    .context("Report generation failed")?;
    Ok(())
}

fn path_arg(path: &Path) -> Result<&str> {
    path.to_str()
        .with_context(|| format!("Non UTF-8 path: {}", path.display()))
}

fn read_statistic(report_dir: &Path) -> Option<ReportStatistic> {
    let content = fs::read_to_string(report_dir.join("widgets/summary.json")).ok()?;
    serde_json::from_str::<SummaryWidget>(&content)
        .map(|w| w.statistic)
        .ok()
}

/// Print a short report summary to stdout.
pub fn print_summary(summary: &ReportSummary) {
    let green = Style::new().green().bold();
    let yellow = Style::new().yellow().bold();

    println!();
    println!("Report written to {}", summary.report_dir.display());
    match &summary.history_source {
        Some(source) => println!("  {} history merged from {}", green.apply_to("✓"), source),
        None => println!("  {} no history merged", yellow.apply_to("!")),
    }
    if let Some(stat) = &summary.statistic {
        println!(
            "  {}/{} passed, {} failed, {} broken, {} skipped",
            stat.passed, stat.total, stat.failed, stat.broken, stat.skipped
        );
    }
    println!();
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// Writes a stand-in for the allure CLI: `generate <results> --clean -o <out>`.
    fn fake_allure(dir: &Path, exit_code: i32) -> String {
        let script = format!(
            r#"#!/bin/sh
out="$5"
mkdir -p "$out/widgets"
echo '<html></html>' > "$out/index.html"
if [ -d "$2/history" ]; then cp -r "$2/history" "$out/history"; fi
echo '{{"statistic":{{"failed":1,"broken":0,"skipped":0,"passed":2,"unknown":0,"total":3}}}}' > "$out/widgets/summary.json"
exit {exit_code}
"#
        );
        let path = dir.join("allure");
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.to_str().unwrap().to_string()
    }

    fn options(root: &Path, allure_bin: String) -> ReportOptions {
        let results_dir = root.join("allure-results");
        fs::create_dir_all(&results_dir).unwrap();
        fs::write(results_dir.join("abc-result.json"), "{}").unwrap();
        ReportOptions {
            results_dir,
            report_dir: root.join("allure-report"),
            allure_bin,
            ..ReportOptions::default()
        }
    }

    #[test]
    fn test_missing_results_dir_is_fatal() {
        let root = tempfile::tempdir().unwrap();
        let opts = ReportOptions {
            results_dir: root.path().join("nope"),
            report_dir: root.path().join("out"),
            history: false,
            ..ReportOptions::default()
        };
        let err = generate(&opts).unwrap_err();
        assert!(format!("{err:#}").contains("Results directory not found"));
    }

    #[test]
    fn test_unavailable_history_still_produces_report() {
        let root = tempfile::tempdir().unwrap();
        let bin = fake_allure(root.path(), 0);
        let opts = ReportOptions {
            history_remote: Some(root.path().join("no-such-repo.git").display().to_string()),
            ..options(root.path(), bin)
        };

        let summary = generate(&opts).unwrap();

        assert!(summary.history_source.is_none());
        assert!(opts.report_dir.join("index.html").exists());
        assert_eq!(summary.statistic.unwrap().total, 3);
    }

    #[test]
    fn test_local_history_is_merged() {
        let root = tempfile::tempdir().unwrap();
        let bin = fake_allure(root.path(), 0);
        let history = root.path().join("prev-history");
        fs::create_dir_all(&history).unwrap();
        fs::write(history.join("history-trend.json"), "[]").unwrap();
        let opts = ReportOptions {
            history_dir: Some(history),
            ..options(root.path(), bin)
        };

        let summary = generate(&opts).unwrap();

        assert!(summary.history_source.is_some());
        assert!(opts.results_dir.join("history/history-trend.json").exists());
        assert!(opts.report_dir.join("history/history-trend.json").exists());
    }

    #[test]
    fn test_generator_failure_is_fatal() {
        let root = tempfile::tempdir().unwrap();
        let bin = fake_allure(root.path(), 1);
        let opts = ReportOptions {
            history: false,
            ..options(root.path(), bin)
        };
        assert!(generate(&opts).is_err());
    }

    #[test]
    fn test_executor_metadata_written() {
        let root = tempfile::tempdir().unwrap();
        let bin = fake_allure(root.path(), 0);
        let opts = ReportOptions {
            history: false,
            executor_name: Some("GitHub Actions".to_string()),
            build_url: Some("https://ci.example.com/run/7".to_string()),
            ..options(root.path(), bin)
        };

        generate(&opts).unwrap();

        let written: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(opts.results_dir.join("executor.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(written["name"], "GitHub Actions");
        assert_eq!(written["buildUrl"], "https://ci.example.com/run/7");
        assert!(written.get("reportUrl").is_none());
    }

    #[test]
    fn test_history_path_with_and_without_subdir() {
        let root = Path::new("/site");
        assert_eq!(published_history_path(root, ""), PathBuf::from("/site/history"));
        assert_eq!(
            published_history_path(root, "/test-report/"),
            PathBuf::from("/site/test-report/history")
        );
    }

    #[test]
    fn test_same_results_and_report_dir_rejected() {
        let opts = ReportOptions {
            results_dir: PathBuf::from("x"),
            report_dir: PathBuf::from("x"),
            ..ReportOptions::default()
        };
        assert!(opts.validate().is_err());
    }
}
