use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::pages::PagesOptions;
use crate::poster::PosterOptions;
use crate::report::ReportOptions;
use crate::site::{DeployOptions, DeployTarget};

#[derive(Parser, Debug)]
#[command(
    name = "pipeline-actions",
    about = "CI workflow actions: test reports, Pages staging and deploy, Azure DevOps result posting"
)]
pub struct Cli {
    /// Enable verbose (debug) logging
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Config file with per-action defaults (default: config/actions.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check that the external tools used by the actions are installed
    Check,

    /// Render an Allure report from raw results, merging prior-run history
    Report(ReportArgs),

    /// Copy report, docs and results JSON into a site directory
    PreparePages(PagesArgs),

    /// Publish a prepared site directory
    Deploy(DeployArgs),

    /// Post test outcomes to Azure DevOps Test Plans
    PostResults(PostArgs),
}

#[derive(Args, Debug, Default)]
pub struct ReportArgs {
    /// Directory with raw result files (default: allure-results)
    #[arg(long)]
    pub results_dir: Option<PathBuf>,

    /// Output directory for the rendered report (default: allure-report)
    #[arg(long)]
    pub report_dir: Option<PathBuf>,

    /// Merge history from a previous run (true/false)
    #[arg(long)]
    pub history: Option<bool>,

    /// Local directory with a previous report's history
    #[arg(long)]
    pub history_dir: Option<PathBuf>,

    /// Git remote hosting the published report (default: origin)
    #[arg(long)]
    pub history_remote: Option<String>,

    /// Branch hosting the published report (default: gh-pages)
    #[arg(long)]
    pub history_branch: Option<String>,

    /// Report location inside the hosting branch (default: test-report)
    #[arg(long)]
    pub history_subdir: Option<String>,

    /// Report generator executable (default: allure)
    #[arg(long)]
    pub allure_bin: Option<String>,

    #[arg(long)]
    pub executor_name: Option<String>,

    #[arg(long)]
    pub build_name: Option<String>,

    #[arg(long)]
    pub build_url: Option<String>,

    #[arg(long)]
    pub report_url: Option<String>,
}

impl ReportArgs {
    pub fn apply(self, opts: &mut ReportOptions) {
        set(&mut opts.results_dir, self.results_dir);
        set(&mut opts.report_dir, self.report_dir);
        set(&mut opts.history, self.history);
        set_opt(&mut opts.history_dir, self.history_dir);
        set_opt(&mut opts.history_remote, self.history_remote);
        set(&mut opts.history_branch, self.history_branch);
        set(&mut opts.history_subdir, self.history_subdir);
        set(&mut opts.allure_bin, self.allure_bin);
        set_opt(&mut opts.executor_name, self.executor_name);
        set_opt(&mut opts.build_name, self.build_name);
        set_opt(&mut opts.build_url, self.build_url);
        set_opt(&mut opts.report_url, self.report_url);
    }
}

#[derive(Args, Debug, Default)]
pub struct PagesArgs {
    /// Rendered test report directory
    #[arg(long)]
    pub report_dir: Option<PathBuf>,

    /// Documentation directory
    #[arg(long)]
    pub docs_dir: Option<PathBuf>,

    /// Raw test results JSON file
    #[arg(long)]
    pub results_json: Option<PathBuf>,

    /// Site output directory (default: site)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}

impl PagesArgs {
    pub fn apply(self, opts: &mut PagesOptions) {
        set_opt(&mut opts.report_dir, self.report_dir);
        set_opt(&mut opts.docs_dir, self.docs_dir);
        set_opt(&mut opts.results_json, self.results_json);
        set(&mut opts.output_dir, self.output_dir);
    }
}

#[derive(Args, Debug, Default)]
pub struct DeployArgs {
    /// Prepared site directory (default: site)
    #[arg(long)]
    pub source_dir: Option<PathBuf>,

    /// Publish mechanism (default: git-branch)
    #[arg(long, value_enum)]
    pub target: Option<DeployTarget>,

    /// Git remote to push to (default: origin)
    #[arg(long)]
    pub remote: Option<String>,

    /// Branch to publish to (default: gh-pages)
    #[arg(long)]
    pub branch: Option<String>,

    /// Directory inside the branch to publish into (default: branch root)
    #[arg(long)]
    pub target_subdir: Option<String>,

    /// Keep existing files on the branch (true/false)
    #[arg(long)]
    pub keep_files: Option<bool>,

    /// Add a .nojekyll marker (true/false)
    #[arg(long)]
    pub nojekyll: Option<bool>,

    #[arg(long)]
    pub commit_message: Option<String>,

    /// Archive path when --target artifact (default: github-pages.tar)
    #[arg(long)]
    pub artifact_path: Option<PathBuf>,
}

impl DeployArgs {
    pub fn apply(self, opts: &mut DeployOptions) {
        set(&mut opts.source_dir, self.source_dir);
        set(&mut opts.target, self.target);
        set_opt(&mut opts.remote, self.remote);
        set(&mut opts.branch, self.branch);
        set(&mut opts.target_subdir, self.target_subdir);
        set(&mut opts.keep_files, self.keep_files);
        set(&mut opts.nojekyll, self.nojekyll);
        set_opt(&mut opts.commit_message, self.commit_message);
        set(&mut opts.artifact_path, self.artifact_path);
    }
}

#[derive(Args, Debug, Default)]
pub struct PostArgs {
    /// Test results JSON file (default: test-results.json)
    #[arg(long, alias = "results-json")]
    pub test_result_json: Option<PathBuf>,

    /// Azure DevOps organization URL (e.g. https://dev.azure.com/org)
    #[arg(long, env = "AZURE_DEVOPS_ORG_URL")]
    pub org_url: Option<String>,

    /// Azure DevOps project name
    #[arg(long, env = "AZURE_DEVOPS_PROJECT")]
    pub project: Option<String>,

    /// Azure DevOps personal access token
    #[arg(long, env = "AZURE_DEVOPS_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Per-request timeout in seconds (default: 30)
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Send each retry iteration as its own update (true/false)
    #[arg(long)]
    pub post_iterations: Option<bool>,

    /// Mark results without a local record as NotExecuted (true/false)
    #[arg(long)]
    pub mark_unreported: Option<bool>,
}

impl PostArgs {
    pub fn apply(self, opts: &mut PosterOptions) {
        set(&mut opts.results_json, self.test_result_json);
        set_opt(&mut opts.org_url, self.org_url);
        set_opt(&mut opts.project, self.project);
        set_opt(&mut opts.token, self.token);
        set(&mut opts.timeout_secs, self.timeout_secs);
        set(&mut opts.post_iterations, self.post_iterations);
        set(&mut opts.mark_unreported, self.mark_unreported);
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

fn set_opt<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}
