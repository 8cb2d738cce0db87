//! Post local test outcomes to Azure DevOps Test Plans.
//!
//! Opens one automated test run over the named plan/suite, updates one result
//! per local record, then closes the run. A record that cannot be posted is
//! reported and skipped; only an unreachable service or rejected credentials
//! stop the pass early.

pub mod client;
pub mod error;
pub mod model;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use console::Style;
use serde::Deserialize;
use tracing::{error, info, warn};

use client::{AzureDevOpsClient, ResultUpdate, RunResult, RunState};
use error::RecordError;
use model::{Outcome, PreparedRecord};

#[derive(Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PosterOptions {
    pub results_json: PathBuf,
    /// Organization URL, e.g. `https://dev.azure.com/my-org`.
    pub org_url: Option<String>,
    pub project: Option<String>,
    pub token: Option<String>,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Send each iteration of a retried test as its own update call.
    pub post_iterations: bool,
    /// Mark result slots with no local record as NotExecuted.
    pub mark_unreported: bool,
}

impl Default for PosterOptions {
    fn default() -> Self {
        Self {
            results_json: PathBuf::from("test-results.json"),
            org_url: None,
            project: None,
            token: None,
            timeout_secs: 30,
            post_iterations: false,
            mark_unreported: true,
        }
    }
}

impl std::fmt::Debug for PosterOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PosterOptions")
            .field("results_json", &self.results_json)
            .field("org_url", &self.org_url)
            .field("project", &self.project)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .field("post_iterations", &self.post_iterations)
            .field("mark_unreported", &self.mark_unreported)
            .finish()
    }
}

/// Connection settings after validation.
struct Target<'a> {
    org_url: &'a str,
    project: &'a str,
    token: &'a str,
}

impl PosterOptions {
    pub fn validate(&self) -> Result<()> {
        self.target().map(|_| ())
    }

    fn target(&self) -> Result<Target<'_>> {
        let org_url = required(&self.org_url, "org_url")?;
        let parsed = url::Url::parse(org_url)
            .with_context(|| format!("post-results: org_url '{org_url}' is not a valid URL"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("post-results: org_url must be an http(s) URL, got '{org_url}'");
        }
        let project = required(&self.project, "project")?;
        let token = required(&self.token, "token")?;
        if self.timeout_secs == 0 {
            anyhow::bail!("post-results: timeout_secs must be greater than zero");
        }
        Ok(Target {
            org_url,
            project,
            token,
        })
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => anyhow::bail!("post-results: {name} is required"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFailure {
    pub test_case_id: String,
    pub reason: String,
}

#[derive(Debug)]
pub struct PostSummary {
    pub run_id: i64,
    pub run_state: RunState,
    /// Records read from the file.
    pub attempted: usize,
    /// Records whose updates all succeeded.
    pub posted: usize,
    /// Result update calls issued, successful or not.
    pub update_calls: usize,
    /// Posted records whose outcome was not Passed.
    pub test_failures: usize,
    /// Result slots closed as NotExecuted for lack of a local record.
    pub not_executed: usize,
    pub failures: Vec<RecordFailure>,
}

impl PostSummary {
    fn new(run_id: i64) -> Self {
        Self {
            run_id,
            run_state: RunState::Completed,
            attempted: 0,
            posted: 0,
            update_calls: 0,
            test_failures: 0,
            not_executed: 0,
            failures: Vec::new(),
        }
    }

    pub fn all_posted(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, test_case_id: impl Into<String>, reason: String) {
        let test_case_id = test_case_id.into();
        error!(test_case_id = %test_case_id, "failed to post result: {reason}");
        self.failures.push(RecordFailure {
            test_case_id,
            reason,
        });
    }
}

/// Post every record of the results file and close the run.
///
/// Returns `Err` only for failures that stop the whole pass (missing file,
/// unknown plan/suite, unreachable service, rejected token). Per-record
/// failures are collected in the summary.
pub async fn post_results(opts: &PosterOptions) -> Result<PostSummary> {
    let target = opts.target()?;
    let file = model::load_results_file(&opts.results_json)?;
    info!(
        plan = %file.test_plan_name,
        suite = %file.test_suite_name,
        records = file.test_results.len(),
        "posting test results"
    );

    let client = AzureDevOpsClient::new(
        target.org_url,
        target.project,
        target.token,
        Duration::from_secs(opts.timeout_secs),
    )?;

    let plan_id = client
        .test_plan_id(&file.test_plan_name)
        .await
        .context("Failed to resolve test plan")?;
    let suite_id = client
        .test_suite_id(plan_id, &file.test_suite_name)
        .await
        .context("Failed to resolve test suite")?;
    let point_ids = client
        .test_point_ids(plan_id, suite_id)
        .await
        .context("Failed to list test points")?;
    let run_id = client
        .create_test_run(&file.test_plan_name, &file.test_suite_name, plan_id, &point_ids)
        .await
        .context("Failed to create test run")?;
    let run_results = client
        .run_results(run_id)
        .await
        .context("Failed to list test run results")?;

    let mut slots: HashMap<u64, Vec<i64>> = HashMap::new();
    for r in &run_results {
        if let Some(case) = r.test_case_id {
            slots.entry(case).or_default().push(r.id);
        }
    }

    let mut summary = PostSummary::new(run_id);
    let mut reported: HashSet<u64> = HashSet::new();
    let total = file.test_results.len();

    for (key, value) in &file.test_results {
        summary.attempted += 1;

        let record = match model::prepare_record(key, value) {
            Ok(r) => r,
            Err(e) => {
                summary.fail(key.as_str(), e.to_string());
                continue;
            }
        };
        if !reported.insert(record.test_case_id) {
            summary.fail(key.as_str(), RecordError::Duplicate(record.test_case_id).to_string());
            continue;
        }

        match post_record(&client, run_id, &slots, &record, opts, &mut summary.update_calls).await {
            Ok(()) => {
                summary.posted += 1;
                if record.outcome != Outcome::Passed {
                    summary.test_failures += 1;
                }
            }
            Err(e) if e.is_fatal() => {
                summary.fail(key.as_str(), e.to_string());
                return Err(e).with_context(|| {
                    format!(
                        "Aborting after {} of {} records; the service cannot be used",
                        summary.attempted, total
                    )
                });
            }
            Err(e) => summary.fail(key.as_str(), e.to_string()),
        }
    }

    if opts.mark_unreported {
        let updates = unreported_updates(&run_results, &reported);
        if !updates.is_empty() {
            summary.update_calls += 1;
            match client.update_results(run_id, &updates).await {
                Ok(()) => summary.not_executed = updates.len(),
                Err(e) if e.is_fatal() => {
                    return Err(e).context("Failed to close unreported results");
                }
                Err(e) => {
                    let ids = updates
                        .iter()
                        .map(|u| u.id.to_string())
                        .collect::<Vec<_>>()
                        .join(",");
                    summary.fail(format!("unreported results {ids}"), e.to_string());
                }
            }
        }
    }

    summary.run_state = if summary.test_failures == 0
        && summary.not_executed == 0
        && summary.all_posted()
    {
        RunState::Completed
    } else {
        RunState::NeedsInvestigation
    };
    client
        .complete_run(run_id, summary.run_state)
        .await
        .context("Failed to close test run")?;

    Ok(summary)
}

/// Issue the update call(s) for one record. A test case with several points
/// has several result slots; each call carries one element per slot. Every
/// call is attempted even if an earlier one for the same record failed, unless
/// the failure is fatal.
async fn post_record(
    client: &AzureDevOpsClient,
    run_id: i64,
    slots: &HashMap<u64, Vec<i64>>,
    record: &PreparedRecord,
    opts: &PosterOptions,
    calls: &mut usize,
) -> Result<(), RecordError> {
    let result_ids = slots
        .get(&record.test_case_id)
        .filter(|ids| !ids.is_empty())
        .ok_or(RecordError::NotInRun(record.test_case_id))?;

    let mut errors = Vec::new();

    let aggregate: Vec<ResultUpdate> = result_ids
        .iter()
        .map(|&id| ResultUpdate::aggregate(id, record, !opts.post_iterations))
        .collect();
    *calls += 1;
    if let Err(e) = client.update_results(run_id, &aggregate).await {
        if e.is_fatal() {
            return Err(e.into());
        }
        errors.push(e);
    }

    if opts.post_iterations {
        for iteration in &record.iterations {
            *calls += 1;
            let updates: Vec<ResultUpdate> = result_ids
                .iter()
                .map(|&id| ResultUpdate::iteration(id, iteration))
                .collect();
            if let Err(e) = client.update_results(run_id, &updates).await {
                if e.is_fatal() {
                    return Err(e.into());
                }
                warn!(
                    test_case_id = record.test_case_id,
                    iteration = iteration.id,
                    "iteration update failed: {e}"
                );
                errors.push(e);
            }
        }
    }

    match errors.len() {
        0 => Ok(()),
        1 if !opts.post_iterations => Err(errors.remove(0).into()),
        _ => Err(RecordError::Partial(errors)),
    }
}

fn unreported_updates(run_results: &[RunResult], reported: &HashSet<u64>) -> Vec<ResultUpdate> {
    run_results
        .iter()
        .filter(|r| r.test_case_id.is_none_or(|case| !reported.contains(&case)))
        .map(|r| ResultUpdate::not_executed(r.id))
        .collect()
}

/// Print the posting summary to stdout.
pub fn print_summary(summary: &PostSummary) {
    let green = Style::new().green().bold();
    let red = Style::new().red().bold();
    let dim = Style::new().dim();

    println!();
    println!("Test run {} ({})", summary.run_id, summary.run_state);
    println!("{}", "-".repeat(60));
    println!(
        "{}/{} records posted, {} with non-passing outcomes, {} update calls",
        summary.posted, summary.attempted, summary.test_failures, summary.update_calls
    );
    if summary.not_executed > 0 {
        println!(
            "{} result(s) without a local record marked NotExecuted",
            summary.not_executed
        );
    }
    if summary.all_posted() {
        println!("{} all records posted", green.apply_to("[OK]"));
    } else {
        for failure in &summary.failures {
            println!(
                "{} {} {}",
                red.apply_to("[FAIL]"),
                failure.test_case_id,
                dim.apply_to(&failure.reason)
            );
        }
    }
    println!("{}", "-".repeat(60));
    println!();
}
