//! Local test result records and the remote outcome vocabulary.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use super::error::RecordError;

/// Top-level shape of the results JSON handed to the poster.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsFile {
    pub test_plan_name: String,
    pub test_suite_name: String,
    /// Keyed by test case id, in file order. Records stay raw so one bad
    /// record cannot fail the whole file.
    pub test_results: serde_json::Map<String, serde_json::Value>,
}

pub fn load_results_file(path: &Path) -> Result<ResultsFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Test results file not found: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse test results JSON: {}", path.display()))
}

/// A test case id is usually a string-encoded integer, sometimes a bare number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CaseId {
    Text(String),
    Number(u64),
}

impl CaseId {
    pub fn as_text(&self) -> String {
        match self {
            CaseId::Text(s) => s.trim().to_string(),
            CaseId::Number(n) => n.to_string(),
        }
    }

    pub fn parse(&self) -> Option<u64> {
        match self {
            CaseId::Text(s) => s.trim().parse().ok(),
            CaseId::Number(n) => Some(*n),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResultRecord {
    #[serde(default)]
    pub test_case_id: Option<CaseId>,
    pub outcome: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub duration_in_ms: u64,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub iteration_details: Vec<IterationDetail>,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub failure_type: Option<String>,
}

/// One attempt of a retried test.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationDetail {
    pub id: u32,
    pub outcome: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub duration_in_ms: u64,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Outcome values understood by Azure DevOps test results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Outcome {
    Passed,
    Failed,
    Blocked,
    NotExecuted,
    Inconclusive,
    Timeout,
    Aborted,
    Warning,
    Error,
    NotApplicable,
    Paused,
    InProgress,
    NotImpacted,
}

impl FromStr for Outcome {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .collect::<String>()
            .to_lowercase();
        let outcome = match normalized.as_str() {
            "passed" | "pass" => Outcome::Passed,
            "failed" | "fail" => Outcome::Failed,
            "blocked" => Outcome::Blocked,
            "notexecuted" | "skipped" | "skip" => Outcome::NotExecuted,
            "inconclusive" => Outcome::Inconclusive,
            "timeout" => Outcome::Timeout,
            "aborted" => Outcome::Aborted,
            "warning" => Outcome::Warning,
            "error" => Outcome::Error,
            "notapplicable" => Outcome::NotApplicable,
            "paused" => Outcome::Paused,
            "inprogress" => Outcome::InProgress,
            "notimpacted" => Outcome::NotImpacted,
            _ => return Err(RecordError::UnknownOutcome(s.to_string())),
        };
        Ok(outcome)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// A record that passed validation and is ready to be posted.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRecord {
    pub test_case_id: u64,
    pub outcome: Outcome,
    pub comment: String,
    pub duration_in_ms: u64,
    pub error_message: String,
    pub priority: i32,
    pub failure_type: Option<String>,
    pub iterations: Vec<PreparedIteration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreparedIteration {
    pub id: u32,
    pub outcome: Outcome,
    pub comment: String,
    pub duration_in_ms: u64,
    pub error_message: String,
}

const DEFAULT_PRIORITY: i32 = 2;
const DEFAULT_FAILURE_TYPE: &str = "New Issue";

/// Decode and validate one entry of `testResults`.
///
/// The top-level `outcome` and `durationInMs` are authoritative; iterations are
/// carried along unchanged and never used to recompute them.
pub fn prepare_record(key: &str, value: &serde_json::Value) -> Result<PreparedRecord, RecordError> {
    let record: TestResultRecord = serde_json::from_value(value.clone())
        .map_err(|e| RecordError::Malformed(e.to_string()))?;

    let key_id: u64 = key
        .trim()
        .parse()
        .map_err(|_| RecordError::InvalidId(key.to_string()))?;
    if let Some(field) = &record.test_case_id {
        match field.parse() {
            Some(id) if id == key_id => {}
            Some(_) => {
                return Err(RecordError::IdMismatch {
                    key: key.to_string(),
                    field: field.as_text(),
                });
            }
            None => return Err(RecordError::InvalidId(field.as_text())),
        }
    }

    let outcome: Outcome = record.outcome.parse()?;
    let iterations = record
        .iteration_details
        .iter()
        .map(|it| {
            Ok(PreparedIteration {
                id: it.id,
                outcome: it.outcome.parse()?,
                comment: it.comment.clone().unwrap_or_default(),
                duration_in_ms: it.duration_in_ms,
                error_message: it.error_message.clone().unwrap_or_default(),
            })
        })
        .collect::<Result<Vec<_>, RecordError>>()?;

    let failure_type = match (outcome, record.failure_type) {
        (Outcome::Passed, _) => None,
        (_, Some(ft)) => Some(ft),
        (_, None) => Some(DEFAULT_FAILURE_TYPE.to_string()),
    };

    Ok(PreparedRecord {
        test_case_id: key_id,
        outcome,
        comment: record.comment.unwrap_or_default(),
        duration_in_ms: record.duration_in_ms,
        error_message: record.error_message.unwrap_or_default(),
        priority: record.priority.unwrap_or(DEFAULT_PRIORITY),
        failure_type,
        iterations,
    })
}
