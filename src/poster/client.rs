//! Minimal Azure DevOps Test Plans client: just the calls needed to open a
//! test run, update its results and close it.

use std::time::Duration;

use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};
use url::Url;

use super::error::AdoError;
use super::model::{CaseId, Outcome, PreparedIteration, PreparedRecord};

const API_VERSION: &str = "7.1";
const CONTINUATION_HEADER: &str = "x-ms-continuationtoken";
const MAX_BODY_IN_ERROR: usize = 500;

const TEST_PLANS_PATH: &str = "/_apis/testplan/plans";
const RUNS_PATH: &str = "/_apis/test/runs";

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    value: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Named {
    id: i64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct IdOnly {
    id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunResultWire {
    id: i64,
    #[serde(default)]
    test_case: Option<TestCaseRef>,
}

#[derive(Debug, Deserialize)]
struct TestCaseRef {
    id: CaseId,
}

/// A result slot in a test run, created by the service for each test point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub id: i64,
    pub test_case_id: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationPayload {
    pub id: u32,
    pub outcome: Outcome,
    pub comment: String,
    pub duration_in_ms: u64,
    pub error_message: String,
}

impl From<&PreparedIteration> for IterationPayload {
    fn from(it: &PreparedIteration) -> Self {
        Self {
            id: it.id,
            outcome: it.outcome,
            comment: it.comment.clone(),
            duration_in_ms: it.duration_in_ms,
            error_message: it.error_message.clone(),
        }
    }
}

/// One element of a results PATCH body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultUpdate {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_in_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_type: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub iteration_details: Vec<IterationPayload>,
}

impl ResultUpdate {
    /// The aggregate update for a record, optionally carrying its iterations inline.
    pub fn aggregate(result_id: i64, record: &PreparedRecord, with_iterations: bool) -> Self {
        Self {
            id: result_id,
            state: Some("Completed"),
            outcome: Some(record.outcome),
            duration_in_ms: Some(record.duration_in_ms),
            comment: Some(record.comment.clone()),
            error_message: Some(record.error_message.clone()),
            priority: Some(record.priority),
            failure_type: record.failure_type.clone(),
            iteration_details: if with_iterations {
                record.iterations.iter().map(IterationPayload::from).collect()
            } else {
                Vec::new()
            },
        }
    }

    /// An update that only attaches one iteration to an existing result.
    pub fn iteration(result_id: i64, iteration: &PreparedIteration) -> Self {
        Self {
            id: result_id,
            state: None,
            outcome: None,
            duration_in_ms: None,
            comment: None,
            error_message: None,
            priority: None,
            failure_type: None,
            iteration_details: vec![IterationPayload::from(iteration)],
        }
    }

    /// Closes a result slot that has no local record.
    pub fn not_executed(result_id: i64) -> Self {
        Self {
            id: result_id,
            state: Some("Completed"),
            outcome: Some(Outcome::NotExecuted),
            duration_in_ms: None,
            comment: None,
            error_message: None,
            priority: None,
            failure_type: None,
            iteration_details: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Completed,
    NeedsInvestigation,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Completed => write!(f, "Completed"),
            RunState::NeedsInvestigation => write!(f, "NeedsInvestigation"),
        }
    }
}

#[derive(Clone)]
pub struct AzureDevOpsClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl std::fmt::Debug for AzureDevOpsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureDevOpsClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl AzureDevOpsClient {
    pub fn new(org_url: &str, project: &str, token: &str, timeout: Duration) -> Result<Self, AdoError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pipeline-actions/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AdoError::Connection {
                url: org_url.to_string(),
                message: format!("failed to create HTTP client: {e}"),
            })?;

        let base_url = format!(
            "{}/{}",
            org_url.trim_end_matches('/'),
            project.trim_matches('/')
        );
        Url::parse(&base_url).map_err(|e| AdoError::InvalidUrl(format!("{base_url}: {e}")))?;

        Ok(Self {
            http,
            base_url,
            token: token.to_string(),
        })
    }

    pub async fn test_plan_id(&self, plan_name: &str) -> Result<i64, AdoError> {
        let plans: Vec<Named> = self.get_all(TEST_PLANS_PATH).await?;
        find_by_name(plans, "test plan", plan_name)
    }

    pub async fn test_suite_id(&self, plan_id: i64, suite_name: &str) -> Result<i64, AdoError> {
        let path = format!("{TEST_PLANS_PATH}/{plan_id}/suites");
        let suites: Vec<Named> = self.get_all(&path).await?;
        find_by_name(suites, "test suite", suite_name)
    }

    pub async fn test_point_ids(&self, plan_id: i64, suite_id: i64) -> Result<Vec<i64>, AdoError> {
        let path = format!("/_apis/test/Plans/{plan_id}/Suites/{suite_id}/points");
        let points: Vec<IdOnly> = self.get_all(&path).await?;
        Ok(points.into_iter().map(|p| p.id).collect())
    }

    /// Open an automated run over `point_ids`. Returns the run id.
    pub async fn create_test_run(
        &self,
        plan_name: &str,
        suite_name: &str,
        plan_id: i64,
        point_ids: &[i64],
    ) -> Result<i64, AdoError> {
        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
        let body = json!({
            "name": format!("Automation Test Run - {suite_name}"),
            "plan": { "id": plan_id },
            "pointIds": point_ids,
            "automated": true,
            "comment": format!(
                "Automation Test Run Execution:\n- TestPlanName : {plan_name}\n- TestSuiteName : {suite_name}\n- Timestamp : {timestamp}"
            ),
        });
        let url = self.url(RUNS_PATH, &[])?;
        let response = self.send(Method::POST, url.clone(), Some(&body)).await?;
        let run: IdOnly = decode(url.as_str(), response).await?;
        info!(run_id = run.id, "test run created");
        Ok(run.id)
    }

    pub async fn run_results(&self, run_id: i64) -> Result<Vec<RunResult>, AdoError> {
        let path = format!("{RUNS_PATH}/{run_id}/results");
        let wire: Vec<RunResultWire> = self.get_all(&path).await?;
        Ok(wire
            .into_iter()
            .map(|r| RunResult {
                id: r.id,
                test_case_id: r.test_case.and_then(|tc| tc.id.parse()),
            })
            .collect())
    }

    pub async fn update_results(&self, run_id: i64, updates: &[ResultUpdate]) -> Result<(), AdoError> {
        let body = serde_json::to_value(updates).map_err(|e| AdoError::InvalidResponse {
            url: self.base_url.clone(),
            message: format!("failed to encode result update: {e}"),
        })?;
        let url = self.url(&format!("{RUNS_PATH}/{run_id}/results"), &[])?;
        self.send(Method::PATCH, url, Some(&body)).await?;
        Ok(())
    }

    pub async fn complete_run(&self, run_id: i64, state: RunState) -> Result<(), AdoError> {
        let body = json!({
            "state": state,
            "completedDate": chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        });
        let url = self.url(&format!("{RUNS_PATH}/{run_id}"), &[])?;
        self.send(Method::PATCH, url, Some(&body)).await?;
        info!(run_id, %state, "test run closed");
        Ok(())
    }

    /// GET a list endpoint, following continuation tokens until exhausted.
    async fn get_all<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, AdoError> {
        let mut items = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let url = match continuation.as_deref() {
                Some(token) => self.url(path, &[("continuationToken", token)])?,
                None => self.url(path, &[])?,
            };
            let response = self.send(Method::GET, url.clone(), None).await?;
            let next = response
                .headers()
                .get(CONTINUATION_HEADER)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(str::to_string);
            let page: ListResponse<T> = decode(url.as_str(), response).await?;
            items.extend(page.value);
            match next {
                Some(token) if continuation.as_deref() != Some(token.as_str()) => {
                    continuation = Some(token)
                }
                _ => break,
            }
        }
        Ok(items)
    }

    fn url(&self, path: &str, extra: &[(&str, &str)]) -> Result<Url, AdoError> {
        let raw = format!("{}{}", self.base_url, path);
        let mut url = Url::parse(&raw).map_err(|e| AdoError::InvalidUrl(format!("{raw}: {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("api-version", API_VERSION);
            for (k, v) in extra {
                query.append_pair(k, v);
            }
        }
        Ok(url)
    }

    /// Send one request and map transport and status failures onto `AdoError`.
    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&serde_json::Value>,
    ) -> Result<Response, AdoError> {
        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .basic_auth("", Some(&self.token));
        if let Some(body) = body {
            debug!(%method, %url, body = %body, "request body");
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AdoError::Timeout { url: url.to_string() }
            } else {
                AdoError::Connection {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        info!("{} {} -> {}", method, url, status.as_u16());

        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        debug!(%url, body = %text, "error response body");
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AdoError::Unauthorized {
                url: url.to_string(),
                status: status.as_u16(),
            },
            StatusCode::NOT_FOUND => AdoError::NotFound { url: url.to_string() },
            _ => AdoError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body: truncate(&text, MAX_BODY_IN_ERROR),
            },
        })
    }
}

async fn decode<T: DeserializeOwned>(url: &str, response: Response) -> Result<T, AdoError> {
    let text = response.text().await.map_err(|e| AdoError::InvalidResponse {
        url: url.to_string(),
        message: e.to_string(),
    })?;
    debug!(%url, body = %text, "response body");
    serde_json::from_str(&text).map_err(|e| AdoError::InvalidResponse {
        url: url.to_string(),
        message: e.to_string(),
    })
}

fn find_by_name(items: Vec<Named>, kind: &'static str, name: &str) -> Result<i64, AdoError> {
    items
        .into_iter()
        .find(|item| item.name == name)
        .map(|item| item.id)
        .ok_or_else(|| AdoError::Missing {
            kind,
            name: name.to_string(),
        })
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let cut: String = s.chars().take(max_chars).collect();
    format!("{cut}...")
}
