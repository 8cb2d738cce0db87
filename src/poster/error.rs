use thiserror::Error;

/// Errors talking to the Azure DevOps REST API.
#[derive(Debug, Error)]
pub enum AdoError {
    #[error("cannot reach {url}: {message}")]
    Connection { url: String, message: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("authentication rejected (HTTP {status}) by {url}; check the access token")]
    Unauthorized { url: String, status: u16 },

    #[error("{url} not found")]
    NotFound { url: String },

    #[error("unexpected HTTP {status} from {url}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("invalid response from {url}: {message}")]
    InvalidResponse { url: String, message: String },

    #[error("{kind} '{name}' not found")]
    Missing { kind: &'static str, name: String },

    #[error("invalid request URL: {0}")]
    InvalidUrl(String),
}

impl AdoError {
    /// Errors that make every further call pointless: the service is unreachable
    /// or rejects our credentials.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AdoError::Connection { .. } | AdoError::Unauthorized { .. } | AdoError::InvalidUrl(_)
        )
    }
}

/// Why a single test result record could not be posted.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("malformed record: {0}")]
    Malformed(String),

    #[error("test case id '{0}' is not an integer")]
    InvalidId(String),

    #[error("record key '{key}' does not match its testCaseId '{field}'")]
    IdMismatch { key: String, field: String },

    #[error("unrecognized outcome '{0}'")]
    UnknownOutcome(String),

    #[error("test case {0} is not part of the test run")]
    NotInRun(u64),

    #[error("test case {0} appears more than once in the results file")]
    Duplicate(u64),

    #[error(transparent)]
    Remote(#[from] AdoError),

    #[error("{} update call(s) failed: {}", .0.len(), join(.0))]
    Partial(Vec<AdoError>),
}

impl RecordError {
    pub fn is_fatal(&self) -> bool {
        match self {
            RecordError::Remote(e) => e.is_fatal(),
            RecordError::Partial(errors) => errors.iter().any(AdoError::is_fatal),
            _ => false,
        }
    }
}

fn join(errors: &[AdoError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
