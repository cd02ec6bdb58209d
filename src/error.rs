//! Error types for each pipeline stage.
//!
//! Only failures that end a stage are errors. Item-level parse problems,
//! unclassified topics, unresolved securities and missing price data are
//! reported as data (events and typed outcomes) instead.

use thiserror::Error;

/// Failure of a single transport call.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("webdriver error: {0}")]
    WebDriver(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Request(e.to_string())
        }
    }
}

/// Failure of the source fetcher after all attempts were used.
///
/// The variant describes the last attempt, so callers can tell a network
/// problem apart from a response that looked like an anti-bot page.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("no source endpoints configured")]
    NoEndpoints,

    #[error("network error after {attempts} attempts (last endpoint {endpoint}): {message}")]
    Transport {
        attempts: u32,
        endpoint: String,
        message: String,
    },

    #[error("HTTP {status} after {attempts} attempts (last endpoint {endpoint})")]
    HttpStatus {
        attempts: u32,
        endpoint: String,
        status: u16,
    },

    #[error("blocked or empty response ({bytes} bytes) after {attempts} attempts (last endpoint {endpoint})")]
    Blocked {
        attempts: u32,
        endpoint: String,
        bytes: usize,
    },
}

impl FetchError {
    /// Stable reason code for logs and reports.
    pub fn reason(&self) -> &'static str {
        match self {
            FetchError::NoEndpoints => "no_endpoints",
            FetchError::Transport { .. } => "transport",
            FetchError::HttpStatus { .. } => "http_status",
            FetchError::Blocked { .. } => "blocked",
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            FetchError::NoEndpoints => 0,
            FetchError::Transport { attempts, .. }
            | FetchError::HttpStatus { attempts, .. }
            | FetchError::Blocked { attempts, .. } => *attempts,
        }
    }
}

/// Why one matched item was dropped during extraction. Never propagated.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ItemError {
    #[error("no title element")]
    MissingTitle,

    #[error("title is empty after trimming")]
    EmptyTitle,

    #[error("malformed entry: {0}")]
    Malformed(String),
}

/// Failure talking to a price-data provider.
#[derive(Error, Debug)]
pub enum PriceError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} for {symbol}")]
    Status { symbol: String, status: u16 },

    #[error("could not decode price data: {0}")]
    Decode(String),

    #[error("fixture error: {0}")]
    Fixture(String),
}

/// Per-topic analysis failure. Never ends the run.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("analysis window of -{days_before}/+{days_after} days does not fit around {timestamp}")]
    WindowOutOfRange {
        timestamp: chrono::NaiveDateTime,
        days_before: u32,
        days_after: u32,
    },
}

/// Run-level failure: nothing usable came out of fetch or extraction.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("no trending items could be extracted from {endpoint}")]
    EmptyExtraction { endpoint: String, attempts: u32 },
}

impl PipelineError {
    pub fn reason(&self) -> &'static str {
        match self {
            PipelineError::Fetch(e) => e.reason(),
            PipelineError::EmptyExtraction { .. } => "empty_extraction",
        }
    }

    /// Fetch attempts spent before the run gave up.
    pub fn attempts(&self) -> u32 {
        match self {
            PipelineError::Fetch(e) => e.attempts(),
            PipelineError::EmptyExtraction { attempts, .. } => *attempts,
        }
    }
}

/// Failure loading configuration or reference data.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
