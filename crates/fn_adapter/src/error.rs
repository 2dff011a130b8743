use thiserror::Error;

/// Failures of the network transport itself.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdapterError {
    #[error("http: {0}")]
    Http(String),

    #[error("timeout of {timeout_ms}ms exceeded")]
    Timeout { timeout_ms: u64 },

    #[error("maxContentLength size of {max} exceeded")]
    ResponseTooLarge { max: usize },

    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),
}

impl AdapterError {
    /// Error name surfaced to the script.
    pub fn name(&self) -> &'static str {
        match self {
            AdapterError::Http(_) => "HttpError",
            AdapterError::Timeout { .. } => "TimeoutError",
            AdapterError::ResponseTooLarge { .. } => "ResponseTooLarge",
            AdapterError::UnsupportedMethod(_) => "UnsupportedMethod",
        }
    }
}

/// Rejections decided by the gate before or instead of dispatching.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GateError {
    #[error("HTTP request timeout >{max_ms}")]
    TimeoutTooLarge { timeout_ms: u64, max_ms: u64 },

    #[error("HTTP request URL length >{max}")]
    UrlTooLong { len: usize, max: usize },

    #[error("exceeded numAllowedQueries")]
    QuotaExceeded { quota: u32 },

    #[error("HTTP request body length >{max}")]
    BodyTooLarge { len: usize, max: usize },

    #[error("invalid HTTP request: {0}")]
    InvalidRequest(String),

    #[error("run was abandoned by the host")]
    Aborted,
}

impl GateError {
    /// Error name surfaced to the script.
    pub fn name(&self) -> &'static str {
        match self {
            GateError::TimeoutTooLarge { .. } => "TimeoutTooLarge",
            GateError::UrlTooLong { .. } => "UrlTooLong",
            GateError::QuotaExceeded { .. } => "QuotaExceeded",
            GateError::BodyTooLarge { .. } => "BodyTooLarge",
            GateError::InvalidRequest(_) => "InvalidRequest",
            GateError::Aborted => "RunAborted",
        }
    }
}

pub type Result<T> = std::result::Result<T, AdapterError>;
