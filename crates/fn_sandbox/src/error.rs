use fn_adapter::RequestLogEntry;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Value outside the encodable domain of `function`.
    #[error("{function} invalid input")]
    InvalidInput { function: &'static str },
}

/// Terminal failure of one sandboxed execution.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum SandboxError {
    /// The script did not parse. Nothing ran and no quota was used.
    #[error("{name}: {message}")]
    #[serde(rename = "CompileError")]
    Compile {
        name: String,
        message: String,
        details: String,
    },

    /// The script threw (or never settled). Carries the calls it attempted.
    #[error("{name}: {message}")]
    #[serde(rename = "RuntimeError")]
    Runtime {
        name: String,
        message: String,
        details: String,
        #[serde(rename = "requestLog")]
        request_log: Vec<RequestLogEntry>,
    },
}

impl SandboxError {
    pub fn runtime(name: impl Into<String>, message: impl Into<String>) -> Self {
        let (name, message) = (name.into(), message.into());
        SandboxError::Runtime {
            details: format!("{name}: {message}"),
            name,
            message,
            request_log: Vec::new(),
        }
    }

    /// Host watchdog expiry; reported like any other runtime failure.
    pub fn timeout(limit_ms: u128) -> Self {
        Self::runtime("TimeoutError", format!("script exceeded {limit_ms}ms"))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SandboxError::Compile { .. } => "CompileError",
            SandboxError::Runtime { .. } => "RuntimeError",
        }
    }

    pub fn name(&self) -> &str {
        match self {
            SandboxError::Compile { name, .. } | SandboxError::Runtime { name, .. } => name,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            SandboxError::Compile { message, .. } | SandboxError::Runtime { message, .. } => message,
        }
    }

    pub fn details(&self) -> &str {
        match self {
            SandboxError::Compile { details, .. } | SandboxError::Runtime { details, .. } => details,
        }
    }

    pub fn request_log(&self) -> Option<&[RequestLogEntry]> {
        match self {
            SandboxError::Compile { .. } => None,
            SandboxError::Runtime { request_log, .. } => Some(request_log),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_error_serializes_with_request_log() {
        let err = SandboxError::runtime("TypeError", "x is undefined");
        let v = serde_json::to_value(&err).unwrap();
        assert_eq!(v["kind"], "RuntimeError");
        assert_eq!(v["name"], "TypeError");
        assert!(v["requestLog"].as_array().unwrap().is_empty());
    }

    #[test]
    fn compile_error_has_no_request_log() {
        let err = SandboxError::Compile {
            name: "SyntaxError".into(),
            message: "unexpected token".into(),
            details: "SyntaxError: unexpected token".into(),
        };
        assert!(err.request_log().is_none());
        assert_eq!(err.to_string(), "SyntaxError: unexpected token");
    }
}
