use crate::error::{AdapterError, GateError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

/// An HTTP request as described by a script.
///
/// Field names follow what scripts already pass (`data`, `timeout`,
/// `responseType`), so the JSON form of a script's request object
/// deserializes directly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpCallSpec {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Query parameters, appended to the URL. Scalar values are stringified.
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
    #[serde(default, alias = "data")]
    pub body: Option<Value>,
    #[serde(default = "default_timeout", alias = "timeout")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub response_type: ResponseType,
}

fn default_method() -> String {
    "get".into()
}
fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl HttpCallSpec {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: default_method(),
            headers: BTreeMap::new(),
            params: BTreeMap::new(),
            body: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            response_type: ResponseType::Json,
        }
    }

    /// Serialized request body: strings are sent verbatim, anything else as JSON.
    pub fn body_bytes(&self) -> Option<Vec<u8>> {
        match &self.body {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.as_bytes().to_vec()),
            Some(other) => Some(other.to_string().into_bytes()),
        }
    }

    /// Full URL with `params` merged into the query string.
    pub fn resolved_url(&self) -> std::result::Result<url::Url, GateError> {
        let mut url = url::Url::parse(&self.url)
            .map_err(|e| GateError::InvalidRequest(format!("url: {e}")))?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(GateError::InvalidRequest(format!(
                    "unsupported protocol {other}:"
                )))
            }
        }
        if !self.params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &self.params {
                pairs.append_pair(k, &scalar_to_string(v));
            }
        }
        Ok(url)
    }
}

fn scalar_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    #[default]
    Json,
    Text,
    Arraybuffer,
}

/// A request that passed every gate check and is ready for the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    /// Upper-cased HTTP method.
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Vec<u8>>,
    pub timeout: Duration,
    pub max_response_bytes: usize,
}

/// What the transport hands back. Never shown to scripts as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

/// The network boundary. Implementations must honor `timeout` and stop
/// reading once `max_response_bytes` is exceeded.
pub trait HttpTransport: Send + Sync {
    fn send(&self, request: &PreparedRequest) -> Result<RawResponse>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseData {
    Json(Value),
    Text(String),
    Bytes(Vec<u8>),
}

impl ResponseData {
    /// Decode a body the way the script asked for it. A `json` body that does
    /// not parse is handed back as text.
    pub fn decode(body: &[u8], response_type: ResponseType) -> Self {
        match response_type {
            ResponseType::Arraybuffer => ResponseData::Bytes(body.to_vec()),
            ResponseType::Text => ResponseData::Text(String::from_utf8_lossy(body).into_owned()),
            ResponseType::Json => match serde_json::from_slice(body) {
                Ok(v) => ResponseData::Json(v),
                Err(_) => ResponseData::Text(String::from_utf8_lossy(body).into_owned()),
            },
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ResponseData::Json(v) => v.clone(),
            ResponseData::Text(s) => Value::String(s.clone()),
            ResponseData::Bytes(b) => Value::Array(b.iter().map(|x| json!(x)).collect()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub data: ResponseData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpFailure {
    pub name: String,
    pub message: String,
    pub status: Option<u16>,
}

/// Result of one gated call, as seen by the script.
#[derive(Debug, Clone, PartialEq)]
pub enum HttpCallOutcome {
    Ok(HttpResponse),
    Err(HttpFailure),
}

impl HttpCallOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, HttpCallOutcome::Ok(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            HttpCallOutcome::Ok(r) => Some(r.status),
            HttpCallOutcome::Err(f) => f.status,
        }
    }

    /// Name of the failure, if any.
    pub fn error_name(&self) -> Option<&str> {
        match self {
            HttpCallOutcome::Ok(_) => None,
            HttpCallOutcome::Err(f) => Some(&f.name),
        }
    }

    /// Script-facing object. Only status, headers and body (or error name,
    /// message and status) are present.
    pub fn to_json(&self) -> Value {
        match self {
            HttpCallOutcome::Ok(r) => json!({
                "error": false,
                "status": r.status,
                "headers": r.headers,
                "data": r.data.to_json(),
            }),
            HttpCallOutcome::Err(f) => {
                let mut v = json!({
                    "error": true,
                    "name": f.name,
                    "message": f.message,
                });
                if let Some(status) = f.status {
                    v["status"] = json!(status);
                    v["response"] = json!({ "status": status });
                }
                v
            }
        }
    }
}

impl From<GateError> for HttpCallOutcome {
    fn from(e: GateError) -> Self {
        HttpCallOutcome::Err(HttpFailure {
            name: e.name().into(),
            message: e.to_string(),
            status: None,
        })
    }
}

impl From<AdapterError> for HttpCallOutcome {
    fn from(e: AdapterError) -> Self {
        HttpCallOutcome::Err(HttpFailure {
            name: e.name().into(),
            message: e.to_string(),
            status: None,
        })
    }
}

/// One line of the audit trail of what a script attempted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestLogEntry {
    pub url: String,
    pub method: String,
    /// Whether the call counted against the quota.
    pub dispatched: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
