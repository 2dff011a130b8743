//! Caller input and script output checks around a run.

use crate::runner::ExecutionRequest;
use crate::value::ScriptValue;
use fn_config::SandboxSettings;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct InputError(pub String);

fn fail<T>(msg: impl Into<String>) -> Result<T, InputError> {
    Err(InputError(msg.into()))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedInput {
    pub request: ExecutionRequest,
    pub max_response_bytes: usize,
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validator {
    pub default_max_response_bytes: usize,
    pub default_max_http_queries: u32,
}

impl Default for Validator {
    fn default() -> Self {
        Self::from_settings(&SandboxSettings::default())
    }
}

fn positive_integer(v: &Value) -> Option<u64> {
    v.as_u64().or_else(|| {
        v.as_f64()
            .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= u64::MAX as f64)
            .map(|f| f as u64)
    })
}

/// Absent, `null`, `0`, `false` and `""` all count as "not given".
fn given(v: Option<&Value>) -> Option<&Value> {
    v.filter(|v| match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::String(s) => !s.is_empty(),
        _ => true,
    })
}

impl Validator {
    pub fn from_settings(settings: &SandboxSettings) -> Self {
        Self {
            default_max_response_bytes: settings.default_max_response_bytes,
            default_max_http_queries: settings.default_max_http_queries,
        }
    }

    pub fn validate_input(&self, input: &Value) -> Result<ValidatedInput, InputError> {
        let source = match input.get("source") {
            Some(Value::String(s)) => s.clone(),
            _ => return fail("source param is missing"),
        };

        let request_id = match given(input.get("requestId")) {
            None => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(_) => return fail("requestId param not a string or number"),
        };

        let request_quota = match given(input.get("numAllowedQueries")) {
            None => self.default_max_http_queries,
            Some(v) => match positive_integer(v).and_then(|n| u32::try_from(n).ok()) {
                Some(n) => n,
                None => return fail("numAllowedQueries not integer"),
            },
        };

        let arguments = match given(input.get("args")) {
            None => Vec::new(),
            Some(Value::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::String(s) => out.push(s.clone()),
                        _ => return fail("args param not a string array"),
                    }
                }
                out
            }
            Some(_) => return fail("args param not an array"),
        };

        let secrets = match given(input.get("secrets")) {
            None => None,
            Some(Value::Object(map)) => {
                let mut out = BTreeMap::new();
                for (k, v) in map {
                    match v {
                        Value::String(s) => out.insert(k.clone(), s.clone()),
                        _ => return fail("secrets param not a string map"),
                    };
                }
                Some(out)
            }
            Some(_) => return fail("secrets param not a string map"),
        };

        let max_response_bytes = match given(input.get("maxResponseBytes")) {
            None => self.default_max_response_bytes,
            Some(v) => match positive_integer(v).and_then(|n| usize::try_from(n).ok()) {
                Some(n) => n,
                None => return fail("maxResponseBytes not integer"),
            },
        };

        Ok(ValidatedInput {
            request: ExecutionRequest {
                script_source: source,
                arguments,
                secrets,
                request_quota,
            },
            max_response_bytes,
            request_id,
        })
    }

    /// The script must return bytes no longer than `max_response_bytes`.
    pub fn valid_output<'a>(
        &self,
        result: &'a ScriptValue,
        max_response_bytes: usize,
    ) -> Result<&'a [u8], InputError> {
        match result.as_bytes() {
            Some(b) if b.len() <= max_response_bytes => Ok(b),
            Some(_) => fail(format!("returned Buffer >{max_response_bytes} bytes")),
            None => fail("returned value not a Buffer"),
        }
    }
}

/// `0x`-prefixed lowercase hex; an empty result is `0x0`.
pub fn encode_response(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        "0x0".into()
    } else {
        format!("0x{}", hex::encode(bytes))
    }
}
