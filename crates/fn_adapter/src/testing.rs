//! In-memory transport for tests and offline simulation.

use crate::error::{AdapterError, Result};
use crate::types::{HttpTransport, PreparedRequest, RawResponse};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Answers every request with a canned response (or error), optionally
/// overridden per URL prefix, and records what it was asked to send.
pub struct StaticTransport {
    default: Result<RawResponse>,
    routes: Vec<(String, RawResponse)>,
    sent: Mutex<Vec<PreparedRequest>>,
}

impl StaticTransport {
    pub fn new(response: RawResponse) -> Self {
        Self {
            default: Ok(response),
            routes: Vec::new(),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn json(status: u16, body: serde_json::Value) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".into(), "application/json".into());
        Self::new(RawResponse {
            status,
            headers,
            body: body.to_string().into_bytes(),
        })
    }

    pub fn failing(err: AdapterError) -> Self {
        Self {
            default: Err(err),
            routes: Vec::new(),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Serve `body` for every URL starting with `prefix`.
    pub fn route(mut self, prefix: impl Into<String>, status: u16, body: &[u8]) -> Self {
        self.routes.push((
            prefix.into(),
            RawResponse {
                status,
                headers: BTreeMap::new(),
                body: body.to_vec(),
            },
        ));
        self
    }

    /// Requests that reached the transport, in order.
    pub fn requests(&self) -> Vec<PreparedRequest> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl HttpTransport for StaticTransport {
    fn send(&self, request: &PreparedRequest) -> Result<RawResponse> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(request.clone());
        }
        let response = self
            .routes
            .iter()
            .find(|(prefix, _)| request.url.starts_with(prefix.as_str()))
            .map(|(_, r)| Ok(r.clone()))
            .unwrap_or_else(|| self.default.clone())?;
        if response.body.len() > request.max_response_bytes {
            return Err(AdapterError::ResponseTooLarge {
                max: request.max_response_bytes,
            });
        }
        Ok(response)
    }
}
