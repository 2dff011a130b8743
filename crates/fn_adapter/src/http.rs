//! Blocking reqwest transport, the only place where gated requests touch
//! the network. Runs on the sandbox worker thread, outside any async context.

use crate::error::{AdapterError, Result};
use crate::types::{HttpTransport, PreparedRequest, RawResponse};
use std::collections::BTreeMap;
use std::io::Read;

pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .no_proxy()
            .build()
            .map_err(|e| AdapterError::Http(e.to_string()))?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: &PreparedRequest) -> Result<RawResponse> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| AdapterError::UnsupportedMethod(request.method.clone()))?;

        let mut req = self
            .client
            .request(method, &request.url)
            .timeout(request.timeout);
        for (k, v) in &request.headers {
            req = req.header(k.as_str(), v.as_str());
        }
        if let Some(body) = &request.body {
            req = req.body(body.clone());
        }

        let resp = req.send().map_err(|e| map_err(e, request))?;
        let status = resp.status().as_u16();

        let mut headers = BTreeMap::new();
        for (k, v) in resp.headers() {
            if let Ok(val) = v.to_str() {
                headers.insert(k.to_string(), val.to_string());
            }
        }

        // Read at most one byte past the cap so oversize bodies are detected
        // without buffering them.
        let max = request.max_response_bytes;
        let mut body = Vec::new();
        resp.take(max as u64 + 1)
            .read_to_end(&mut body)
            .map_err(|e| AdapterError::Http(e.to_string()))?;
        if body.len() > max {
            return Err(AdapterError::ResponseTooLarge { max });
        }

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

fn map_err(e: reqwest::Error, request: &PreparedRequest) -> AdapterError {
    if e.is_timeout() {
        AdapterError::Timeout {
            timeout_ms: request.timeout.as_millis() as u64,
        }
    } else {
        // Drop the source chain: it can name resolvers and local addresses.
        AdapterError::Http(if e.is_connect() {
            "connection failed".into()
        } else {
            "request failed".into()
        })
    }
}
