//! Per-execution request gate.
//!
//! Check order for every call:
//! 1. abort signal (an abandoned run dispatches nothing)
//! 2. timeout cap and URL length (rejected calls do not consume quota)
//! 3. quota (`remaining > 0`)
//! 4. count the call, then request body cap, then dispatch
//!
//! `used <= quota` holds at all times.

use crate::abort::AbortSignal;
use crate::error::GateError;
use crate::types::{
    HttpCallOutcome, HttpCallSpec, HttpFailure, HttpResponse, HttpTransport, PreparedRequest,
    RequestLogEntry, ResponseData,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Hard caps applied to every gated call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateLimits {
    pub max_url_len: usize,
    pub max_timeout_ms: u64,
    pub max_request_body_bytes: usize,
    pub max_response_bytes: usize,
}

impl Default for GateLimits {
    fn default() -> Self {
        Self {
            max_url_len: 2048,
            max_timeout_ms: 9000,
            max_request_body_bytes: 2000,
            max_response_bytes: 2_000_000,
        }
    }
}

/// Quota-bound capability handed to one script execution. Not `Clone`:
/// a gate belongs to exactly one run.
pub struct RequestGate {
    quota: u32,
    used: u32,
    limits: GateLimits,
    transport: Arc<dyn HttpTransport>,
    abort: AbortSignal,
    log: Vec<RequestLogEntry>,
}

impl RequestGate {
    pub fn new(quota: u32, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            quota,
            used: 0,
            limits: GateLimits::default(),
            transport,
            abort: AbortSignal::default(),
            log: Vec::new(),
        }
    }

    pub fn with_limits(mut self, limits: GateLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_abort(mut self, abort: AbortSignal) -> Self {
        self.abort = abort;
        self
    }

    pub fn quota(&self) -> u32 {
        self.quota
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn remaining(&self) -> u32 {
        self.quota.saturating_sub(self.used)
    }

    pub fn limits(&self) -> &GateLimits {
        &self.limits
    }

    pub fn request_log(&self) -> &[RequestLogEntry] {
        &self.log
    }

    pub fn into_request_log(self) -> Vec<RequestLogEntry> {
        self.log
    }

    fn preflight(&self, spec: &HttpCallSpec) -> Result<(), GateError> {
        if spec.timeout_ms > self.limits.max_timeout_ms {
            return Err(GateError::TimeoutTooLarge {
                timeout_ms: spec.timeout_ms,
                max_ms: self.limits.max_timeout_ms,
            });
        }
        if spec.url.len() > self.limits.max_url_len {
            return Err(GateError::UrlTooLong {
                len: spec.url.len(),
                max: self.limits.max_url_len,
            });
        }
        Ok(())
    }

    fn prepare(&self, spec: &HttpCallSpec) -> Result<PreparedRequest, GateError> {
        let body = spec.body_bytes();
        if let Some(b) = &body {
            if b.len() > self.limits.max_request_body_bytes {
                return Err(GateError::BodyTooLarge {
                    len: b.len(),
                    max: self.limits.max_request_body_bytes,
                });
            }
        }
        let url = spec.resolved_url()?;
        Ok(PreparedRequest {
            method: spec.method.to_uppercase(),
            url: url.into(),
            headers: spec.headers.clone(),
            body,
            timeout: Duration::from_millis(spec.timeout_ms),
            max_response_bytes: self.limits.max_response_bytes,
        })
    }

    /// Record a call that never became a valid request (e.g. the script
    /// passed something that is not a request object). Does not consume quota.
    pub fn reject(&mut self, url: &str, method: &str, err: GateError) -> HttpCallOutcome {
        debug!(url, error = %err, "gated request rejected");
        let outcome = HttpCallOutcome::from(err);
        self.record(url, method, false, &outcome);
        outcome
    }

    /// Perform one gated request. Never panics and never returns a Rust
    /// error: every failure is an [`HttpCallOutcome::Err`].
    pub fn perform_request(&mut self, spec: &HttpCallSpec) -> HttpCallOutcome {
        if self.abort.is_aborted() {
            return self.reject(&spec.url, &spec.method, GateError::Aborted);
        }
        if let Err(e) = self.preflight(spec) {
            return self.reject(&spec.url, &spec.method, e);
        }
        if self.remaining() == 0 {
            return self.reject(&spec.url, &spec.method, GateError::QuotaExceeded { quota: self.quota });
        }
        self.used += 1;

        let outcome = match self.prepare(spec) {
            Ok(prepared) => self.dispatch(&prepared, spec),
            Err(e) => HttpCallOutcome::from(e),
        };
        info!(
            url = %spec.url,
            method = %spec.method,
            status = ?outcome.status(),
            used = self.used,
            remaining = self.remaining(),
            "gated request"
        );
        self.record(&spec.url, &spec.method, true, &outcome);
        outcome
    }

    fn dispatch(&self, prepared: &PreparedRequest, spec: &HttpCallSpec) -> HttpCallOutcome {
        match self.transport.send(prepared) {
            Ok(raw) if (200..300).contains(&raw.status) => HttpCallOutcome::Ok(HttpResponse {
                status: raw.status,
                data: ResponseData::decode(&raw.body, spec.response_type),
                headers: raw.headers,
            }),
            Ok(raw) => HttpCallOutcome::Err(HttpFailure {
                name: "HttpError".into(),
                message: format!("Request failed with status code {}", raw.status),
                status: Some(raw.status),
            }),
            Err(e) => HttpCallOutcome::from(e),
        }
    }

    fn record(&mut self, url: &str, method: &str, dispatched: bool, outcome: &HttpCallOutcome) {
        self.log.push(RequestLogEntry {
            url: url.to_string(),
            method: method.to_uppercase(),
            dispatched,
            status: outcome.status(),
            error: outcome.error_name().map(str::to_string),
        });
    }
}

impl std::fmt::Debug for RequestGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestGate")
            .field("quota", &self.quota)
            .field("used", &self.used)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticTransport;
    use serde_json::json;

    fn gate(quota: u32) -> (RequestGate, Arc<StaticTransport>) {
        let transport = Arc::new(StaticTransport::json(200, json!({"price": 42})));
        (RequestGate::new(quota, transport.clone()), transport)
    }

    #[test]
    fn quota_allows_exactly_n_calls() {
        let (mut g, transport) = gate(3);
        let spec = HttpCallSpec::get("https://api.example.com/price");
        for left in (0..3).rev() {
            assert!(g.perform_request(&spec).is_ok());
            assert_eq!(g.remaining(), left);
        }
        let fourth = g.perform_request(&spec);
        assert_eq!(fourth.error_name(), Some("QuotaExceeded"));
        assert_eq!(g.used(), 3);
        assert_eq!(transport.requests().len(), 3, "fourth call must not reach the network");
    }

    #[test]
    fn zero_quota_rejects_first_call() {
        let (mut g, transport) = gate(0);
        let out = g.perform_request(&HttpCallSpec::get("https://a.example"));
        assert_eq!(out.error_name(), Some("QuotaExceeded"));
        assert_eq!(g.remaining(), 0);
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn timeout_over_cap_does_not_consume_quota() {
        let (mut g, transport) = gate(1);
        let mut spec = HttpCallSpec::get("https://a.example");
        spec.timeout_ms = 9001;
        let out = g.perform_request(&spec);
        assert_eq!(out.error_name(), Some("TimeoutTooLarge"));
        assert_eq!(g.used(), 0);
        assert!(transport.requests().is_empty());

        spec.timeout_ms = 9000;
        assert!(g.perform_request(&spec).is_ok());
        assert_eq!(g.used(), 1);
    }

    #[test]
    fn long_url_does_not_consume_quota() {
        let (mut g, _) = gate(1);
        let base = "https://a.example/";
        let url = format!("{base}{}", "x".repeat(2049 - base.len()));
        assert_eq!(url.len(), 2049);
        let out = g.perform_request(&HttpCallSpec::get(url));
        assert_eq!(out.error_name(), Some("UrlTooLong"));
        assert_eq!(g.used(), 0);

        let url = format!("{base}{}", "x".repeat(2048 - base.len()));
        assert!(g.perform_request(&HttpCallSpec::get(url)).is_ok());
    }

    #[test]
    fn oversized_body_counts_but_is_not_sent() {
        let (mut g, transport) = gate(2);
        let mut spec = HttpCallSpec::get("https://a.example");
        spec.method = "post".into();
        spec.body = Some(json!("x".repeat(2001)));
        let out = g.perform_request(&spec);
        assert_eq!(out.error_name(), Some("BodyTooLarge"));
        assert_eq!(g.used(), 1);
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn non_2xx_is_an_error_outcome_with_status() {
        let transport = Arc::new(StaticTransport::json(503, json!({"err": "down"})));
        let mut g = RequestGate::new(1, transport);
        let out = g.perform_request(&HttpCallSpec::get("https://a.example"));
        assert_eq!(out.error_name(), Some("HttpError"));
        assert_eq!(out.status(), Some(503));
    }

    #[test]
    fn transport_failure_is_an_error_outcome() {
        let transport = Arc::new(StaticTransport::failing(crate::AdapterError::Timeout {
            timeout_ms: 5000,
        }));
        let mut g = RequestGate::new(1, transport);
        let out = g.perform_request(&HttpCallSpec::get("https://a.example"));
        assert_eq!(out.error_name(), Some("TimeoutError"));
        assert_eq!(g.used(), 1);
    }

    #[test]
    fn prepared_request_carries_caps() {
        let (mut g, transport) = gate(1);
        let mut spec = HttpCallSpec::get("https://a.example/p");
        spec.timeout_ms = 1234;
        spec.headers.insert("x-key".into(), "v".into());
        g.perform_request(&spec);
        let sent = &transport.requests()[0];
        assert_eq!(sent.method, "GET");
        assert_eq!(sent.timeout, Duration::from_millis(1234));
        assert_eq!(sent.max_response_bytes, 2_000_000);
        assert_eq!(sent.headers.get("x-key").map(String::as_str), Some("v"));
    }

    #[test]
    fn aborted_run_dispatches_nothing() {
        let (g, transport) = gate(3);
        let abort = AbortSignal::new();
        let mut g = g.with_abort(abort.clone());
        assert!(g.perform_request(&HttpCallSpec::get("https://a.example/1")).is_ok());

        abort.abort();
        let out = g.perform_request(&HttpCallSpec::get("https://a.example/2"));
        assert_eq!(out.error_name(), Some("RunAborted"));
        assert_eq!(g.used(), 1);
        assert_eq!(g.remaining(), 2);
        assert_eq!(transport.requests().len(), 1);
        assert!(!g.request_log()[1].dispatched);
    }

    #[test]
    fn log_records_rejected_and_dispatched_calls() {
        let (mut g, _) = gate(1);
        let mut spec = HttpCallSpec::get("https://a.example");
        spec.timeout_ms = 10_000;
        g.perform_request(&spec);
        spec.timeout_ms = 100;
        g.perform_request(&spec);
        g.perform_request(&spec);

        let log = g.request_log();
        assert_eq!(log.len(), 3);
        assert!(!log[0].dispatched);
        assert_eq!(log[0].error.as_deref(), Some("TimeoutTooLarge"));
        assert!(log[1].dispatched);
        assert_eq!(log[1].status, Some(200));
        assert_eq!(log[2].error.as_deref(), Some("QuotaExceeded"));
    }
}
