//! Offchain secrets consistency check.
//!
//! Every secrets URL must serve the same JSON object, and that object must
//! hold an entry for each expected node address or a `"0x0"` default.
//! Falling back to the default is allowed but reported as a warning.

use crate::error::{Result, SecretsError};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_SECRETS_KEY: &str = "0x0";
pub const FETCH_TIMEOUT: Duration = Duration::from_millis(3000);
pub const MAX_SECRETS_BYTES: usize = 1_000_000;

/// One fetched secrets document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OffchainSecretsRecord {
    pub url: String,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FallbackWarning {
    pub url: String,
    pub address: String,
}

impl std::fmt::Display for FallbackWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "no secrets for node {} at {}, the default secrets will be used",
            self.address, self.url
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    pub urls_checked: usize,
    pub warnings: Vec<FallbackWarning>,
}

fn truthy(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64() != Some(0.0),
        Some(_) => true,
    }
}

fn node_entry<'a>(payload: &'a Value, address: &str) -> Option<&'a Value> {
    payload
        .as_object()?
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(address))
        .map(|(_, v)| v)
}

/// Check already-fetched documents. Pure; the network side lives in
/// [`SecretsVerifier`].
pub fn check_records(
    records: &[OffchainSecretsRecord],
    node_addresses: &[String],
) -> Result<ConsistencyReport> {
    let mut report = ConsistencyReport::default();
    let Some(first) = records.first() else {
        return Ok(report);
    };
    let first_serialized = first.payload.to_string();

    for record in records {
        if record.payload.to_string() != first_serialized {
            return Err(SecretsError::Inconsistent {
                first_url: first.url.clone(),
                url: record.url.clone(),
            });
        }
        for address in node_addresses {
            let address = address.to_lowercase();
            if truthy(node_entry(&record.payload, &address)) {
                continue;
            }
            if !truthy(record.payload.get(DEFAULT_SECRETS_KEY)) {
                return Err(SecretsError::MissingSecretsForNode {
                    address,
                    url: record.url.clone(),
                });
            }
            let warning = FallbackWarning {
                url: record.url.clone(),
                address,
            };
            warn!(url = %warning.url, node = %warning.address, "using default secrets for node");
            report.warnings.push(warning);
        }
        report.urls_checked += 1;
    }
    Ok(report)
}

pub struct SecretsVerifier {
    client: reqwest::Client,
    timeout: Duration,
    max_bytes: usize,
}

impl SecretsVerifier {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| SecretsError::Fetch {
                url: String::new(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            timeout: FETCH_TIMEOUT,
            max_bytes: MAX_SECRETS_BYTES,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub async fn fetch(&self, url: &str) -> Result<OffchainSecretsRecord> {
        let fail = |reason: String| SecretsError::Fetch {
            url: url.to_string(),
            reason,
        };
        let mut resp = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| fail(if e.is_timeout() { "timeout".into() } else { e.to_string() }))?;
        if !resp.status().is_success() {
            return Err(fail(format!("status {}", resp.status().as_u16())));
        }

        let mut body = Vec::new();
        while let Some(chunk) = resp.chunk().await.map_err(|e| fail(e.to_string()))? {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(fail(format!("response larger than {} bytes", self.max_bytes)));
            }
            body.extend_from_slice(&chunk);
        }
        let payload =
            serde_json::from_slice(&body).map_err(|e| fail(format!("not JSON: {e}")))?;
        Ok(OffchainSecretsRecord {
            url: url.to_string(),
            payload,
        })
    }

    /// Fetch every URL, then check consistency and node coverage.
    pub async fn check(
        &self,
        secrets_urls: &[String],
        node_addresses: &[String],
    ) -> Result<ConsistencyReport> {
        let mut records = Vec::with_capacity(secrets_urls.len());
        for url in secrets_urls {
            records.push(self.fetch(url).await?);
        }
        let report = check_records(&records, node_addresses)?;
        info!(
            urls = report.urls_checked,
            nodes = node_addresses.len(),
            fallbacks = report.warnings.len(),
            "offchain secrets verified"
        );
        Ok(report)
    }

    /// `Ok(true)` when every URL passes; any failure is an error.
    pub async fn verify(&self, secrets_urls: &[String], node_addresses: &[String]) -> Result<bool> {
        self.check(secrets_urls, node_addresses).await.map(|_| true)
    }
}
