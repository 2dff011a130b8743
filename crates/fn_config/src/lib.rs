//! Process-wide settings, read once from the environment.
//!
//! Library code never reads the environment itself: binaries snapshot a
//! [`SandboxSettings`] and pass it down.

use lazy_static::lazy_static;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

lazy_static! {
    /// Bind address of the gate service.
    pub static ref GATE_ADDR: String =
        env::var("FN_GATE_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    /// `tracing` filter derived from `LOG_LEVEL`.
    pub static ref LOG_FILTER: &'static str = log_filter(env::var("LOG_LEVEL").ok().as_deref());

    /// `LOG_FORMAT=json` switches subscribers to JSON lines.
    pub static ref LOG_JSON: bool = env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
}

/// Map a `LOG_LEVEL` value to a filter. Unset, empty, `false` or unknown
/// values fall back to `warn` so errors and warnings are always emitted.
pub fn log_filter(level: Option<&str>) -> &'static str {
    match level.map(|l| l.trim().to_ascii_lowercase()).as_deref() {
        Some("error") => "error",
        Some("info") | Some("true") => "info",
        Some("debug") => "debug",
        Some("trace") => "trace",
        _ => "warn",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SandboxSettings {
    /// Transient directory cleared before and after every run.
    pub scratch_dir: PathBuf,
    pub clear_scratch: bool,
    /// Forward sandboxed `console.*` output to the host log.
    pub sandboxed_logging: bool,
    pub default_max_http_queries: u32,
    pub default_max_response_bytes: usize,
    /// Wall-clock watchdog around a whole run.
    pub execution_timeout: Duration,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            scratch_dir: env::temp_dir().join("fn-sandbox-scratch"),
            clear_scratch: true,
            sandboxed_logging: false,
            default_max_http_queries: 5,
            default_max_response_bytes: 256,
            execution_timeout: Duration::from_millis(10_000),
        }
    }
}

impl SandboxSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| env::var(k).ok())
    }

    /// Build settings from any key lookup; unparsable values keep the default.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let mut s = Self::default();
        if let Some(dir) = get("SANDBOX_SCRATCH_DIR").filter(|d| !d.is_empty()) {
            s.scratch_dir = PathBuf::from(dir);
        }
        if let Some(v) = get("SANDBOX_DISABLE_SCRATCH_CLEARING") {
            s.clear_scratch = !truthy(&v);
        }
        if let Some(v) = get("SANDBOX_LOGGING") {
            s.sandboxed_logging = truthy(&v);
        }
        if let Some(n) = get("SANDBOX_DEFAULT_MAX_HTTP_QUERIES").and_then(|v| v.parse().ok()) {
            s.default_max_http_queries = n;
        }
        if let Some(n) = get("SANDBOX_DEFAULT_MAX_RESPONSE_BYTES").and_then(|v| v.parse().ok()) {
            s.default_max_response_bytes = n;
        }
        if let Some(ms) = get("SANDBOX_EXECUTION_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            s.execution_timeout = Duration::from_millis(ms);
        }
        s
    }
}

fn truthy(v: &str) -> bool {
    matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
