use colored::Colorize;
use fn_config::SandboxSettings;
use fn_sandbox::codec::{decode_signed_int, decode_unsigned_int};
use fn_sandbox::{encode_response, ExecutionRequest, SandboxRunner, Validator};
use fn_secrets::{ReturnType, SecretsError, SecretsVerifier};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{self, Read};

#[derive(Debug)]
pub enum CliError {
    /// Unreadable or invalid user input.
    Input(String),
    Other(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Input(m) | CliError::Other(m) => f.write_str(m),
        }
    }
}

impl From<SecretsError> for CliError {
    fn from(e: SecretsError) -> Self {
        match e {
            SecretsError::Config(c) => CliError::Input(c.to_string()),
            other => CliError::Other(format!("{}: {other}", other.name())),
        }
    }
}

type CliResult = Result<(), CliError>;

fn read_input(path: &str) -> Result<String, CliError> {
    if path == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| CliError::Input(format!("read stdin: {e}")))?;
        Ok(buf)
    } else {
        fs::read_to_string(path).map_err(|e| CliError::Input(format!("read {path}: {e}")))
    }
}

fn read_json(path: &str) -> Result<Value, CliError> {
    serde_json::from_str(&read_input(path)?)
        .map_err(|e| CliError::Input(format!("parse {path}: {e}")))
}

fn read_secrets(path: &str) -> Result<BTreeMap<String, String>, CliError> {
    serde_json::from_value(read_json(path)?)
        .map_err(|_| CliError::Input(format!("{path}: secrets must be an object of strings")))
}

fn runtime() -> Result<tokio::runtime::Runtime, CliError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::Other(format!("start runtime: {e}")))
}

fn print_json(v: &impl serde::Serialize) -> CliResult {
    let out = serde_json::to_string_pretty(v).map_err(|e| CliError::Other(e.to_string()))?;
    println!("{out}");
    Ok(())
}

/// Human-readable form of a result under its expected return type.
pub fn decode_result(bytes: &[u8], return_type: ReturnType) -> String {
    match return_type {
        ReturnType::Uint256 => decode_unsigned_int(bytes).to_string(),
        ReturnType::Int256 => decode_signed_int(bytes).to_string(),
        ReturnType::String => String::from_utf8_lossy(bytes).into_owned(),
        ReturnType::Buffer => encode_response(bytes),
    }
}

// ── simulate ────────────────────────────────────────────────────

pub struct SimulateArgs {
    pub source: String,
    pub args: Vec<String>,
    pub secrets: Option<String>,
    pub quota: Option<u32>,
    pub max_response_bytes: Option<usize>,
    pub return_type: Option<String>,
}

pub fn simulate(a: &SimulateArgs) -> CliResult {
    let return_type = match a.return_type.as_deref() {
        None => None,
        Some(s) => Some(ReturnType::parse(s).ok_or_else(|| {
            CliError::Input(format!("unknown return type {s}, expected uint256, int256, string or Buffer"))
        })?),
    };
    let source = read_input(&a.source)?;
    let settings = SandboxSettings::from_env();
    let validator = Validator::from_settings(&settings);

    let mut request = ExecutionRequest::new(
        source,
        a.quota.unwrap_or(settings.default_max_http_queries),
    )
    .with_args(a.args.iter().cloned());
    if let Some(path) = &a.secrets {
        request = request.with_secrets(read_secrets(path)?);
    }

    let mut runner = SandboxRunner::from_settings(&settings)
        .map_err(|e| CliError::Other(format!("sandbox setup: {e}")))?
        .with_sandboxed_logging(true);
    let outcome = runner.evaluate(&request);

    let (log, result) = match outcome {
        Ok(eval) => (eval.request_log, Ok(eval.result)),
        Err(err) => (err.request_log().unwrap_or_default().to_vec(), Err(err)),
    };
    for entry in &log {
        let status = entry
            .status
            .map(|s| s.to_string())
            .or_else(|| entry.error.clone())
            .unwrap_or_default();
        let badge = if entry.dispatched {
            "sent".green()
        } else {
            "blocked".yellow()
        };
        println!("{} {} {} {}", badge, entry.method.dimmed(), entry.url, status.dimmed());
    }

    let value = result.map_err(|e| CliError::Other(format!("{}: {}", e.name(), e.message())))?;
    let max = a.max_response_bytes.unwrap_or(settings.default_max_response_bytes);
    let bytes = validator
        .valid_output(&value, max)
        .map_err(|e| CliError::Other(e.to_string()))?;

    println!("{} {}", "Result: ".dimmed(), encode_response(bytes).cyan());
    if let Some(rt) = return_type {
        println!("{} {}", "Decoded:".dimmed(), decode_result(bytes, rt).bold());
    }
    Ok(())
}

// ── build-request ───────────────────────────────────────────────

pub fn build_request(config_path: &str, nodes: &[String]) -> CliResult {
    let config = read_json(config_path)?;
    let request = runtime()?.block_on(fn_secrets::build_request(&config, nodes))?;
    print_json(&request)
}

// ── encrypt ─────────────────────────────────────────────────────

pub fn encrypt(message: &str, public_key: &str, signer_key: Option<&str>) -> CliResult {
    let ciphertext = match signer_key {
        Some(key) => fn_secrets::encrypt_with_signature(key, public_key, message)?,
        None => fn_secrets::encrypt(public_key, message)?,
    };
    println!("0x{ciphertext}");
    Ok(())
}

// ── offchain-secrets ────────────────────────────────────────────

pub fn offchain_secrets(secrets_path: &str, wallet_key: &str, public_key: &str) -> CliResult {
    let secrets = read_secrets(secrets_path)?;
    let doc = fn_secrets::build_offchain_secrets(wallet_key, public_key, &secrets)?;
    print_json(&doc)
}

// ── verify-secrets ──────────────────────────────────────────────

pub fn verify_secrets(urls: &[String], nodes: &[String]) -> CliResult {
    let verifier = SecretsVerifier::new()?;
    let report = runtime()?.block_on(verifier.check(urls, nodes))?;
    for w in &report.warnings {
        println!("{} {}", "warn:".yellow().bold(), w);
    }
    println!(
        "{} {} URL(s) hold identical secrets",
        "ok".green().bold(),
        report.urls_checked
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_each_return_type() {
        let mut word = [0u8; 32];
        word[31] = 42;
        assert_eq!(decode_result(&word, ReturnType::Uint256), "42");
        assert_eq!(decode_result(&[0xff; 32], ReturnType::Int256), "-1");
        assert_eq!(decode_result(b"hello", ReturnType::String), "hello");
        assert_eq!(decode_result(&[0xab, 0x01], ReturnType::Buffer), "0xab01");
    }

    #[test]
    fn config_errors_are_input_errors() {
        let err: CliError = SecretsError::Config(fn_secrets::ConfigError::invalid("source")).into();
        assert!(matches!(err, CliError::Input(_)));
        let err: CliError = SecretsError::Decryption("bad MAC".into()).into();
        assert!(matches!(err, CliError::Other(_)));
    }

    #[test]
    fn secrets_file_must_be_a_string_map() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.json");
        let bad = dir.path().join("bad.json");
        fs::write(&good, r#"{"apiKey":"abc"}"#).unwrap();
        fs::write(&bad, r#"{"apiKey":1}"#).unwrap();

        let secrets = read_secrets(good.to_str().unwrap()).unwrap();
        assert_eq!(secrets["apiKey"], "abc");
        assert!(matches!(read_secrets(bad.to_str().unwrap()), Err(CliError::Input(_))));
    }
}
