//! Request config validation and request building.

use crate::cipher;
use crate::error::{ConfigError, Result};
use crate::verify::SecretsVerifier;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, info};

const RECOGNIZED_FIELDS: &[&str] = &[
    "codeLocation",
    "codeLanguage",
    "source",
    "args",
    "secrets",
    "secretsURLs",
    "walletPrivateKey",
    "DONPublicKey",
    "maxResponseBytes",
    "numAllowedQueries",
    "expectedReturnType",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnType {
    #[serde(rename = "uint256")]
    Uint256,
    #[serde(rename = "int256")]
    Int256,
    #[serde(rename = "string")]
    String,
    Buffer,
}

impl ReturnType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "uint256" => Some(ReturnType::Uint256),
            "int256" => Some(ReturnType::Int256),
            "string" => Some(ReturnType::String),
            "Buffer" => Some(ReturnType::Buffer),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnType::Uint256 => "uint256",
            ReturnType::Int256 => "int256",
            ReturnType::String => "string",
            ReturnType::Buffer => "Buffer",
        }
    }
}

/// A validated request config. Location is always inline and the
/// language always JavaScript, so neither is stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestConfig {
    pub source: String,
    pub args: Option<Vec<String>>,
    pub secrets: Option<BTreeMap<String, String>>,
    pub secrets_urls: Vec<String>,
    pub wallet_private_key: Option<String>,
    pub don_public_key: Option<String>,
    pub max_response_bytes: Option<u32>,
    pub num_allowed_queries: Option<u32>,
    pub expected_return_type: Option<ReturnType>,
}

/// JS truthiness, for fields where a falsy value means "not given".
fn given(v: Option<&Value>) -> Option<&Value> {
    match v? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        other => Some(other),
    }
}

fn integer_field(obj: &Map<String, Value>, field: &str) -> std::result::Result<Option<u32>, ConfigError> {
    match given(obj.get(field)) {
        None => Ok(None),
        Some(v) => v
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| ConfigError::invalid(field)),
    }
}

fn is_http_url(s: &str) -> bool {
    match url::Url::parse(s) {
        Ok(u) => matches!(u.scheme(), "http" | "https") && u.host_str().is_some(),
        Err(_) => false,
    }
}

impl RequestConfig {
    pub fn from_json(value: &Value) -> std::result::Result<Self, ConfigError> {
        let obj = value
            .as_object()
            .ok_or_else(|| ConfigError::new("config", "config must be a JSON object"))?;

        if let Some(unknown) = obj.keys().find(|k| !RECOGNIZED_FIELDS.contains(&k.as_str())) {
            return Err(ConfigError::new(
                unknown.as_str(),
                format!("{unknown} is not a recognized config option"),
            ));
        }

        match obj.get("codeLocation") {
            Some(Value::String(s)) if s == "Inline" => {}
            Some(Value::Number(n)) if n.as_u64() == Some(0) => {}
            _ => return Err(ConfigError::invalid("codeLocation")),
        }
        match obj.get("codeLanguage") {
            Some(Value::String(s)) if s == "JavaScript" => {}
            Some(Value::Number(n)) if n.as_u64() == Some(0) => {}
            _ => return Err(ConfigError::invalid("codeLanguage")),
        }
        let source = obj
            .get("source")
            .and_then(Value::as_str)
            .ok_or_else(|| ConfigError::invalid("source"))?
            .to_string();

        let num_allowed_queries = integer_field(obj, "numAllowedQueries")?;

        let secrets = match given(obj.get("secrets")) {
            None => None,
            Some(Value::Object(map)) => {
                let mut out = BTreeMap::new();
                for (k, v) in map {
                    let v = v.as_str().ok_or_else(|| {
                        ConfigError::new(
                            "secrets",
                            "Secrets object is not correctly specified in config. It can only contain string values.",
                        )
                    })?;
                    out.insert(k.clone(), v.to_string());
                }
                Some(out)
            }
            Some(_) => {
                return Err(ConfigError::new(
                    "secrets",
                    "secrets object is not correctly specified in config",
                ))
            }
        };

        let mut secrets_urls = Vec::new();
        match given(obj.get("secretsURLs")) {
            None => {}
            Some(Value::Array(items)) => {
                for item in items {
                    match item.as_str() {
                        Some(s) if is_http_url(s) => secrets_urls.push(s.to_string()),
                        _ => {
                            let shown = item.as_str().map(str::to_string).unwrap_or_else(|| item.to_string());
                            return Err(ConfigError::new(
                                "secretsURLs",
                                format!("invalid HTTP or HTTPs URL {shown} in secretsURLs specified in config"),
                            ));
                        }
                    }
                }
            }
            Some(_) => {
                return Err(ConfigError::new(
                    "secretsURLs",
                    "secretsURLs array is not correctly specified in config",
                ))
            }
        }

        let wallet_private_key = match obj.get("walletPrivateKey") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => return Err(ConfigError::invalid("walletPrivateKey")),
        };
        let don_public_key = match given(obj.get("DONPublicKey")) {
            None => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => return Err(ConfigError::invalid("DONPublicKey")),
        };
        if !secrets_urls.is_empty() && wallet_private_key.is_none() {
            return Err(ConfigError::invalid("walletPrivateKey"));
        }

        let args = match given(obj.get("args")) {
            None => None,
            Some(Value::Array(items)) => Some(
                items
                    .iter()
                    .map(|a| a.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| {
                        ConfigError::new("args", "an element of the args array is not a string in config")
                    })?,
            ),
            Some(_) => {
                return Err(ConfigError::new(
                    "args",
                    "args array is not correctly specified in config",
                ))
            }
        };

        let max_response_bytes = integer_field(obj, "maxResponseBytes")?;

        let expected_return_type = match given(obj.get("expectedReturnType")) {
            None => None,
            Some(v) => Some(
                v.as_str()
                    .and_then(ReturnType::parse)
                    .ok_or_else(|| ConfigError::invalid("expectedReturnType"))?,
            ),
        };

        Ok(Self {
            source,
            args,
            secrets,
            secrets_urls,
            wallet_private_key,
            don_public_key,
            max_response_bytes,
            num_allowed_queries,
            expected_return_type,
        })
    }

    fn keys_for_secrets(&self) -> std::result::Result<(&str, &str), ConfigError> {
        let wallet = self
            .wallet_private_key
            .as_deref()
            .ok_or_else(|| ConfigError::invalid("walletPrivateKey"))?;
        let don = self
            .don_public_key
            .as_deref()
            .ok_or_else(|| ConfigError::invalid("DONPublicKey"))?;
        Ok((wallet, don))
    }
}

/// The request envelope handed to the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionsRequest {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secrets: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
}

/// Validate `config` and produce the request. Secrets URLs take
/// precedence over inline secrets; with `node_addresses` given, the hosted
/// documents are verified before the URLs are encrypted.
pub async fn build_request(config: &Value, node_addresses: &[String]) -> Result<FunctionsRequest> {
    let config = RequestConfig::from_json(config)?;
    let mut request = FunctionsRequest {
        source: config.source.clone(),
        secrets: None,
        args: config.args.clone(),
    };

    if !config.secrets_urls.is_empty() {
        let (_, don) = config.keys_for_secrets()?;
        if !node_addresses.is_empty() {
            SecretsVerifier::new()?
                .verify(&config.secrets_urls, node_addresses)
                .await?;
        } else {
            debug!("no node addresses given, skipping secrets verification");
        }
        let joined = config.secrets_urls.join(" ");
        request.secrets = Some(format!("0x{}", cipher::encrypt(don, &joined)?));
        info!(urls = config.secrets_urls.len(), "encrypted secrets URLs");
    } else if let Some(secrets) = config.secrets.as_ref().filter(|s| !s.is_empty()) {
        let (wallet, don) = config.keys_for_secrets()?;
        let payload = serde_json::to_string(secrets)
            .map_err(|e| crate::error::SecretsError::Encryption(e.to_string()))?;
        request.secrets = Some(format!(
            "0x{}",
            cipher::encrypt_with_signature(wallet, don, &payload)?
        ));
        info!(count = secrets.len(), "encrypted inline secrets");
    }

    Ok(request)
}
