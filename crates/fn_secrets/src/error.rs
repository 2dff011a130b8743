use thiserror::Error;

/// A request config field that is missing, malformed or not recognized.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ConfigError {
    pub field: String,
    pub message: String,
}

impl ConfigError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    /// `"<field> is not correctly specified in config"`.
    pub fn invalid(field: &str) -> Self {
        Self::new(field, format!("{field} is not correctly specified in config"))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecretsError {
    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("Failed to fetch off-chain secrets from {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error(
        "Off-chain secrets URLs {url} and {first_url} do not contain the same JSON object. \
         All secrets URLs must have an identical JSON object."
    )]
    Inconsistent { first_url: String, url: String },

    #[error("No secrets specified for node {address} and no default secrets found.")]
    MissingSecretsForNode { address: String, url: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SecretsError {
    pub fn name(&self) -> &'static str {
        match self {
            SecretsError::Encryption(_) => "EncryptionError",
            SecretsError::Decryption(_) => "DecryptionError",
            SecretsError::Fetch { .. } => "FetchError",
            SecretsError::Inconsistent { .. } => "InconsistentSecretsError",
            SecretsError::MissingSecretsForNode { .. } => "MissingSecretsForNodeError",
            SecretsError::Config(_) => "ConfigError",
        }
    }
}

pub type Result<T> = std::result::Result<T, SecretsError>;
