use crate::cipher;
use crate::error::{Result, SecretsError};
use crate::verify::DEFAULT_SECRETS_KEY;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// The document hosted at a secrets URL: a single default entry holding
/// the signed, encrypted secrets as base64.
pub fn build_offchain_secrets(
    wallet_private_key: &str,
    don_public_key: &str,
    secrets: &BTreeMap<String, String>,
) -> Result<Value> {
    let message =
        serde_json::to_string(secrets).map_err(|e| SecretsError::Encryption(e.to_string()))?;
    let ciphertext = cipher::encrypt_with_signature(wallet_private_key, don_public_key, &message)?;
    let raw = hex::decode(&ciphertext).map_err(|e| SecretsError::Encryption(e.to_string()))?;
    Ok(json!({ DEFAULT_SECRETS_KEY: STANDARD.encode(raw) }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::{decrypt, public_key_from_private, recover_public_key, SecretsEnvelope};

    const WALLET: &str = "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
    const DON_PRIVATE: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn document_opens_to_the_signed_secrets() {
        let don = public_key_from_private(DON_PRIVATE).unwrap();
        let mut secrets = BTreeMap::new();
        secrets.insert("apiKey".to_string(), "abc".to_string());

        let doc = build_offchain_secrets(WALLET, &don, &secrets).unwrap();
        let obj = doc.as_object().unwrap();
        assert_eq!(obj.len(), 1);

        let raw = STANDARD.decode(obj["0x0"].as_str().unwrap()).unwrap();
        let opened = decrypt(DON_PRIVATE, &hex::encode(raw)).unwrap();
        let envelope: SecretsEnvelope = serde_json::from_str(&opened).unwrap();
        assert_eq!(envelope.message, r#"{"apiKey":"abc"}"#);

        let signer = recover_public_key(&envelope.message, &envelope.signature.unwrap()).unwrap();
        assert_eq!(signer, public_key_from_private(WALLET).unwrap());
    }
}
