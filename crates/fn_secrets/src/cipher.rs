//! ECIES over secp256k1, wire-compatible with `eth-crypto`.
//!
//! ```text
//! shared   = x(ECDH(ephemeral, recipient))
//! keys     = SHA-512(shared)            enc = keys[..32], mac = keys[32..]
//! body     = AES-256-CBC/PKCS7(enc, iv, message)
//! tag      = HMAC-SHA256(mac, iv || ephemeralUncompressed || body)
//! output   = hex(iv(16) || ephemeralCompressed(33) || tag(32) || body)
//! ```
//!
//! Signatures are `0x || r || s || v` with `v = 27 + recovery id`, over
//! keccak256 of the UTF-8 message.

use crate::error::{Result, SecretsError};
use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{PublicKey, SecretKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use tiny_keccak::{Hasher, Keccak};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

const IV_LEN: usize = 16;
const COMPRESSED_LEN: usize = 33;
const MAC_LEN: usize = 32;

/// Plaintext of a signed submission, serialized to JSON before encryption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretsEnvelope {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

fn strip_0x(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    let mut out = [0u8; 32];
    hasher.update(data);
    hasher.finalize(&mut out);
    out
}

/// Accepts 64-byte raw, 65-byte uncompressed or 33-byte compressed keys,
/// hex encoded with or without `0x`.
pub fn parse_public_key(key: &str) -> Result<PublicKey> {
    let raw = hex::decode(strip_0x(key.trim()))
        .map_err(|e| SecretsError::Encryption(format!("public key is not hex: {e}")))?;
    let sec1 = match raw.len() {
        64 => {
            let mut sec1 = vec![0x04u8];
            sec1.extend_from_slice(&raw);
            sec1
        }
        65 | 33 => raw,
        n => {
            return Err(SecretsError::Encryption(format!(
                "public key has {n} bytes, expected 33, 64 or 65"
            )))
        }
    };
    PublicKey::from_sec1_bytes(&sec1)
        .map_err(|_| SecretsError::Encryption("public key is not on secp256k1".into()))
}

fn parse_private_key_bytes(key: &str) -> Option<Vec<u8>> {
    hex::decode(strip_0x(key.trim())).ok().filter(|b| b.len() == 32)
}

fn parse_secret_key(key: &str, err: fn(String) -> SecretsError) -> Result<SecretKey> {
    parse_private_key_bytes(key)
        .and_then(|b| SecretKey::from_slice(&b).ok())
        .ok_or_else(|| err("private key must be 32 bytes of hex".into()))
}

/// Uncompressed public key (64 bytes, no prefix) as hex.
pub fn public_key_from_private(private_key: &str) -> Result<String> {
    let sk = parse_secret_key(private_key, SecretsError::Encryption)?;
    Ok(hex::encode(&sk.public_key().to_encoded_point(false).as_bytes()[1..]))
}

fn derive_keys(secret: &SecretKey, public: &PublicKey) -> ([u8; 32], [u8; 32]) {
    let shared = k256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
    let hash = Sha512::digest(shared.raw_secret_bytes());
    let mut enc = [0u8; 32];
    let mut mac = [0u8; 32];
    enc.copy_from_slice(&hash[..32]);
    mac.copy_from_slice(&hash[32..]);
    (enc, mac)
}

fn mac_tag(mac_key: &[u8], iv: &[u8], ephemeral_uncompressed: &[u8], body: &[u8]) -> Result<HmacSha256> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(mac_key)
        .map_err(|e| SecretsError::Encryption(e.to_string()))?;
    mac.update(iv);
    mac.update(ephemeral_uncompressed);
    mac.update(body);
    Ok(mac)
}

/// Encrypt `message` for the holder of `recipient_public_key`.
pub fn encrypt(recipient_public_key: &str, message: &str) -> Result<String> {
    let recipient = parse_public_key(recipient_public_key)?;
    let ephemeral = SecretKey::random(&mut OsRng);
    let (enc_key, mac_key) = derive_keys(&ephemeral, &recipient);

    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    let body = Aes256CbcEnc::new_from_slices(&enc_key, &iv)
        .map_err(|e| SecretsError::Encryption(e.to_string()))?
        .encrypt_padded_vec_mut::<Pkcs7>(message.as_bytes());

    let ephemeral_public = ephemeral.public_key();
    let uncompressed = ephemeral_public.to_encoded_point(false);
    let compressed = ephemeral_public.to_encoded_point(true);
    let tag = mac_tag(&mac_key, &iv, uncompressed.as_bytes(), &body)?
        .finalize()
        .into_bytes();

    let mut out = Vec::with_capacity(IV_LEN + COMPRESSED_LEN + MAC_LEN + body.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(compressed.as_bytes());
    out.extend_from_slice(&tag);
    out.extend_from_slice(&body);
    Ok(hex::encode(out))
}

/// Open a ciphertext produced by [`encrypt`].
pub fn decrypt(recipient_private_key: &str, ciphertext: &str) -> Result<String> {
    let sk = parse_secret_key(recipient_private_key, SecretsError::Decryption)?;
    let raw = hex::decode(strip_0x(ciphertext.trim()))
        .map_err(|e| SecretsError::Decryption(format!("ciphertext is not hex: {e}")))?;
    if raw.len() < IV_LEN + COMPRESSED_LEN + MAC_LEN + 16 {
        return Err(SecretsError::Decryption("ciphertext too short".into()));
    }
    let (iv, rest) = raw.split_at(IV_LEN);
    let (ephemeral, rest) = rest.split_at(COMPRESSED_LEN);
    let (tag, body) = rest.split_at(MAC_LEN);

    let ephemeral = PublicKey::from_sec1_bytes(ephemeral)
        .map_err(|_| SecretsError::Decryption("bad ephemeral key".into()))?;
    let (enc_key, mac_key) = derive_keys(&sk, &ephemeral);
    mac_tag(&mac_key, iv, ephemeral.to_encoded_point(false).as_bytes(), body)?
        .verify_slice(tag)
        .map_err(|_| SecretsError::Decryption("bad MAC".into()))?;

    let plain = Aes256CbcDec::new_from_slices(&enc_key, iv)
        .map_err(|e| SecretsError::Decryption(e.to_string()))?
        .decrypt_padded_vec_mut::<Pkcs7>(body)
        .map_err(|_| SecretsError::Decryption("bad padding".into()))?;
    String::from_utf8(plain).map_err(|_| SecretsError::Decryption("plaintext is not UTF-8".into()))
}

/// Recoverable signature over keccak256(message), `0x`-prefixed hex.
pub fn sign_message(private_key: &str, message: &str) -> Result<String> {
    let bytes = parse_private_key_bytes(private_key)
        .ok_or_else(|| SecretsError::Encryption("private key must be 32 bytes of hex".into()))?;
    let key = SigningKey::from_slice(&bytes)
        .map_err(|_| SecretsError::Encryption("private key out of range".into()))?;
    let (sig, recid) = key
        .sign_prehash_recoverable(&keccak256(message.as_bytes()))
        .map_err(|e| SecretsError::Encryption(e.to_string()))?;
    Ok(format!(
        "0x{}{:02x}",
        hex::encode(sig.to_bytes()),
        recid.to_byte() + 27
    ))
}

/// Uncompressed public key (64 bytes, no prefix) of the signer, as hex.
pub fn recover_public_key(message: &str, signature: &str) -> Result<String> {
    let raw = hex::decode(strip_0x(signature.trim()))
        .map_err(|e| SecretsError::Decryption(format!("signature is not hex: {e}")))?;
    if raw.len() != 65 {
        return Err(SecretsError::Decryption("signature must be 65 bytes".into()));
    }
    let sig = Signature::from_slice(&raw[..64])
        .map_err(|_| SecretsError::Decryption("malformed signature".into()))?;
    let v = raw[64];
    let recid = RecoveryId::try_from(if v >= 27 { v - 27 } else { v })
        .map_err(|_| SecretsError::Decryption(format!("bad recovery byte {v}")))?;
    let key = VerifyingKey::recover_from_prehash(&keccak256(message.as_bytes()), &sig, recid)
        .map_err(|_| SecretsError::Decryption("signature does not recover".into()))?;
    Ok(hex::encode(&key.to_encoded_point(false).as_bytes()[1..]))
}

/// Sign `message`, wrap `{message, signature}` as JSON and encrypt that.
pub fn encrypt_with_signature(
    signer_private_key: &str,
    recipient_public_key: &str,
    message: &str,
) -> Result<String> {
    let envelope = SecretsEnvelope {
        message: message.to_string(),
        signature: Some(sign_message(signer_private_key, message)?),
    };
    let payload =
        serde_json::to_string(&envelope).map_err(|e| SecretsError::Encryption(e.to_string()))?;
    encrypt(recipient_public_key, &payload)
}
