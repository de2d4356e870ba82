use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::pkcs8::DecodePublicKey;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use log::warn;
use serde::{Deserialize, Serialize};

/// Public keys currently valid for an event's signed tickets.
///
/// `version` increases whenever a pull changes the key list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedKeySet {
    pub version: i64,
    pub valid_keys: Vec<String>,
}

impl SignedKeySet {
    pub fn is_empty(&self) -> bool {
        self.valid_keys.is_empty()
    }
}

/// Parses a PEM public key, or a base64 wrapper around one.
pub fn parse_public_key(material: &str) -> Option<VerifyingKey> {
    let trimmed = material.trim();
    let pem = if trimmed.starts_with("-----BEGIN") {
        trimmed.to_string()
    } else {
        let decoded = STANDARD.decode(trimmed).ok()?;
        String::from_utf8(decoded).ok()?
    };
    VerifyingKey::from_public_key_pem(pem.trim()).ok()
}

/// Returns true when any candidate key validates `signature` over `payload`.
///
/// Keys are tried in order. Unparseable keys are logged and skipped.
pub fn verify_signature(signature: &[u8], payload: &[u8], candidate_keys: &[String]) -> bool {
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };

    candidate_keys.iter().any(|material| match parse_public_key(material) {
        Some(key) => key.verify(payload, &signature).is_ok(),
        None => {
            warn!("[Tickets] Skipping unparseable signing key");
            false
        }
    })
}
