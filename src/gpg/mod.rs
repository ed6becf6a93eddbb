//! PGP verification of signed request bodies.
//!
//! Key material comes from the local GnuPG keyring (with a best-effort
//! network fetch by email); the verification itself runs in-process on
//! the exported key. The capability is a trait so tests can inject a
//! double.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use once_cell::sync::Lazy;
use pgp::composed::{Deserializable, DetachedSignature, SignedPublicKey};
use pgp::packet::{Packet, PacketParser};
use pgp::types::KeyDetails;
use regex::Regex;
use std::io::Cursor;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum GpgError {
    #[error("no public key for {0} in the local keyring")]
    KeyNotFound(String),
    #[error("failed to parse public key: {0}")]
    KeyParse(String),
    #[error("failed to parse signature: {0}")]
    SignatureParse(String),
    #[error("expected exactly one signature, found {0}")]
    SignatureCount(usize),
    #[error("signature verification failed: {0}")]
    BadSignature(String),
    #[error("failed to run gpg: {0}")]
    Gpg(#[from] std::io::Error),
}

/// Identity attested by a verified signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signer {
    /// Primary key fingerprint, normalized uppercase without spaces.
    pub fingerprint: String,
    /// Emails from the key's user IDs.
    pub emails: Vec<String>,
}

#[async_trait]
pub trait PgpVerifier: Send + Sync {
    /// Best-effort fetch of the signer's key; the local keyring stays
    /// canonical, so callers may ignore failures.
    async fn locate_key(&self, email: &str) -> Result<(), GpgError>;

    /// Verify a detached signature over the exact body bytes against the
    /// key registered for `email`.
    async fn verify_detached(
        &self,
        body: &[u8],
        signature: &[u8],
        email: &str,
    ) -> Result<Signer, GpgError>;
}

/// Production verifier backed by the local GnuPG keyring.
pub struct GnupgKeyring;

#[async_trait]
impl PgpVerifier for GnupgKeyring {
    async fn locate_key(&self, email: &str) -> Result<(), GpgError> {
        let output = tokio::process::Command::new("gpg")
            .args(["--batch", "--locate-keys", email])
            .output()
            .await?;
        if !output.status.success() {
            return Err(GpgError::KeyNotFound(email.to_string()));
        }
        Ok(())
    }

    async fn verify_detached(
        &self,
        body: &[u8],
        signature: &[u8],
        email: &str,
    ) -> Result<Signer, GpgError> {
        let output = tokio::process::Command::new("gpg")
            .args(["--batch", "--export", "--armor", email])
            .output()
            .await?;
        let armored = String::from_utf8_lossy(&output.stdout).to_string();
        if !output.status.success() || armored.trim().is_empty() {
            return Err(GpgError::KeyNotFound(email.to_string()));
        }
        verify_with_key(&armored, body, signature)
    }
}

/// Verify a detached signature against one armored public key.
///
/// The signature may be binary or armored; exactly one signature packet
/// is accepted.
pub fn verify_with_key(
    armored_key: &str,
    body: &[u8],
    signature: &[u8],
) -> Result<Signer, GpgError> {
    let (key, _headers) = SignedPublicKey::from_string(armored_key)
        .map_err(|e| GpgError::KeyParse(e.to_string()))?;

    let raw = if signature.starts_with(b"-----BEGIN") {
        armor_payload(signature)?
    } else {
        signature.to_vec()
    };

    let count = count_signature_packets(&raw)?;
    if count != 1 {
        return Err(GpgError::SignatureCount(count));
    }

    let sig = DetachedSignature::from_bytes(Cursor::new(&raw[..]))
        .map_err(|e| GpgError::SignatureParse(e.to_string()))?;
    sig.verify(&key, body)
        .map_err(|e| GpgError::BadSignature(e.to_string()))?;

    let fingerprint = normalize_fingerprint(&format!("{:X}", key.fingerprint()));
    let emails = user_emails(&key);
    debug!("valid signature from {fingerprint} ({emails:?})");
    Ok(Signer { fingerprint, emails })
}

/// Uppercase, space-free fingerprint form used for comparisons.
pub fn normalize_fingerprint(fingerprint: &str) -> String {
    fingerprint.replace(' ', "").to_uppercase()
}

/// Extract the binary payload of an ASCII-armored signature block.
fn armor_payload(signature: &[u8]) -> Result<Vec<u8>, GpgError> {
    let text = std::str::from_utf8(signature)
        .map_err(|e| GpgError::SignatureParse(e.to_string()))?;

    let mut lines = text.lines().map(str::trim);
    for line in &mut lines {
        if line.starts_with("-----BEGIN PGP SIGNATURE") {
            break;
        }
    }

    let mut encoded = String::new();
    let mut in_headers = true;
    for line in lines {
        if line.starts_with("-----END") {
            break;
        }
        if in_headers {
            if line.is_empty() {
                in_headers = false;
            } else if !line.contains(':') {
                // no armor headers at all
                in_headers = false;
                encoded.push_str(line);
            }
            continue;
        }
        // the CRC line starts with '='; base64 padding never does
        if line.starts_with('=') {
            break;
        }
        encoded.push_str(line);
    }

    if encoded.is_empty() {
        return Err(GpgError::SignatureParse(
            "no armored signature payload found".to_string(),
        ));
    }
    BASE64
        .decode(encoded.as_bytes())
        .map_err(|e| GpgError::SignatureParse(e.to_string()))
}

fn count_signature_packets(raw: &[u8]) -> Result<usize, GpgError> {
    let mut count = 0;
    for packet in PacketParser::new(Cursor::new(raw)) {
        match packet {
            Ok(Packet::Signature(_)) => count += 1,
            Ok(_) => {}
            Err(e) => return Err(GpgError::SignatureParse(e.to_string())),
        }
    }
    Ok(count)
}

static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<([^<>\s]+@[^<>\s]+)>").unwrap());

fn user_emails(key: &SignedPublicKey) -> Vec<String> {
    key.details
        .users
        .iter()
        .filter_map(|user| {
            let uid = String::from_utf8_lossy(user.id.id()).to_string();
            extract_email(&uid)
        })
        .collect()
}

fn extract_email(uid: &str) -> Option<String> {
    if let Some(captures) = EMAIL_PATTERN.captures(uid) {
        return Some(captures[1].to_string());
    }
    let trimmed = uid.trim();
    if trimmed.contains('@') && !trimmed.contains(char::is_whitespace) {
        return Some(trimmed.to_string());
    }
    None
}
