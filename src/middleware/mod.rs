//! Request filters guarding the peering endpoints.
//!
//! `signature` authenticates the body against the registry; `token`
//! enforces the single-use session token. Both buffer the body and pass
//! it through untouched.

pub mod signature;
pub mod token;

use axum::body::Bytes;
use axum::http::StatusCode;

/// Body size cap for signed requests.
pub const MAX_BODY: usize = 64 * 1024;

/// Pull the integer `ASN` field out of a JSON body.
pub(crate) fn asn_from_body(
    body: &Bytes,
) -> Result<(serde_json::Value, u32), (StatusCode, String)> {
    let jbody: serde_json::Value = serde_json::from_slice(body)
        .map_err(|_| (StatusCode::BAD_REQUEST, "Body is not a valid JSON".to_string()))?;
    let value = jbody
        .get("ASN")
        .ok_or((StatusCode::BAD_REQUEST, "ASN not found in body".to_string()))?;
    let asn = value
        .as_u64()
        .and_then(|asn| u32::try_from(asn).ok())
        .ok_or((StatusCode::BAD_REQUEST, "ASN is not an integer".to_string()))?;
    Ok((jbody, asn))
}
