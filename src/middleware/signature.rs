use super::{asn_from_body, MAX_BODY};
use crate::app::AppState;
use crate::gpg::{self, GpgError};
use crate::registry;
use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use tracing::{debug, warn};

/// Authenticate the request body against the DN42 registry.
///
/// The detached PGP signature arrives base64-encoded in the
/// `X-DN42-Signature` header and must cover the exact body bytes. The
/// signer's key fingerprint and user-id email have to match what the
/// registry publishes for the claimed ASN. Empty bodies pass through
/// untouched.
pub async fn verify_signature(
    State(app): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, (StatusCode, String)> {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_BODY)
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Failed to read body: {e}")))?;
    if bytes.is_empty() {
        return Ok(next.run(Request::from_parts(parts, Body::empty())).await);
    }

    let (_, asn) = asn_from_body(&bytes)?;
    debug!("verifying signature for AS{asn}");

    let signature_raw = parts.headers.get("X-DN42-Signature").ok_or((
        StatusCode::BAD_REQUEST,
        "X-DN42-Signature header not found".to_string(),
    ))?;
    let signature = BASE64.decode(signature_raw.as_bytes()).map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            "X-DN42-Signature header is not a valid base64 string".to_string(),
        )
    })?;

    let registry_root = &app.config.autopeer.registry;
    let email = registry::email(registry_root, asn)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    let fingerprint = registry::pgp_fingerprint(registry_root, asn)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    if let Err(e) = app.verifier.locate_key(&email).await {
        // the local keyring is canonical, a failed fetch is not fatal
        debug!("key fetch for {email} failed: {e}");
    }

    let signer = app
        .verifier
        .verify_detached(&bytes, &signature, &email)
        .await
        .map_err(|e| match e {
            GpgError::BadSignature(_) => (StatusCode::UNAUTHORIZED, e.to_string()),
            _ => (StatusCode::BAD_REQUEST, e.to_string()),
        })?;

    if !signer
        .emails
        .iter()
        .any(|signer_email| signer_email.eq_ignore_ascii_case(&email))
    {
        warn!("AS{asn}: signer uid does not carry {email}");
        return Err((StatusCode::UNAUTHORIZED, "PGP email mismatch".to_string()));
    }
    if signer.fingerprint != gpg::normalize_fingerprint(&fingerprint) {
        warn!(
            "AS{asn}: signer fingerprint {} does not match registry {fingerprint}",
            signer.fingerprint
        );
        return Err((
            StatusCode::UNAUTHORIZED,
            "PGP fingerprint mismatch".to_string(),
        ));
    }

    debug!("AS{asn} request body verified");
    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}
