use super::{asn_from_body, MAX_BODY};
use crate::app::AppState;
use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

/// Enforce the single-use session token minted by `/login/`.
///
/// The token travels inside the signed body; a successful check
/// consumes the cache entry, so each token authorizes exactly one call.
pub async fn require_token(
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

    let (jbody, asn) = asn_from_body(&bytes)?;
    let token = jbody
        .get("token")
        .and_then(serde_json::Value::as_str)
        .ok_or((StatusCode::BAD_REQUEST, "token not found in body".to_string()))?;

    if !app.tokens.take(asn, token) {
        warn!("rejected token for AS{asn}");
        return Err((StatusCode::UNAUTHORIZED, "ASN is not logged in".to_string()));
    }

    debug!("consumed session token for AS{asn}");
    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}
