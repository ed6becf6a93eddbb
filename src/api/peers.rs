use crate::app::AppState;
use crate::db::DbError;
use crate::ipc::{Command, IpcError};
use crate::peer::PeerInfo;
use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct AsnRequest {
    #[serde(rename = "ASN")]
    asn: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, (StatusCode, String)> {
    serde_json::from_slice(body)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Invalid request body: {e}")))
}

fn worker_unreachable(e: IpcError) -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("worker unreachable: {e}"),
    )
}

fn db_error(e: DbError) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

/// POST /login/ - mint a single-use session token.
///
/// The body has already been authenticated by the signature filter; the
/// session exists only in memory.
pub async fn login(
    State(app): State<AppState>,
    body: Bytes,
) -> Result<Json<LoginResponse>, (StatusCode, String)> {
    let request: AsnRequest = parse_body(&body)?;
    let token = app.tokens.issue(request.asn);
    info!("issued session token for AS{}", request.asn);
    Ok(Json(LoginResponse { token }))
}

/// POST /peer/info - report the stored peering for an ASN.
pub async fn info(
    State(app): State<AppState>,
    body: Bytes,
) -> Result<Json<MessageResponse>, (StatusCode, String)> {
    let request: AsnRequest = parse_body(&body)?;
    let message = match app.db.get(request.asn).map_err(db_error)? {
        Some(peer) => serde_json::to_string(&peer)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?,
        None => format!("No peering configured for AS{}", request.asn),
    };
    Ok(Json(MessageResponse { message }))
}

/// POST /peer/create - provision a new peering.
///
/// The tunnel is created first, then bgpd is rebuilt with the full peer
/// list. If the bgpd step fails the fresh interface is taken back down
/// before the error is reported; the peer row is only persisted once
/// both steps have succeeded.
pub async fn create(
    State(app): State<AppState>,
    body: Bytes,
) -> Result<Json<MessageResponse>, (StatusCode, String)> {
    let mut peer: PeerInfo = parse_body(&body)?;
    peer.validate()
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    if app.db.get(peer.asn).map_err(db_error)?.is_some() {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("AS{} is already peered", peer.asn),
        ));
    }
    if let Some(conflict) = app.db.conflicts(&peer).map_err(db_error)? {
        return Err((StatusCode::BAD_REQUEST, conflict));
    }

    let created = app
        .worker
        .call(&Command::WgCreate { peer: peer.clone() })
        .await
        .map_err(worker_unreachable)?;
    if !created.success {
        return Err((StatusCode::INTERNAL_SERVER_ERROR, created.error_message()));
    }

    let mut peers = app.db.list().map_err(db_error)?;
    peers.push(peer.clone());
    let updated = app
        .worker
        .call(&Command::BgpUpdate { peers })
        .await
        .map_err(worker_unreachable)?;
    if !updated.success {
        // bgpd rejected the new set; take the fresh interface back down
        warn!(
            "bgp update for AS{} failed, removing {}",
            peer.asn,
            peer.interface()
        );
        match app.worker.call(&Command::WgDelete { peer: peer.clone() }).await {
            Ok(deleted) if deleted.success => {}
            Ok(deleted) => warn!(
                "cleanup of {} failed: {}",
                peer.interface(),
                deleted.error_message()
            ),
            Err(e) => warn!("cleanup of {} failed: {e}", peer.interface()),
        }
        return Err((StatusCode::INTERNAL_SERVER_ERROR, updated.error_message()));
    }

    app.db.insert(&peer).map_err(db_error)?;
    info!(
        "peering with AS{} established on {}",
        peer.asn,
        peer.interface()
    );
    Ok(Json(MessageResponse {
        message: format!(
            "Autopeering with AS{} established on interface {}",
            peer.asn,
            peer.interface()
        ),
    }))
}

/// DELETE /peer/delete - tear down an existing peering.
pub async fn delete(
    State(app): State<AppState>,
    body: Bytes,
) -> Result<Json<DeleteResponse>, (StatusCode, String)> {
    let request: AsnRequest = parse_body(&body)?;
    let peer = app
        .db
        .get(request.asn)
        .map_err(db_error)?
        .ok_or((
            StatusCode::BAD_REQUEST,
            format!("No peering configured for AS{}", request.asn),
        ))?;

    let deleted = app
        .worker
        .call(&Command::WgDelete { peer: peer.clone() })
        .await
        .map_err(worker_unreachable)?;
    if !deleted.success {
        return Err((StatusCode::INTERNAL_SERVER_ERROR, deleted.error_message()));
    }

    let remaining: Vec<PeerInfo> = app
        .db
        .list()
        .map_err(db_error)?
        .into_iter()
        .filter(|stored| stored.asn != request.asn)
        .collect();
    let updated = app
        .worker
        .call(&Command::BgpUpdate { peers: remaining })
        .await
        .map_err(worker_unreachable)?;
    if !updated.success {
        return Err((StatusCode::INTERNAL_SERVER_ERROR, updated.error_message()));
    }

    app.db.remove(request.asn).map_err(db_error)?;
    info!("peering with AS{} removed", request.asn);
    Ok(Json(DeleteResponse {
        success: true,
        message: format!("Peering with AS{} removed", request.asn),
    }))
}
