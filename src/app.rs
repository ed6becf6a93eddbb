use crate::config::AppConfig;
use crate::db::PeerDb;
use crate::gpg::PgpVerifier;
use crate::ipc::client::WorkerChannel;
use crate::session::TokenCache;
use std::sync::Arc;

/// Process-wide front-end state, threaded through every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub tokens: Arc<TokenCache>,
    pub db: Arc<PeerDb>,
    pub worker: Arc<WorkerChannel>,
    pub verifier: Arc<dyn PgpVerifier>,
}
