pub mod peers;

#[cfg(test)]
pub mod test_helpers;

use crate::app::AppState;
use crate::middleware::{signature, token};
use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

/// Build the front-end router.
///
/// `/login/` is guarded by the signature filter alone; everything under
/// `/peer` additionally requires a live session token. The signature
/// filter is the outer layer, so it always runs first.
pub fn router(state: AppState) -> Router {
    let login = Router::new().route("/login/", post(peers::login)).layer(
        middleware::from_fn_with_state(state.clone(), signature::verify_signature),
    );

    let peer = Router::new()
        .route("/info", post(peers::info))
        .route("/create", post(peers::create))
        .route("/delete", delete(peers::delete))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            token::require_token,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            signature::verify_signature,
        ));

    Router::new()
        .route("/", get(root))
        .merge(login)
        .nest("/peer", peer)
        .with_state(state)
}

async fn root() -> &'static str {
    "autopeerd v0.1.0"
}
