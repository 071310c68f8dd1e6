//! # ident-api
//!
//! HTTP layer for identd: the identity-service endpoints inviting homeservers
//! call (`store-invite`, `lookup`, `pubkey`), an admin endpoint that records
//! new bindings, and a health check.

pub mod middleware;
pub mod routes;

use axum::Router;
use ident_db::Database;
use ident_federation::ServerSigner;
use ident_invites::InvitationManager;
use std::sync::Arc;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    /// Pending invites and their reconciliation.
    pub manager: Arc<InvitationManager>,
    /// Server name and active Ed25519 key; signs lookups and callbacks.
    pub signer: Arc<ServerSigner>,
    /// Externally reachable base URL, used for `key_validity_url`.
    pub public_url: String,
    /// Bearer token for `/_identd/admin`; `None` disables those routes.
    pub admin_token: Option<String>,
}

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let state = Arc::new(state);

    Router::new()
        .nest("/_matrix/identity/api/v1", routes::identity::router())
        .nest("/_identd/admin/v1", routes::admin::router(state.clone()))
        .merge(routes::health::router())
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::compression::CompressionLayer::new())
        .with_state(state)
}
