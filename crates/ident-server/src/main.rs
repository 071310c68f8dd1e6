//! # identd
//!
//! Single binary running the identity API and the pending-invite machinery:
//! - REST API (store-invite, lookup, pubkey, admin bind)
//! - Reconciliation timer re-checking pending invites
//! - Signed `onbind` callbacks to inviting homeservers

use clap::Parser;
use ident_api::{AppState, build_router};
use ident_db::Database;
use ident_federation::{
    ConfigDnsOverride, FederationClient, HickorySrvResolver, HomeserverResolver, KeyManager,
    ServerSigner,
};
use ident_invites::adapters::{SqlInviteStorage, SqlMappingLookup, notifier_from_config};
use ident_invites::{Collaborators, InvitationManager};
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "identd", version, about = "Matrix identity server with pending 3PID invites")]
struct Args {
    /// Config file; `identd.toml` in the working directory is used when omitted.
    #[arg(short, long, env = "IDENTD_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = ident_common::config::init(args.config.as_deref())?;

    // Initialize tracing (structured logging)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "identd=debug,ident_invites=debug,tower_http=debug".into()),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();

    tracing::info!("Starting identd v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("   server name: {}", config.server.name);

    // Connect to database
    let db = Database::connect(&config.database).await?;

    // Run migrations
    db.migrate().await?;

    // === Signing key ===
    // Load the active Ed25519 key from DB, or generate + persist a new one on first run.
    let key = KeyManager::new(db.clone()).load_or_generate().await?;
    tracing::info!("Signing key ready: {}", key.key_id);
    let signer = Arc::new(ServerSigner::new(config.server.name.clone(), key));

    // === Federation plumbing ===
    let federation = &config.federation;
    if !federation.verify_tls {
        tracing::warn!("TLS verification of homeserver certificates is disabled");
    }
    let transport = Arc::new(FederationClient::new(federation.request_timeout(), federation.verify_tls)?);
    let resolver = HomeserverResolver::new(
        Arc::new(ConfigDnsOverride::new(&federation.dns_overrides)),
        Arc::new(HickorySrvResolver::from_system_conf()?),
    );

    // === Invitations ===
    let manager = Arc::new(InvitationManager::new(
        config.invitation.clone(),
        Collaborators {
            storage: Arc::new(SqlInviteStorage::new(db.clone())),
            lookup: Arc::new(SqlMappingLookup::new(db.clone())),
            notifier: notifier_from_config(&config.notification)?,
            signer: signer.clone(),
            transport,
            resolver,
        },
    ));
    // Refuse to serve with an incomplete invite set.
    manager.start().await?;

    // === REST API Server ===
    let api_state = AppState {
        db,
        manager: manager.clone(),
        signer,
        public_url: config.server.public_base_url(),
        admin_token: config.admin.token.clone(),
    };
    if api_state.admin_token.is_none() {
        tracing::info!("admin.token not set, admin API disabled");
    }
    let api_router = build_router(api_state);
    let api_addr = SocketAddr::new(config.server.host.parse()?, config.server.port);

    tracing::info!("REST API listening on http://{api_addr}");
    let listener = tokio::net::TcpListener::bind(api_addr).await?;
    axum::serve(listener, api_router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP server stopped, draining invitation tasks");
    manager.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Unable to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
