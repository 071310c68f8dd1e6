//! DB-backed server signing key management.
//!
//! On startup, `KeyManager::load_or_generate` queries `signing_keys` for the
//! most recent active key. If none exists (first run), it generates a fresh
//! Ed25519 pair, persists it, and returns it.
//!
//! # Key rotation
//! Deactivate the old row (`is_active = 0`) and restart; a new key is generated.
//! Retired keys stay queryable through the `pubkey/{keyId}` endpoint.

use std::sync::Arc;

use ident_db::{Database, repository::signing_keys};
use tracing::{info, warn};

use crate::{error::FederationError, keys::ServerKeyPair};

// ─── Key manager ─────────────────────────────────────────────────────────────

/// Handles loading or provisioning this server's Ed25519 signing key.
pub struct KeyManager {
    db: Database,
}

impl KeyManager {
    /// Create a new `KeyManager` backed by the given database.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Return the active `ServerKeyPair` for this server.
    ///
    /// Steps:
    /// 1. Query `signing_keys` for the newest active key.
    /// 2. If found, reconstruct from the stored seed and return it.
    /// 3. If not found, generate a new pair, persist it, and return it.
    pub async fn load_or_generate(&self) -> Result<Arc<ServerKeyPair>, FederationError> {
        // ── 1. Try loading from DB ────────────────────────────────────────────
        if let Some(row) = signing_keys::find_active_key(&self.db.pool).await? {
            let kp = ServerKeyPair::from_seed_base64(&row.seed_b64)?;
            if kp.key_id != row.key_id {
                return Err(FederationError::KeyLoad(format!(
                    "stored key id {} does not match its seed ({})",
                    row.key_id, kp.key_id
                )));
            }
            info!("Federation: loaded active signing key {}", row.key_id);
            return Ok(Arc::new(kp));
        }

        // ── 2. Nothing found: generate + persist ────────────────────────────
        warn!("No active signing key, generating a new Ed25519 key pair");

        let kp = ServerKeyPair::generate();
        signing_keys::insert_key(&self.db.pool, &kp.key_id, &kp.seed_base64(), &kp.public_key_base64())
            .await?;

        info!("Federation: generated and persisted new signing key {}", kp.key_id);
        Ok(Arc::new(kp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn generates_once_then_reloads() {
        let db = Database::in_memory().await.unwrap();
        let manager = KeyManager::new(db);

        let first = manager.load_or_generate().await.unwrap();
        let second = manager.load_or_generate().await.unwrap();
        assert_eq!(first.key_id, second.key_id);
        assert_eq!(first.public_key_base64(), second.public_key_base64());
    }
}
