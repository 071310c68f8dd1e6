//! Signing key repository: the server's Ed25519 seed, base64-encoded.

use chrono::{DateTime, Utc};
use sqlx::{AnyPool, Row};

use crate::any_compat::{format_datetime, get_datetime, get_flag};

/// Signing key row.
#[derive(Debug, Clone)]
pub struct SigningKeyRow {
    pub key_id: String,
    pub seed_b64: String,
    pub public_key_b64: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for SigningKeyRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        Ok(SigningKeyRow {
            key_id: row.try_get("key_id")?,
            seed_b64: row.try_get("seed_b64")?,
            public_key_b64: row.try_get("public_key_b64")?,
            is_active: get_flag(row, "is_active")?,
            created_at: get_datetime(row, "created_at")?,
        })
    }
}

/// Most recently created active key, if any.
pub async fn find_active_key(pool: &AnyPool) -> Result<Option<SigningKeyRow>, sqlx::Error> {
    sqlx::query_as::<_, SigningKeyRow>(
        "SELECT * FROM signing_keys WHERE is_active = 1 ORDER BY created_at DESC LIMIT 1",
    )
    .fetch_optional(pool)
    .await
}

/// Look up any key (active or retired) by id, for public key queries.
pub async fn find_key(pool: &AnyPool, key_id: &str) -> Result<Option<SigningKeyRow>, sqlx::Error> {
    sqlx::query_as::<_, SigningKeyRow>("SELECT * FROM signing_keys WHERE key_id = $1")
        .bind(key_id)
        .fetch_optional(pool)
        .await
}

/// Is this base64 public key one of ours and still active?
pub async fn is_active_public_key(pool: &AnyPool, public_key_b64: &str) -> Result<bool, sqlx::Error> {
    let row = sqlx::query("SELECT 1 FROM signing_keys WHERE public_key_b64 = $1 AND is_active = 1")
        .bind(public_key_b64)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

/// Store a freshly generated key as active.
pub async fn insert_key(
    pool: &AnyPool,
    key_id: &str,
    seed_b64: &str,
    public_key_b64: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO signing_keys (key_id, seed_b64, public_key_b64, is_active, created_at)
        VALUES ($1, $2, $3, 1, $4)
        ON CONFLICT (key_id) DO NOTHING
        "#,
    )
    .bind(key_id)
    .bind(seed_b64)
    .bind(public_key_b64)
    .bind(format_datetime(Utc::now()))
    .execute(pool)
    .await?;
    Ok(())
}
