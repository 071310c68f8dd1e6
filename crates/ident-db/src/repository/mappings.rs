//! Mapping repository: locally known 3PID → Matrix ID bindings.
//!
//! Medium and address are stored lowercased so lookups are case-insensitive.

use chrono::{DateTime, Utc};
use ident_common::models::ThreePidMapping;
use sqlx::{AnyPool, Row};

use crate::any_compat::{format_datetime, get_datetime};

/// Mapping row.
#[derive(Debug, Clone)]
pub struct MappingRow {
    pub medium: String,
    pub address: String,
    pub mxid: String,
    pub created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for MappingRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        Ok(MappingRow {
            medium: row.try_get("medium")?,
            address: row.try_get("address")?,
            mxid: row.try_get("mxid")?,
            created_at: get_datetime(row, "created_at")?,
        })
    }
}

impl From<MappingRow> for ThreePidMapping {
    fn from(row: MappingRow) -> Self {
        ThreePidMapping::new(row.medium, row.address, row.mxid)
    }
}

/// Find the binding for `medium:address`.
pub async fn find_mapping(
    pool: &AnyPool,
    medium: &str,
    address: &str,
) -> Result<Option<MappingRow>, sqlx::Error> {
    sqlx::query_as::<_, MappingRow>(
        "SELECT * FROM threepid_mappings WHERE medium = $1 AND address = $2",
    )
    .bind(medium.to_lowercase())
    .bind(address.to_lowercase())
    .fetch_optional(pool)
    .await
}

/// Create or replace the binding for the mapping's 3PID.
pub async fn upsert_mapping(pool: &AnyPool, mapping: &ThreePidMapping) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO threepid_mappings (medium, address, mxid, created_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (medium, address) DO UPDATE SET
            mxid = excluded.mxid,
            created_at = excluded.created_at
        "#,
    )
    .bind(mapping.medium.to_lowercase())
    .bind(mapping.address.to_lowercase())
    .bind(&mapping.mxid)
    .bind(format_datetime(Utc::now()))
    .execute(pool)
    .await?;
    Ok(())
}
