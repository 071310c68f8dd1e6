//! Invite repository: durable copy of pending 3PID invites.
//!
//! Only written on creation and deletion; read once at startup.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ident_common::models::{MatrixId, ThreePidInvite, ThreePidInviteReply};
use sqlx::{AnyPool, Row};

use crate::any_compat::{format_datetime, get_datetime, get_json};

/// Invite row.
#[derive(Debug, Clone)]
pub struct InviteRow {
    pub id: String,
    pub token: String,
    pub sender: String,
    pub medium: String,
    pub address: String,
    pub room_id: String,
    pub display_name: String,
    pub properties: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for InviteRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        Ok(InviteRow {
            id: row.try_get("id")?,
            token: row.try_get("token")?,
            sender: row.try_get("sender")?,
            medium: row.try_get("medium")?,
            address: row.try_get("address")?,
            room_id: row.try_get("room_id")?,
            display_name: row.try_get("display_name")?,
            properties: get_json(row, "properties")?,
            created_at: get_datetime(row, "created_at")?,
        })
    }
}

impl InviteRow {
    /// Rehydrate the invite and its reply. The id is recomputed, never trusted from the row.
    pub fn into_reply(self) -> anyhow::Result<ThreePidInviteReply> {
        let invite = ThreePidInvite {
            sender: MatrixId::parse(&self.sender)?,
            medium: self.medium,
            address: self.address,
            room_id: self.room_id,
            properties: self.properties,
        };
        Ok(ThreePidInviteReply::restore(invite, self.token, self.display_name))
    }
}

/// Persist a newly created invite reply.
pub async fn insert_invite(pool: &AnyPool, reply: &ThreePidInviteReply) -> Result<(), sqlx::Error> {
    let properties = serde_json::to_string(&reply.invite.properties)
        .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
    sqlx::query(
        r#"
        INSERT INTO threepid_invites
            (id, token, sender, medium, address, room_id, display_name, properties, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(&reply.id)
    .bind(&reply.token)
    .bind(reply.invite.sender.as_str())
    .bind(&reply.invite.medium)
    .bind(&reply.invite.address)
    .bind(&reply.invite.room_id)
    .bind(&reply.display_name)
    .bind(properties)
    .bind(format_datetime(Utc::now()))
    .execute(pool)
    .await?;
    Ok(())
}

/// All stored invites, oldest first.
pub async fn list_invites(pool: &AnyPool) -> Result<Vec<InviteRow>, sqlx::Error> {
    sqlx::query_as::<_, InviteRow>("SELECT * FROM threepid_invites ORDER BY created_at ASC")
        .fetch_all(pool)
        .await
}

/// Delete an invite by id. Returns whether a row was removed.
pub async fn delete_invite(pool: &AnyPool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM threepid_invites WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
