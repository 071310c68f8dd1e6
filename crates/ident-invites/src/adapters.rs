//! Collaborator implementations wired in by the server binary.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use ident_common::config::NotificationConfig;
use ident_common::models::{ThreePidInviteReply, ThreePidMapping};
use ident_db::Database;
use ident_db::repository::{invites, mappings};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::collaborators::{InviteStorage, MappingLookup, NotificationDispatcher};

// ─── Storage ─────────────────────────────────────────────────────────────────

/// Invites persisted in the `threepid_invites` table.
#[derive(Clone)]
pub struct SqlInviteStorage {
    db: Database,
}

impl SqlInviteStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl InviteStorage for SqlInviteStorage {
    async fn list_invites(&self) -> anyhow::Result<Vec<ThreePidInviteReply>> {
        let rows = invites::list_invites(&self.db.pool).await?;
        rows.into_iter()
            .map(|row| {
                let id = row.id.clone();
                row.into_reply().with_context(|| format!("invalid stored invite {id}"))
            })
            .collect()
    }

    async fn insert_invite(&self, reply: &ThreePidInviteReply) -> anyhow::Result<()> {
        invites::insert_invite(&self.db.pool, reply).await?;
        Ok(())
    }

    async fn delete_invite(&self, id: &str) -> anyhow::Result<()> {
        if !invites::delete_invite(&self.db.pool, id).await? {
            debug!(id, "Invite was not stored, nothing to delete");
        }
        Ok(())
    }
}

// ─── Lookup ──────────────────────────────────────────────────────────────────

/// Bindings from the local `threepid_mappings` table.
///
/// This server has no upstream identity servers configured, so a recursive
/// lookup answers from the same table.
#[derive(Clone)]
pub struct SqlMappingLookup {
    db: Database,
}

impl SqlMappingLookup {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MappingLookup for SqlMappingLookup {
    async fn find(
        &self,
        medium: &str,
        address: &str,
        recursive: bool,
    ) -> anyhow::Result<Option<ThreePidMapping>> {
        debug!(medium, address, recursive, "Looking up 3PID mapping");
        let row = mappings::find_mapping(&self.db.pool, medium, address).await?;
        Ok(row.map(Into::into))
    }
}

// ─── Notification ────────────────────────────────────────────────────────────

fn supports(media: &[String], medium: &str) -> bool {
    media.iter().any(|m| m.eq_ignore_ascii_case(medium))
}

/// Logs invites instead of delivering them. Used when no webhook is configured.
pub struct LogNotifier {
    media: Vec<String>,
}

impl LogNotifier {
    pub fn new(media: Vec<String>) -> Self {
        Self { media }
    }
}

#[async_trait]
impl NotificationDispatcher for LogNotifier {
    fn is_medium_supported(&self, medium: &str) -> bool {
        supports(&self.media, medium)
    }

    async fn send_for_invite(&self, reply: &ThreePidInviteReply) -> anyhow::Result<()> {
        info!(
            medium = %reply.invite.medium,
            address = %reply.invite.address,
            room_id = %reply.invite.room_id,
            sender = %reply.invite.sender,
            "No notification webhook configured, invite logged only"
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookInvite<'a> {
    medium: &'a str,
    address: &'a str,
    sender: &'a str,
    room_id: &'a str,
    token: &'a str,
    display_name: &'a str,
    properties: &'a BTreeMap<String, String>,
}

/// POSTs each invite to an external delivery service (mailer, SMS gateway).
pub struct WebhookNotifier {
    media: Vec<String>,
    url: String,
    http: Client,
}

impl WebhookNotifier {
    pub fn new(media: Vec<String>, url: impl Into<String>) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("identd/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { media, url: url.into(), http })
    }
}

#[async_trait]
impl NotificationDispatcher for WebhookNotifier {
    fn is_medium_supported(&self, medium: &str) -> bool {
        supports(&self.media, medium)
    }

    async fn send_for_invite(&self, reply: &ThreePidInviteReply) -> anyhow::Result<()> {
        let invite = &reply.invite;
        let body = WebhookInvite {
            medium: &invite.medium,
            address: &invite.address,
            sender: invite.sender.as_str(),
            room_id: &invite.room_id,
            token: &reply.token,
            display_name: &reply.display_name,
            properties: &invite.properties,
        };
        let resp = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .context("notification webhook unreachable")?;
        let status = resp.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Notification webhook refused invite");
            anyhow::bail!("notification webhook answered {status}");
        }
        debug!(id = %reply.id, "Invite notification handed to webhook");
        Ok(())
    }
}

/// Pick the notifier matching `config`.
pub fn notifier_from_config(config: &NotificationConfig) -> anyhow::Result<Arc<dyn NotificationDispatcher>> {
    Ok(match &config.webhook_url {
        Some(url) => {
            info!(url = %url, "Invite notifications go to webhook");
            Arc::new(WebhookNotifier::new(config.media.clone(), url.clone())?)
        }
        None => Arc::new(LogNotifier::new(config.media.clone())),
    })
}
