//! Contracts of the services the invitation core depends on.

use async_trait::async_trait;
use ident_common::models::{ThreePidInviteReply, ThreePidMapping};

/// Durable copy of pending invites. Read at startup, written on create/retire.
#[async_trait]
pub trait InviteStorage: Send + Sync {
    async fn list_invites(&self) -> anyhow::Result<Vec<ThreePidInviteReply>>;

    async fn insert_invite(&self, reply: &ThreePidInviteReply) -> anyhow::Result<()>;

    /// Deleting an id that is not stored is not an error.
    async fn delete_invite(&self, id: &str) -> anyhow::Result<()>;
}

/// Answers "is this 3PID bound, and to whom?".
#[async_trait]
pub trait MappingLookup: Send + Sync {
    /// `recursive` allows the lookup to consult other identity servers.
    async fn find(
        &self,
        medium: &str,
        address: &str,
        recursive: bool,
    ) -> anyhow::Result<Option<ThreePidMapping>>;
}

/// Sends the user-facing invite (email, SMS, …).
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    fn is_medium_supported(&self, medium: &str) -> bool;

    async fn send_for_invite(&self, reply: &ThreePidInviteReply) -> anyhow::Result<()>;
}
