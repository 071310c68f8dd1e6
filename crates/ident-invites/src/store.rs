//! In-memory index of pending invites, backed by [`InviteStorage`].
//!
//! Memory is canonical while the process runs; storage is read once by
//! [`InviteStore::load`] and otherwise only written (insert on create, delete
//! on retire). Entries are immutable `Arc`s, so readers never observe a
//! partially built reply.

use std::collections::HashMap;
use std::sync::Arc;

use ident_common::models::{ThreePidInvite, ThreePidInviteReply, invite_id};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::collaborators::InviteStorage;
use crate::error::InviteError;

/// Outcome of [`InviteStore::try_create`].
#[derive(Debug, Clone)]
pub enum Slot {
    /// A reply already exists for this invite's id.
    Existing(Arc<ThreePidInviteReply>),
    /// No reply yet; the caller persists one and calls [`InviteStore::insert`].
    Vacant(String),
}

pub struct InviteStore {
    index: RwLock<HashMap<String, Arc<ThreePidInviteReply>>>,
    storage: Arc<dyn InviteStorage>,
}

impl InviteStore {
    pub fn new(storage: Arc<dyn InviteStorage>) -> Self {
        Self { index: RwLock::new(HashMap::new()), storage }
    }

    /// Replace the index with everything in durable storage.
    ///
    /// Any storage failure is returned as-is: serving with a partial index would
    /// silently drop pending invites.
    pub async fn load(&self) -> Result<usize, InviteError> {
        info!("Loading saved invites");
        let stored = self.storage.list_invites().await.map_err(InviteError::Storage)?;

        let mut index = HashMap::with_capacity(stored.len());
        for reply in stored {
            // Ids are recomputed so older rows keyed differently still collapse correctly.
            let reply = ThreePidInviteReply::restore(reply.invite, reply.token, reply.display_name);
            debug!(invite = %reply.invite.log_id(), "Processing saved invite");
            if let Some(previous) = index.insert(reply.id.clone(), Arc::new(reply)) {
                warn!(id = %previous.id, "Two stored invites share an id, keeping the later one");
            }
        }

        let count = index.len();
        *self.index.write().await = index;
        info!(count, "Loaded saved invites");
        Ok(count)
    }

    /// Look up the slot for `invite` by its derived id.
    pub async fn try_create(&self, invite: &ThreePidInvite) -> Slot {
        let id = invite_id(invite);
        match self.index.read().await.get(&id) {
            Some(existing) => Slot::Existing(existing.clone()),
            None => Slot::Vacant(id),
        }
    }

    /// Add an already persisted reply. Refuses ids that are present.
    pub async fn insert(&self, reply: ThreePidInviteReply) -> Result<Arc<ThreePidInviteReply>, InviteError> {
        let id = invite_id(&reply.invite);
        let mut index = self.index.write().await;
        if index.contains_key(&id) {
            return Err(InviteError::AlreadyPresent(id));
        }
        let reply = Arc::new(ThreePidInviteReply { id: id.clone(), ..reply });
        index.insert(id, reply.clone());
        Ok(reply)
    }

    /// Drop an invite from memory and storage. Absent ids are a no-op.
    ///
    /// Returns whether the invite was present in memory.
    pub async fn remove(&self, id: &str) -> Result<bool, InviteError> {
        let removed = self.index.write().await.remove(id).is_some();
        self.storage.delete_invite(id).await.map_err(InviteError::Storage)?;
        Ok(removed)
    }

    /// The durable collaborator, for callers that persist before [`InviteStore::insert`].
    pub fn storage(&self) -> &dyn InviteStorage {
        self.storage.as_ref()
    }

    pub async fn get(&self, id: &str) -> Option<Arc<ThreePidInviteReply>> {
        self.index.read().await.get(id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.index.read().await.contains_key(id)
    }

    /// Point-in-time copy of all pending replies.
    pub async fn snapshot(&self) -> Vec<Arc<ThreePidInviteReply>> {
        self.index.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.index.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.index.read().await.is_empty()
    }
}
