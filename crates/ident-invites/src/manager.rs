//! Entry points of the invitation subsystem.

use std::sync::Arc;

use ident_common::config::InvitationConfig;
use ident_common::models::{ThreePidInvite, ThreePidInviteReply, ThreePidMapping};
use ident_federation::{CallbackTransport, HomeserverResolver, MessageSigner};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::collaborators::{InviteStorage, MappingLookup, NotificationDispatcher};
use crate::delivery::{DeliveryTracker, RetryPolicy};
use crate::error::InviteError;
use crate::pool::WorkerPool;
use crate::publisher::FederationPublisher;
use crate::scheduler::{ReconciliationScheduler, Reconciler};
use crate::store::{InviteStore, Slot};

/// Everything the manager talks to.
pub struct Collaborators {
    pub storage: Arc<dyn InviteStorage>,
    pub lookup: Arc<dyn MappingLookup>,
    pub notifier: Arc<dyn NotificationDispatcher>,
    pub signer: Arc<dyn MessageSigner>,
    pub transport: Arc<dyn CallbackTransport>,
    pub resolver: HomeserverResolver,
}

pub struct InvitationManager {
    config: InvitationConfig,
    store: Arc<InviteStore>,
    lookup: Arc<dyn MappingLookup>,
    notifier: Arc<dyn NotificationDispatcher>,
    publisher: Arc<FederationPublisher>,
    reconciler: Arc<Reconciler>,
    scheduler: ReconciliationScheduler,
    pool: Arc<WorkerPool>,
    /// Serializes the whole check-notify-persist cycle of `store_invite`.
    create_lock: Mutex<()>,
}

impl InvitationManager {
    pub fn new(config: InvitationConfig, c: Collaborators) -> Self {
        let store = Arc::new(InviteStore::new(c.storage));
        let pool = Arc::new(WorkerPool::new("invites", config.workers, config.queue_capacity));
        let publisher = Arc::new(FederationPublisher::new(
            c.resolver,
            c.signer,
            c.transport,
            store.clone(),
            pool.clone(),
            DeliveryTracker::new(RetryPolicy::from_config(&config.retry)),
        ));
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            c.lookup.clone(),
            publisher.clone(),
            pool.clone(),
            config.resolution.recursive,
        ));

        Self {
            config,
            store,
            lookup: c.lookup,
            notifier: c.notifier,
            publisher,
            reconciler,
            scheduler: ReconciliationScheduler::new(),
            pool,
            create_lock: Mutex::new(()),
        }
    }

    /// Reload saved invites and start the reconciliation timer.
    ///
    /// A storage failure here must abort startup.
    pub async fn start(&self) -> Result<(), InviteError> {
        self.store.load().await?;
        self.scheduler
            .start(self.config.resolution.period(), self.reconciler.clone())
            .await;
        Ok(())
    }

    /// Stop the timer, then give in-flight checks and deliveries the grace period.
    pub async fn stop(&self) {
        self.scheduler.stop().await;
        if !self.pool.shutdown(self.config.shutdown_grace()).await {
            warn!("Invitation tasks still running after shutdown grace period");
        }
        info!("Invitation manager stopped");
    }

    /// Register `invite`, or return the reply already registered for the same
    /// `(sender domain, medium, address)`.
    pub async fn store_invite(&self, invite: ThreePidInvite) -> Result<Arc<ThreePidInviteReply>, InviteError> {
        let _guard = self.create_lock.lock().await;

        if !self.notifier.is_medium_supported(&invite.medium) {
            return Err(InviteError::UnsupportedMedium(invite.medium));
        }

        let id = match self.store.try_create(&invite).await {
            Slot::Existing(existing) => {
                info!(invite = %invite.log_id(), "Invite is already pending");
                if existing.invite.room_id != invite.room_id {
                    info!(
                        id = %existing.id,
                        room_id = %invite.room_id,
                        "Sending new notification for new room invite"
                    );
                    self.notifier
                        .send_for_invite(&existing.with_invite(invite))
                        .await
                        .map_err(InviteError::Notification)?;
                }
                return Ok(existing);
            }
            Slot::Vacant(id) => id,
        };

        let bound = self
            .lookup
            .find(&invite.medium, &invite.address, self.config.resolution.recursive)
            .await
            .map_err(InviteError::Lookup)?;
        if bound.is_some() {
            warn!(invite = %invite.log_id(), "Mapping already exists, refusing invite");
            return Err(InviteError::MappingAlreadyExists { medium: invite.medium, address: invite.address });
        }

        info!(id = %id, invite = %invite.log_id(), "Storing new invite");
        let reply = ThreePidInviteReply::create(invite);
        self.notifier
            .send_for_invite(&reply)
            .await
            .map_err(InviteError::Notification)?;
        self.store
            .storage()
            .insert_invite(&reply)
            .await
            .map_err(InviteError::Storage)?;
        self.store.insert(reply).await
    }

    /// Publish `mapping` to every inviter waiting on its 3PID. Returns the
    /// number of deliveries queued; outcomes are only logged.
    pub async fn publish_mapping_if_invited(&self, mapping: &ThreePidMapping) -> usize {
        let mut queued = 0;
        for reply in self.store.snapshot().await {
            if !mapping.matches(&reply.invite.medium, &reply.invite.address) {
                continue;
            }
            info!(invite = %reply.invite.log_id(), mxid = %mapping.mxid, "Found pending invite for new mapping");
            match self.publisher.publish(reply, mapping.mxid.clone()) {
                Ok(()) => queued += 1,
                Err(e) => warn!(error = %e, "Unable to queue invite publication"),
            }
        }
        queued
    }

    /// Run one reconciliation pass now, outside the timer.
    pub async fn lookup_mappings_for_invites(&self) -> usize {
        self.reconciler.run_tick().await
    }

    pub fn store(&self) -> &InviteStore {
        &self.store
    }

    pub async fn is_running(&self) -> bool {
        self.scheduler.is_running().await
    }
}
