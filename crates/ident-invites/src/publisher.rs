//! Signed `onbind` callback delivery.

use std::sync::Arc;

use ident_common::models::ThreePidInviteReply;
use ident_federation::client::ONBIND_PATH;
use ident_federation::signatures::sign_payload;
use ident_federation::types::{OnBindInvite, OnBindRequest, SignedBinding};
use ident_federation::{CallbackTransport, FederationError, HomeserverResolver, MessageSigner};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::delivery::DeliveryTracker;
use crate::error::InviteError;
use crate::pool::WorkerPool;
use crate::store::InviteStore;

/// Result of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The homeserver acknowledged; the invite is retired.
    Delivered,
    /// The homeserver answered with a status of 300 or more.
    Rejected { status: u16 },
    /// No answer (DNS, connect, TLS, timeout) or the payload could not be built.
    Failed,
    /// Not attempted: already retired, already in flight, or backing off.
    Skipped,
}

pub struct FederationPublisher {
    resolver: HomeserverResolver,
    signer: Arc<dyn MessageSigner>,
    transport: Arc<dyn CallbackTransport>,
    store: Arc<InviteStore>,
    pool: Arc<WorkerPool>,
    delivery: DeliveryTracker,
}

impl FederationPublisher {
    pub fn new(
        resolver: HomeserverResolver,
        signer: Arc<dyn MessageSigner>,
        transport: Arc<dyn CallbackTransport>,
        store: Arc<InviteStore>,
        pool: Arc<WorkerPool>,
        delivery: DeliveryTracker,
    ) -> Self {
        Self { resolver, signer, transport, store, pool, delivery }
    }

    /// Queue delivery of `reply` on the worker pool and return immediately.
    ///
    /// The outcome is only logged; an `Err` here means the pool refused the job.
    pub fn publish(self: &Arc<Self>, reply: Arc<ThreePidInviteReply>, mxid: String) -> Result<(), InviteError> {
        let publisher = Arc::clone(self);
        self.pool.try_spawn(async move {
            publisher.deliver(&reply, &mxid).await;
        })
    }

    /// Resolve, sign, POST, and retire on acknowledgment. Runs on the caller's task.
    pub async fn deliver(&self, reply: &ThreePidInviteReply, mxid: &str) -> PublishOutcome {
        if !self.store.contains(&reply.id).await {
            debug!(id = %reply.id, "Invite already retired, not publishing");
            return PublishOutcome::Skipped;
        }
        let Some(attempt) = self.delivery.begin(&reply.id) else {
            debug!(
                id = %reply.id,
                since_last_attempt = ?self.delivery.last_attempt_at(&reply.id).map(|at| at.elapsed()),
                "Delivery in flight or backing off, skipping"
            );
            return PublishOutcome::Skipped;
        };

        let domain = reply.invite.sender.domain();
        let endpoint = self.resolver.resolve(domain).await;
        let url = format!("{}{}", endpoint.trim_end_matches('/'), ONBIND_PATH);

        let body = match build_payload(self.signer.as_ref(), reply, mxid) {
            Ok(body) => body,
            Err(e) => {
                warn!(id = %reply.id, error = %e, "Unable to build onbind payload");
                attempt.failed();
                return PublishOutcome::Failed;
            }
        };

        info!(
            invite = %reply.invite.log_id(),
            mxid,
            url = %url,
            "Publishing invite mapping"
        );
        let response = match self.transport.post_json(&url, &body).await {
            Ok(response) => response,
            Err(e) => {
                warn!(id = %reply.id, url = %url, error = %e, "Unable to send invite notification");
                attempt.failed();
                return PublishOutcome::Failed;
            }
        };

        if !response.is_acknowledged() {
            warn!(
                id = %reply.id,
                status = response.status,
                body = %response.body,
                attempts = self.delivery.attempts(&reply.id),
                "Homeserver rejected invite mapping"
            );
            attempt.failed();
            return PublishOutcome::Rejected { status: response.status };
        }

        info!(id = %reply.id, status = response.status, "Homeserver acknowledged invite mapping");
        // Retire before releasing the attempt so no concurrent delivery can reuse the token.
        if let Err(e) = self.store.remove(&reply.id).await {
            // Memory is already cleared; the row comes back on the next restart only.
            warn!(id = %reply.id, error = %e, "Unable to delete retired invite from storage");
        }
        attempt.delivered();
        PublishOutcome::Delivered
    }
}

/// Build the signed `onbind` body for `reply` bound to `mxid`.
pub fn build_payload(
    signer: &dyn MessageSigner,
    reply: &ThreePidInviteReply,
    mxid: &str,
) -> Result<Value, FederationError> {
    let invite = &reply.invite;
    let signed = sign_payload(signer, &SignedBinding { mxid: mxid.to_owned(), token: reply.token.clone() })?;

    let request = OnBindRequest {
        invites: vec![OnBindInvite {
            mxid: mxid.to_owned(),
            medium: invite.medium.clone(),
            address: invite.address.clone(),
            sender: invite.sender.to_string(),
            room_id: invite.room_id.clone(),
            signed,
        }],
        medium: invite.medium.clone(),
        address: invite.address.clone(),
        mxid: mxid.to_owned(),
    };
    sign_payload(signer, &request)
}
