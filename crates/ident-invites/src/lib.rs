//! # ident-invites
//!
//! Pending 3PID invitations: an inviting homeserver asks to be told once an
//! email address or phone number gets bound to a Matrix ID. This crate keeps
//! those invites, re-checks them on a timer, and sends the signed `onbind`
//! callback once a binding shows up.
//!
//! ```text
//!   store-invite ──► InvitationManager ──► InviteStore ◄──► InviteStorage (DB)
//!                          │                    ▲
//!   bind event ────────────┤                    │ retire on 2xx
//!                          ▼                    │
//!   ReconciliationScheduler ──► WorkerPool ──► FederationPublisher ──► homeserver
//!         (tick)               (bounded)        (resolve, sign, POST)
//! ```
//!
//! Collaborators outside this crate's concern (storage, mapping lookup,
//! notification) are reached through the traits in [`collaborators`];
//! [`adapters`] holds the implementations the server wires in.

pub mod adapters;
pub mod collaborators;
pub mod delivery;
pub mod error;
pub mod manager;
pub mod pool;
pub mod publisher;
pub mod scheduler;
pub mod store;

#[cfg(test)]
mod testing;

pub use collaborators::{InviteStorage, MappingLookup, NotificationDispatcher};
pub use error::InviteError;
pub use manager::{Collaborators, InvitationManager};
pub use publisher::{FederationPublisher, PublishOutcome};
pub use store::InviteStore;
