//! Wire types for the `3pid/onbind` federation callback.
//!
//! ```json
//! {
//!   "invites": [{
//!     "mxid": "@bob:example.org", "medium": "email", "address": "bob@mail.tld",
//!     "sender": "@alice:hs.tld", "room_id": "!room:hs.tld",
//!     "signed": { "mxid": "@bob:example.org", "token": "…", "signatures": { … } }
//!   }],
//!   "medium": "email", "address": "bob@mail.tld", "mxid": "@bob:example.org",
//!   "signatures": { … }
//! }
//! ```
//!
//! `signatures` is left out of the structs: it is attached to the serialized
//! value by [`crate::signatures::sign_payload`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The inner object the inviting homeserver verifies against the token it was given.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedBinding {
    pub mxid: String,
    pub token: String,
}

/// One invite entry of the callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnBindInvite {
    pub mxid: String,
    pub medium: String,
    pub address: String,
    pub sender: String,
    pub room_id: String,
    /// Signed [`SignedBinding`] including its `signatures` member.
    pub signed: Value,
}

/// Full callback body, before the outer signature is attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnBindRequest {
    pub invites: Vec<OnBindInvite>,
    pub medium: String,
    pub address: String,
    pub mxid: String,
}
