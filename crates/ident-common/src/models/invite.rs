//! Pending 3PID invites and the replies handed back to inviting homeservers.

use std::collections::BTreeMap;

use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};

use super::matrix_id::MatrixId;

/// Length of the one-time token returned to the inviter.
pub const TOKEN_LENGTH: usize = 64;

/// An inbound request to be told once `medium:address` is bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreePidInvite {
    pub sender: MatrixId,
    pub medium: String,
    pub address: String,
    pub room_id: String,
    /// Extra fields forwarded untouched to notification (room name, sender display name, …).
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl ThreePidInvite {
    /// Log-friendly identity including the room, e.g. `@a:hs.tld:!room:hs.tld:email:x@y.z`.
    pub fn log_id(&self) -> String {
        format!("{}:{}:{}:{}", self.sender, self.room_id, self.medium, self.address)
    }
}

/// Deterministic key of a pending invite.
///
/// Two invites from the same domain for the same 3PID share a key regardless of
/// letter case, sender localpart or room.
pub fn invite_id(invite: &ThreePidInvite) -> String {
    format!(
        "{}{}{}",
        invite.sender.domain().to_lowercase(),
        invite.medium.to_lowercase(),
        invite.address.to_lowercase()
    )
}

/// The processed, durable form of an invite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreePidInviteReply {
    pub id: String,
    pub invite: ThreePidInvite,
    pub token: String,
    pub display_name: String,
}

impl ThreePidInviteReply {
    /// Build a fresh reply with a new random token and a redacted display name.
    pub fn create(invite: ThreePidInvite) -> Self {
        let id = invite_id(&invite);
        let display_name = redacted_display_name(&invite.address);
        Self { id, invite, token: generate_token(), display_name }
    }

    /// Rebuild a reply from stored parts; the id is always recomputed from the invite.
    pub fn restore(invite: ThreePidInvite, token: String, display_name: String) -> Self {
        Self { id: invite_id(&invite), invite, token, display_name }
    }

    /// Same token and display name, different invite context (used for re-notification).
    pub fn with_invite(&self, invite: ThreePidInvite) -> Self {
        Self {
            id: self.id.clone(),
            invite,
            token: self.token.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

/// Random alphanumeric token of [`TOKEN_LENGTH`] characters.
pub fn generate_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// First three characters of the address followed by `...`.
pub fn redacted_display_name(address: &str) -> String {
    let head: String = address.chars().take(3).collect();
    format!("{head}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invite(sender: &str, medium: &str, address: &str, room: &str) -> ThreePidInvite {
        ThreePidInvite {
            sender: MatrixId::parse(sender).unwrap(),
            medium: medium.into(),
            address: address.into(),
            room_id: room.into(),
            properties: BTreeMap::new(),
        }
    }

    #[test]
    fn id_is_lowercase_domain_medium_address() {
        let inv = invite("@Alice:Example.ORG", "Email", "John@Doe.com", "!r:example.org");
        assert_eq!(invite_id(&inv), "example.orgemailjohn@doe.com");
    }

    #[test]
    fn id_ignores_localpart_and_room() {
        let a = invite("@alice:example.org", "email", "john@doe.com", "!one:example.org");
        let b = invite("@bob:EXAMPLE.org", "EMAIL", "JOHN@doe.com", "!two:example.org");
        assert_eq!(invite_id(&a), invite_id(&b));

        let other_domain = invite("@alice:other.org", "email", "john@doe.com", "!one:example.org");
        assert_ne!(invite_id(&a), invite_id(&other_domain));
    }

    #[test]
    fn created_reply_has_token_and_redacted_name() {
        let reply =
            ThreePidInviteReply::create(invite("@a:hs.tld", "email", "john@doe.com", "!r:hs.tld"));
        assert_eq!(reply.token.len(), TOKEN_LENGTH);
        assert!(reply.token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(reply.display_name, "joh...");
        assert_eq!(reply.id, "hs.tldemailjohn@doe.com");
    }

    #[test]
    fn tokens_differ_between_replies() {
        assert_ne!(generate_token(), generate_token());
    }

    #[test]
    fn display_name_handles_short_and_multibyte_addresses() {
        assert_eq!(redacted_display_name("ab"), "ab...");
        assert_eq!(redacted_display_name("éàüx@y"), "éàü...");
    }

    #[test]
    fn with_invite_keeps_credentials() {
        let reply =
            ThreePidInviteReply::create(invite("@a:hs.tld", "email", "john@doe.com", "!r1:hs.tld"));
        let renotify = reply.with_invite(invite("@b:hs.tld", "email", "john@doe.com", "!r2:hs.tld"));
        assert_eq!(renotify.token, reply.token);
        assert_eq!(renotify.display_name, reply.display_name);
        assert_eq!(renotify.invite.room_id, "!r2:hs.tld");
    }
}
