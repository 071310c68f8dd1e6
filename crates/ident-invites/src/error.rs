//! Invitation errors and their mapping onto API errors.

use ident_common::IdentError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InviteError {
    #[error("Medium type {0} is not supported")]
    UnsupportedMedium(String),

    #[error("A mapping already exists for {medium}:{address}")]
    MappingAlreadyExists { medium: String, address: String },

    #[error("Invite {0} is already stored")]
    AlreadyPresent(String),

    #[error("Worker pool is saturated")]
    PoolSaturated,

    #[error("Worker pool is shut down")]
    PoolClosed,

    #[error("Invite storage failed: {0:#}")]
    Storage(anyhow::Error),

    #[error("Mapping lookup failed: {0:#}")]
    Lookup(anyhow::Error),

    #[error("Notification failed: {0:#}")]
    Notification(anyhow::Error),
}

impl From<InviteError> for IdentError {
    fn from(e: InviteError) -> Self {
        match e {
            InviteError::UnsupportedMedium(_) => IdentError::bad_request(e.to_string()),
            InviteError::MappingAlreadyExists { .. } => IdentError::MappingAlreadyExists,
            InviteError::PoolSaturated | InviteError::PoolClosed => IdentError::Unavailable,
            InviteError::AlreadyPresent(_) => IdentError::Internal(anyhow::anyhow!(e.to_string())),
            InviteError::Storage(err) | InviteError::Lookup(err) | InviteError::Notification(err) => {
                IdentError::Internal(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_to_api_errors() {
        let bad: IdentError = InviteError::UnsupportedMedium("fax".into()).into();
        assert_eq!(bad.error_code(), "M_BAD_REQUEST");
        assert_eq!(bad.to_string(), "Medium type fax is not supported");

        let conflict: IdentError =
            InviteError::MappingAlreadyExists { medium: "email".into(), address: "a@b.c".into() }.into();
        assert_eq!(conflict.error_code(), "M_THREEPID_IN_USE");
    }
}
