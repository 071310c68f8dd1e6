//! Fully-qualified Matrix user IDs (`@localpart:domain`).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::IdentError;

/// A parsed `@localpart:domain` identifier.
///
/// The domain keeps any explicit port, exactly as written by the inviter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MatrixId {
    id: String,
    sep: usize,
}

impl MatrixId {
    pub fn parse(raw: &str) -> Result<Self, IdentError> {
        let rest = raw
            .strip_prefix('@')
            .ok_or_else(|| IdentError::bad_request(format!("Invalid Matrix ID '{raw}': missing '@'")))?;
        let sep = rest
            .find(':')
            .ok_or_else(|| IdentError::bad_request(format!("Invalid Matrix ID '{raw}': missing domain")))?;
        if sep == 0 || sep + 1 == rest.len() {
            return Err(IdentError::bad_request(format!(
                "Invalid Matrix ID '{raw}': empty localpart or domain"
            )));
        }
        Ok(Self { id: raw.to_owned(), sep: sep + 1 })
    }

    /// The full `@localpart:domain` form.
    pub fn as_str(&self) -> &str {
        &self.id
    }

    pub fn localpart(&self) -> &str {
        &self.id[1..self.sep]
    }

    pub fn domain(&self) -> &str {
        &self.id[self.sep + 1..]
    }
}

impl fmt::Display for MatrixId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

impl TryFrom<String> for MatrixId {
    type Error = IdentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MatrixId> for String {
    fn from(value: MatrixId) -> Self {
        value.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_localpart_and_domain() {
        let id = MatrixId::parse("@alice:Example.org").unwrap();
        assert_eq!(id.localpart(), "alice");
        assert_eq!(id.domain(), "Example.org");
        assert_eq!(id.to_string(), "@alice:Example.org");
    }

    #[test]
    fn domain_keeps_explicit_port() {
        let id = MatrixId::parse("@bob:hs.example.org:8448").unwrap();
        assert_eq!(id.localpart(), "bob");
        assert_eq!(id.domain(), "hs.example.org:8448");
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(MatrixId::parse("alice:example.org").is_err());
        assert!(MatrixId::parse("@alice").is_err());
        assert!(MatrixId::parse("@:example.org").is_err());
        assert!(MatrixId::parse("@alice:").is_err());
    }

    #[test]
    fn serde_uses_string_form() {
        let id: MatrixId = serde_json::from_str("\"@carol:example.com\"").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"@carol:example.com\"");
        assert!(serde_json::from_str::<MatrixId>("\"carol\"").is_err());
    }
}
