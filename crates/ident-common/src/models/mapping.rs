//! 3PID → Matrix ID bindings.

use serde::{Deserialize, Serialize};

/// An established association between a 3PID and a Matrix ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreePidMapping {
    pub medium: String,
    pub address: String,
    pub mxid: String,
}

impl ThreePidMapping {
    pub fn new(
        medium: impl Into<String>,
        address: impl Into<String>,
        mxid: impl Into<String>,
    ) -> Self {
        Self { medium: medium.into(), address: address.into(), mxid: mxid.into() }
    }

    /// Case-insensitive match against a pending invite's medium and address.
    pub fn matches(&self, medium: &str, address: &str) -> bool {
        self.medium.eq_ignore_ascii_case(medium) && self.address.to_lowercase() == address.to_lowercase()
    }
}
