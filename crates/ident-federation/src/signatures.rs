//! Matrix-style JSON signing.
//!
//! A signed object carries a `signatures` member:
//!
//! ```json
//! {
//!   "mxid": "@alice:example.org",
//!   "token": "abc…",
//!   "signatures": { "id.example.com": { "ed25519:3f9a2c01ab4d": "<base64 sig>" } }
//! }
//! ```
//!
//! The signature covers the canonical JSON of the object with `signatures` and
//! `unsigned` removed.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::{
    error::FederationError,
    keys::{ServerKeyPair, verify_signature},
};

// ─── Signer ──────────────────────────────────────────────────────────────────

/// Produces the `signatures` object for a JSON payload.
pub trait MessageSigner: Send + Sync {
    /// Return `{ "<server>": { "<key_id>": "<sig>" } }` for `value`.
    fn sign_json(&self, value: &Value) -> Result<Value, FederationError>;
}

/// Signs with this server's Ed25519 key under its public server name.
pub struct ServerSigner {
    server_name: String,
    key_pair: Arc<ServerKeyPair>,
}

impl ServerSigner {
    pub fn new(server_name: impl Into<String>, key_pair: Arc<ServerKeyPair>) -> Self {
        Self { server_name: server_name.into(), key_pair }
    }

    pub fn key_pair(&self) -> &ServerKeyPair {
        &self.key_pair
    }
}

impl MessageSigner for ServerSigner {
    fn sign_json(&self, value: &Value) -> Result<Value, FederationError> {
        let canonical = canonical_json(&signable(value)?)?;
        let sig = self.key_pair.sign_json(&canonical);

        let mut keys = Map::new();
        keys.insert(self.key_pair.key_id.clone(), Value::String(sig));
        let mut servers = Map::new();
        servers.insert(self.server_name.clone(), Value::Object(keys));
        Ok(Value::Object(servers))
    }
}

/// Serialize `payload`, sign it, and return the JSON with `signatures` attached.
pub fn sign_payload<T: Serialize>(
    signer: &dyn MessageSigner,
    payload: &T,
) -> Result<Value, FederationError> {
    let mut value = serde_json::to_value(payload)?;
    let signatures = signer.sign_json(&value)?;
    value
        .as_object_mut()
        .ok_or(FederationError::NotAnObject)?
        .insert("signatures".to_owned(), signatures);
    Ok(value)
}

/// Verify the signature left on `value` by `server_name` / `key_id`.
pub fn verify_json(
    value: &Value,
    server_name: &str,
    key_id: &str,
    pubkey_base64: &str,
) -> Result<(), FederationError> {
    let sig = value
        .get("signatures")
        .and_then(|s| s.get(server_name))
        .and_then(|s| s.get(key_id))
        .and_then(Value::as_str)
        .ok_or(FederationError::InvalidSignature)?;
    let canonical = canonical_json(&signable(value)?)?;
    verify_signature(pubkey_base64, sig, canonical.as_bytes())
}

// ─── Internals ───────────────────────────────────────────────────────────────

/// Copy of `value` without the members that are never covered by a signature.
fn signable(value: &Value) -> Result<Value, FederationError> {
    let mut obj = value.as_object().ok_or(FederationError::NotAnObject)?.clone();
    obj.remove("signatures");
    obj.remove("unsigned");
    Ok(Value::Object(obj))
}

/// Produce canonical JSON (sorted keys, no extra whitespace).
///
/// Follows the Matrix canonical JSON rules: keys sorted lexicographically,
/// compact separators, UTF-8 output.
pub fn canonical_json(value: &Value) -> Result<String, FederationError> {
    Ok(serde_json::to_string(&sort_keys(value))?)
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: Map<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), sort_keys(v)))
                .collect::<BTreeMap<_, _>>()
                .into_iter()
                .collect();
            Value::Object(sorted)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}
