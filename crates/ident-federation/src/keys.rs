//! Ed25519 server signing key management.
//!
//! identd holds one active Ed25519 key pair used to sign outbound `onbind`
//! payloads. Homeservers check the public half through
//! `/_matrix/identity/api/v1/pubkey/{keyId}`.
//!
//! # Key IDs
//! Key IDs follow the Matrix convention: `ed25519:<fingerprint>`, where the
//! fingerprint is the first 6 bytes of the public key, hex-encoded.
//!
//! # Encoding
//! Public keys and signatures use unpadded standard base64, as Matrix does.

use base64::Engine as _;
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use rand_core::OsRng;

use crate::error::FederationError;

const B64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD_NO_PAD;

// ─── Key pair ────────────────────────────────────────────────────────────────

/// An Ed25519 signing key pair for this identity server.
pub struct ServerKeyPair {
    /// Key ID in the format `ed25519:<12-char-hex>`.
    pub key_id: String,
    signing_key: SigningKey,
}

impl std::fmt::Debug for ServerKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerKeyPair").field("key_id", &self.key_id).finish_non_exhaustive()
    }
}

impl ServerKeyPair {
    /// Generate a brand-new random Ed25519 key pair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let key_id = derive_key_id(signing_key.verifying_key().as_bytes());
        Self { key_id, signing_key }
    }

    /// Reconstruct a `ServerKeyPair` from raw 32-byte seed bytes (as stored in DB).
    pub fn from_seed(seed: &[u8]) -> Result<Self, FederationError> {
        let bytes: [u8; 32] = seed
            .try_into()
            .map_err(|_| FederationError::KeyLoad("seed must be exactly 32 bytes".into()))?;
        let signing_key = SigningKey::from_bytes(&bytes);
        let key_id = derive_key_id(signing_key.verifying_key().as_bytes());
        Ok(Self { key_id, signing_key })
    }

    /// Reconstruct from a base64 seed as stored in `signing_keys.seed_b64`.
    pub fn from_seed_base64(seed_b64: &str) -> Result<Self, FederationError> {
        let seed = B64
            .decode(seed_b64)
            .map_err(|e| FederationError::KeyLoad(format!("seed is not valid base64: {e}")))?;
        Self::from_seed(&seed)
    }

    /// Return the 32-byte seed (private key scalar) for persistence.
    pub fn seed_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    pub fn seed_base64(&self) -> String {
        B64.encode(self.seed_bytes())
    }

    /// Return the public verifying key.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Return the public key as unpadded base64.
    pub fn public_key_base64(&self) -> String {
        B64.encode(self.signing_key.verifying_key().as_bytes())
    }

    /// Sign arbitrary bytes and return the base64-encoded signature.
    pub fn sign_bytes(&self, bytes: &[u8]) -> String {
        let sig = self.signing_key.sign(bytes);
        B64.encode(sig.to_bytes())
    }

    /// Sign a canonical JSON string and return the base64-encoded signature.
    pub fn sign_json(&self, canonical_json: &str) -> String {
        self.sign_bytes(canonical_json.as_bytes())
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Derive a stable key ID from raw public key bytes.
fn derive_key_id(pubkey_bytes: &[u8]) -> String {
    let fingerprint = hex::encode(&pubkey_bytes[..6]);
    format!("ed25519:{}", fingerprint)
}

/// Verify an Ed25519 signature.
///
/// * `pubkey_base64`: base64 32-byte verifying key
/// * `sig_base64`   : base64 64-byte signature
/// * `message`      : original signed bytes
pub fn verify_signature(
    pubkey_base64: &str,
    sig_base64: &str,
    message: &[u8],
) -> Result<(), FederationError> {
    use ed25519_dalek::Verifier;

    let pubkey_bytes = B64.decode(pubkey_base64).map_err(|_| FederationError::InvalidSignature)?;
    let sig_bytes = B64.decode(sig_base64).map_err(|_| FederationError::InvalidSignature)?;

    let verifying_key = VerifyingKey::from_bytes(
        pubkey_bytes
            .as_slice()
            .try_into()
            .map_err(|_| FederationError::InvalidSignature)?,
    )
    .map_err(|_| FederationError::InvalidSignature)?;

    let signature = ed25519_dalek::Signature::from_bytes(
        sig_bytes
            .as_slice()
            .try_into()
            .map_err(|_| FederationError::InvalidSignature)?,
    );

    verifying_key.verify(message, &signature).map_err(|_| FederationError::InvalidSignature)
}
