//! # ident-federation
//!
//! Outbound server-to-server plumbing for identd: finding a homeserver,
//! signing JSON payloads, and delivering `3pid/onbind` callbacks.
//!
//! ```text
//!  identd                                   hs.example.org
//!    │  resolve("example.org")                    │
//!    │   1. DNS override (config)                 │
//!    │   2. SRV _matrix._tcp.example.org          │
//!    │   3. https://example.org:8448              │
//!    │                                            │
//!    ├── POST /_matrix/federation/v1/3pid/onbind ►│  (signed JSON body)
//!    │◄──────────────── 200 ──────────────────────┤
//! ```
//!
//! ## Key concepts
//!
//! - **Server keys** (`keys.rs`): the Ed25519 key pair that signs every callback.
//!   Public keys are advertised through the identity API `pubkey` endpoints.
//! - **Signed JSON** (`signatures.rs`): Matrix-style `signatures` objects computed
//!   over canonical JSON (sorted keys, no insignificant whitespace).
//! - **Discovery** (`discovery.rs`): resolves a Matrix server name to its
//!   federation base URL.
//! - **Callback client** (`client.rs`): reqwest-based POST with an explicit timeout.

pub mod client;
pub mod discovery;
pub mod error;
pub mod key_manager;
pub mod keys;
pub mod signatures;
pub mod types;

pub use client::{CallbackResponse, CallbackTransport, FederationClient};
pub use discovery::{ConfigDnsOverride, DnsOverride, HickorySrvResolver, HomeserverResolver, SrvResolver};
pub use error::FederationError;
pub use key_manager::KeyManager;
pub use keys::ServerKeyPair;
pub use signatures::{MessageSigner, ServerSigner};
