//! Identity service endpoints called by homeservers.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | POST   | `/store-invite` | Register a pending 3PID invite, returns its token |
//! | GET    | `/lookup` | Signed 3PID → Matrix ID binding, or `{}` |
//! | GET    | `/pubkey/{keyId}` | Public half of a signing key |
//! | GET    | `/pubkey/isvalid` | Whether a public key is currently valid |
//!
//! All paths are relative to `/_matrix/identity/api/v1`.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use chrono::{Duration, Utc};
use ident_common::{
    IdentError, IdentResult,
    models::{MatrixId, ThreePidInvite},
    validation::{validate_medium, validate_request},
};
use ident_db::repository::{mappings, signing_keys};
use ident_federation::signatures::sign_payload;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use validator::Validate;

use crate::AppState;

/// How long a signed lookup answer stays valid.
const LOOKUP_VALIDITY_DAYS: i64 = 3650;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/store-invite", post(store_invite))
        .route("/lookup", get(lookup))
        .route("/pubkey/isvalid", get(pubkey_is_valid))
        .route("/pubkey/{key_id}", get(get_pubkey))
}

// ============================================================
// POST /store-invite
// ============================================================

#[derive(Debug, Deserialize, Validate)]
pub struct StoreInviteRequest {
    #[validate(length(min = 1, max = 32, message = "medium must not be empty"))]
    pub medium: String,
    #[validate(length(min = 1, max = 512, message = "address must be 1-512 characters"))]
    pub address: String,
    #[validate(length(min = 1, max = 255, message = "room_id must not be empty"))]
    pub room_id: String,
    pub sender: String,
    /// `room_name`, `sender_display_name`, … forwarded to notification.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct PublicKeyEntry {
    pub public_key: String,
    pub key_validity_url: String,
}

#[derive(Debug, Serialize)]
pub struct StoreInviteResponse {
    pub token: String,
    pub display_name: String,
    pub public_key: String,
    pub public_keys: Vec<PublicKeyEntry>,
}

async fn store_invite(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StoreInviteRequest>,
) -> IdentResult<Json<StoreInviteResponse>> {
    validate_request(&body)?;
    validate_medium(&body.medium)?;
    let sender = MatrixId::parse(&body.sender)?;

    // Only string values can be forwarded; anything else is dropped.
    let properties = body
        .extra
        .into_iter()
        .filter_map(|(k, v)| match v {
            Value::String(s) => Some((k, s)),
            _ => None,
        })
        .collect();

    let invite = ThreePidInvite {
        sender,
        medium: body.medium,
        address: body.address,
        room_id: body.room_id,
        properties,
    };
    let reply = state.manager.store_invite(invite).await?;
    info!(id = %reply.id, "Invite stored");

    let public_key = state.signer.key_pair().public_key_base64();
    let key_validity_url = format!(
        "{}/_matrix/identity/api/v1/pubkey/isvalid",
        state.public_url.trim_end_matches('/')
    );
    Ok(Json(StoreInviteResponse {
        token: reply.token.clone(),
        display_name: reply.display_name.clone(),
        public_key: public_key.clone(),
        public_keys: vec![PublicKeyEntry { public_key, key_validity_url }],
    }))
}

// ============================================================
// GET /lookup
// ============================================================

#[derive(Debug, Deserialize)]
struct LookupQuery {
    medium: String,
    address: String,
}

#[derive(Debug, Serialize)]
struct LookupAnswer {
    address: String,
    medium: String,
    mxid: String,
    not_before: i64,
    not_after: i64,
    ts: i64,
}

async fn lookup(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LookupQuery>,
) -> IdentResult<Json<Value>> {
    validate_medium(&query.medium)?;
    let Some(row) = mappings::find_mapping(&state.db.pool, &query.medium, &query.address).await? else {
        return Ok(Json(json!({})));
    };

    let now = Utc::now();
    let answer = LookupAnswer {
        address: row.address,
        medium: row.medium,
        mxid: row.mxid,
        not_before: now.timestamp_millis(),
        not_after: (now + Duration::days(LOOKUP_VALIDITY_DAYS)).timestamp_millis(),
        ts: now.timestamp_millis(),
    };
    let signed = sign_payload(state.signer.as_ref(), &answer).map_err(|e| IdentError::Internal(e.into()))?;
    Ok(Json(signed))
}

// ============================================================
// GET /pubkey/...
// ============================================================

async fn get_pubkey(
    State(state): State<Arc<AppState>>,
    Path(key_id): Path<String>,
) -> IdentResult<Json<Value>> {
    let row = signing_keys::find_key(&state.db.pool, &key_id)
        .await?
        .ok_or_else(|| IdentError::NotFound { resource: format!("Key {key_id}") })?;
    Ok(Json(json!({ "public_key": row.public_key_b64 })))
}

#[derive(Debug, Deserialize)]
struct PublicKeyQuery {
    public_key: String,
}

async fn pubkey_is_valid(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PublicKeyQuery>,
) -> IdentResult<Json<Value>> {
    let valid = signing_keys::is_active_public_key(&state.db.pool, &query.public_key).await?;
    Ok(Json(json!({ "valid": valid })))
}
