//! Admin endpoints, guarded by the `admin.token` bearer.
//!
//! POST /bind: record a 3PID binding and notify every inviter waiting on it

use axum::{Json, Router, extract::State, middleware, routing::post};
use ident_common::{
    IdentResult,
    models::{MatrixId, ThreePidMapping},
    validation::{validate_medium, validate_request},
};
use ident_db::repository::mappings;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use validator::Validate;

use crate::AppState;

pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/bind", post(bind))
        .route_layer(middleware::from_fn_with_state(state, crate::middleware::require_admin))
}

#[derive(Debug, Deserialize, Validate)]
pub struct BindRequest {
    #[validate(length(min = 1, max = 32, message = "medium must not be empty"))]
    pub medium: String,
    #[validate(length(min = 1, max = 512, message = "address must be 1-512 characters"))]
    pub address: String,
    pub mxid: String,
}

#[derive(Debug, Serialize)]
pub struct BindResponse {
    pub medium: String,
    pub address: String,
    pub mxid: String,
    /// Pending invites whose callback was queued.
    pub invites_published: usize,
}

async fn bind(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BindRequest>,
) -> IdentResult<Json<BindResponse>> {
    validate_request(&body)?;
    validate_medium(&body.medium)?;
    let mxid = MatrixId::parse(&body.mxid)?;

    let mapping = ThreePidMapping::new(body.medium, body.address, mxid.as_str());
    mappings::upsert_mapping(&state.db.pool, &mapping).await?;
    info!(medium = %mapping.medium, mxid = %mapping.mxid, "Recorded 3PID binding");

    let invites_published = state.manager.publish_mapping_if_invited(&mapping).await;
    Ok(Json(BindResponse {
        medium: mapping.medium,
        address: mapping.address,
        mxid: mapping.mxid,
        invites_published,
    }))
}
