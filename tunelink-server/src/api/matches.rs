//! Match endpoints

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::AuthUser;
use crate::error::{Error, Result};
use crate::matching::{RankedPeer, RecomputeOutcome};
use crate::AppState;

/// POST /api/matches/recompute
///
/// Regenerates the caller's edges and returns them ranked.
pub async fn recompute_matches(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<RecomputeOutcome>> {
    let outcome = state.engine.recompute_for_user(user_id).await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct ListMatchesParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ListMatchesResponse {
    pub matches: Vec<RankedPeer>,
}

/// GET /api/matches?limit=N
pub async fn list_matches(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    params: std::result::Result<Query<ListMatchesParams>, QueryRejection>,
) -> Result<Json<ListMatchesResponse>> {
    let Query(params) = params.map_err(|e| Error::Validation(e.body_text()))?;
    if params.limit == Some(0) {
        return Err(Error::Validation("limit must be at least 1".to_string()));
    }

    let matches = state.engine.top_matches(user_id, params.limit).await?;
    Ok(Json(ListMatchesResponse { matches }))
}
