//! Message history endpoint

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tunelink_common::db::MatchId;
use tunelink_common::events::MessagePayload;

use super::AuthUser;
use crate::db::{matches, messages};
use crate::error::{Error, Result};
use crate::pagination::{calculate_pagination, PageRequest, Pagination};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub match_id: MatchId,
    #[serde(flatten)]
    pub pagination: Pagination,
    /// Newest first
    pub messages: Vec<MessagePayload>,
}

/// GET /api/matches/:match_id/messages?page=&page_size=
///
/// Participants only.
pub async fn message_history(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(match_id): Path<MatchId>,
    params: std::result::Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Json<HistoryResponse>> {
    let Query(params) = params.map_err(|e| Error::Validation(e.body_text()))?;
    let request = PageRequest::new(params.page, params.page_size)?;

    let session = matches::get_match(&state.db, match_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("match {} does not exist", match_id)))?;
    if !session.is_participant(user_id) {
        return Err(Error::Forbidden(format!(
            "user {} is not a participant of match {}",
            user_id, match_id
        )));
    }

    let total = messages::count_messages(&state.db, match_id).await?;
    let page = messages::history_page(&state.db, match_id, request.page_size, request.offset()).await?;

    Ok(Json(HistoryResponse {
        match_id,
        pagination: calculate_pagination(total, request),
        messages: page.into_iter().map(MessagePayload::from).collect(),
    }))
}
