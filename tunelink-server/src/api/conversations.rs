//! Conversation list endpoint

use axum::{extract::State, Json};
use serde::Serialize;

use super::AuthUser;
use crate::conversations::{self, Conversation};
use crate::error::Result;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ConversationsResponse {
    pub conversations: Vec<Conversation>,
}

/// GET /api/conversations
pub async fn list_conversations(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<ConversationsResponse>> {
    let conversations = conversations::list_conversations(&state.db, user_id).await?;
    Ok(Json(ConversationsResponse { conversations }))
}
