//! Realtime channel upgrade

use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::{header::AUTHORIZATION, HeaderMap},
    response::Response,
};
use serde::Deserialize;
use tunelink_common::api::parse_bearer;

use crate::session;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// GET /ws
///
/// The token may come as `?token=` or as a bearer header. It is checked after
/// the upgrade so a rejection can carry a close code.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
    params: Option<Query<WsParams>>,
) -> Response {
    let token = params
        .and_then(|Query(p)| p.token)
        .or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(parse_bearer)
                .map(str::to_string)
        });

    ws.on_upgrade(move |socket| session::run(socket, state, token))
}
