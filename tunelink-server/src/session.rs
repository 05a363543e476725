//! Realtime session driver
//!
//! One task per channel walks `Authenticating -> Bound -> ReceivingLoop ->
//! Closed`. Inbound frames are handled strictly in arrival order; outbound
//! events queued by the registry are flushed between them. The registry
//! registration is a guard, so every exit path unregisters.

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::borrow::Cow;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use tunelink_common::db::{MatchId, UserId};
use tunelink_common::events::{ClientEvent, ErrorNotice, ServerEvent};

use crate::db::users;
use crate::error::Error;
use crate::AppState;

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Server closes the channel with this code
    Close { code: u16, reason: String },
    /// Peer went away (close frame, transport error or EOF)
    Disconnected,
}

impl SessionEnd {
    fn close(code: u16, reason: impl Into<String>) -> Self {
        SessionEnd::Close {
            code,
            reason: reason.into(),
        }
    }
}

/// Why an inbound text frame was not turned into an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Not JSON at all; a protocol violation
    Malformed(String),
    /// JSON, but not one of the known event shapes
    Invalid {
        reason: String,
        match_id: Option<MatchId>,
    },
}

/// Decode one text frame into a client event
pub fn decode_event(text: &str) -> Result<ClientEvent, DecodeError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    let match_id = value.get("match_id").and_then(serde_json::Value::as_i64);
    ClientEvent::deserialize(value).map_err(|e| DecodeError::Invalid {
        reason: e.to_string(),
        match_id,
    })
}

/// Drive one upgraded channel to completion
pub async fn run(socket: WebSocket, state: AppState, token: Option<String>) {
    let (mut sink, mut stream) = socket.split();

    // Authenticating
    let user_id = match authenticate(&state, token.as_deref()).await {
        Ok(user_id) => user_id,
        Err(end) => {
            info!(?end, "Realtime session rejected at open");
            finish(&mut sink, end).await;
            return;
        }
    };

    // Bound
    let (tx, mut rx) = mpsc::channel(state.realtime.outbound_buffer);
    let registration = state.registry.register(user_id, tx);
    let connection_id = registration.connection_id();
    info!(user_id, %connection_id, "Realtime session bound");

    let end = receive_loop(&state, user_id, &mut sink, &mut stream, &mut rx).await;

    // Closed
    drop(registration);
    match &end {
        SessionEnd::Close { code, reason } => {
            info!(user_id, %connection_id, code, %reason, "Realtime session closed by server")
        }
        SessionEnd::Disconnected => {
            info!(user_id, %connection_id, "Realtime session closed by client")
        }
    }
    finish(&mut sink, end).await;
}

async fn authenticate(state: &AppState, token: Option<&str>) -> Result<UserId, SessionEnd> {
    let token = token.ok_or_else(|| SessionEnd::close(close_code::POLICY, "missing token"))?;

    let user_id = state.verifier.verify(token).map_err(|e| {
        debug!(error = %e, "Token rejected");
        SessionEnd::close(close_code::POLICY, "authentication failed")
    })?;

    match users::user_exists(&state.db, user_id).await {
        Ok(true) => Ok(user_id),
        Ok(false) => Err(SessionEnd::close(close_code::POLICY, "authentication failed")),
        Err(e) => {
            error!(user_id, error = %e, "Failed to resolve user at channel open");
            Err(SessionEnd::close(close_code::ERROR, "internal error"))
        }
    }
}

async fn receive_loop(
    state: &AppState,
    user_id: UserId,
    sink: &mut WsSink,
    stream: &mut WsStream,
    rx: &mut mpsc::Receiver<ServerEvent>,
) -> SessionEnd {
    let idle_timeout = state.realtime.idle_timeout;
    let idle = tokio::time::sleep(idle_timeout);
    tokio::pin!(idle);

    loop {
        tokio::select! {
            _ = &mut idle => {
                return SessionEnd::close(close_code::NORMAL, "idle timeout");
            }

            outbound = rx.recv() => {
                let Some(event) = outbound else {
                    return SessionEnd::close(close_code::ERROR, "registration lost");
                };
                if !send_event(sink, &event).await {
                    return SessionEnd::Disconnected;
                }
            }

            inbound = stream.next() => {
                let frame = match inbound {
                    Some(Ok(frame)) => frame,
                    Some(Err(e)) => {
                        debug!(user_id, error = %e, "Realtime transport error");
                        return SessionEnd::Disconnected;
                    }
                    None => return SessionEnd::Disconnected,
                };
                idle.as_mut().reset(Instant::now() + idle_timeout);

                match frame {
                    Message::Text(text) => match decode_event(&text) {
                        Ok(event) => {
                            if let Some(notice) = apply_event(state, user_id, event).await {
                                if !send_event(sink, &notice).await {
                                    return SessionEnd::Disconnected;
                                }
                            }
                        }
                        Err(DecodeError::Invalid { reason, match_id }) => {
                            let notice = ServerEvent::Error(ErrorNotice {
                                code: "validation_failed".to_string(),
                                message: format!("unrecognized event: {}", reason),
                                match_id,
                            });
                            if !send_event(sink, &notice).await {
                                return SessionEnd::Disconnected;
                            }
                        }
                        Err(DecodeError::Malformed(reason)) => {
                            debug!(user_id, %reason, "Malformed realtime payload");
                            return SessionEnd::close(close_code::POLICY, "malformed payload");
                        }
                    },
                    Message::Binary(_) => {
                        return SessionEnd::close(close_code::POLICY, "binary frames are not supported");
                    }
                    Message::Ping(_) | Message::Pong(_) => {}
                    Message::Close(_) => return SessionEnd::Disconnected,
                }
            }
        }
    }
}

/// Run one event through the router; a failure becomes a notice for this channel
async fn apply_event(state: &AppState, user_id: UserId, event: ClientEvent) -> Option<ServerEvent> {
    let match_id = event.match_id();
    let kind = event.kind();

    match state.router.handle(user_id, event).await {
        Ok(_) => None,
        Err(e) => {
            match &e {
                Error::Storage(_) | Error::Internal(_) => {
                    error!(user_id, match_id, kind, error = %e, "Realtime event failed")
                }
                _ => warn!(user_id, match_id, kind, error = %e, "Realtime event rejected"),
            }
            Some(ServerEvent::Error(ErrorNotice {
                code: e.code().to_string(),
                message: e.client_message(),
                match_id: Some(match_id),
            }))
        }
    }
}

/// Returns false once the peer can no longer be written to
async fn send_event(sink: &mut WsSink, event: &ServerEvent) -> bool {
    let text = match event.to_json() {
        Ok(text) => text,
        Err(e) => {
            error!(error = %e, "Failed to encode realtime event");
            return true;
        }
    };
    sink.send(Message::Text(text)).await.is_ok()
}

async fn finish(sink: &mut WsSink, end: SessionEnd) {
    match end {
        SessionEnd::Close { code, reason } => {
            let frame = CloseFrame {
                code,
                reason: Cow::Owned(reason),
            };
            let _ = sink.send(Message::Close(Some(frame))).await;
        }
        SessionEnd::Disconnected => {
            let _ = sink.close().await;
        }
    }
}
