//! Per-connection WebSocket tasks.
//!
//! Each socket is split: a write loop drains the connection's outbound queue
//! while the handler task owns the read half. Nothing outside the write loop
//! touches the sink.

use std::sync::Arc;

use {
    axum::extract::ws::{CloseFrame, Message, WebSocket},
    futures::{
        SinkExt, StreamExt,
        stream::{SplitSink, SplitStream},
    },
    roundtable_protocol::{
        Event, NO_AGENTS_MESSAGE, ObserverFrame, ParticipantFrame, Profile, close_codes,
    },
    tokio::sync::mpsc,
    tracing::{debug, info, warn},
};

use crate::{
    auth::parse_identify,
    connection::{Connection, Outbound},
    error::{AuthError, DeliveryError, StartError},
    state::GatewayState,
};

// ── Write loop ───────────────────────────────────────────────────────────────

async fn write_loop(mut ws_tx: SplitSink<WebSocket, Message>, mut rx: mpsc::Receiver<Outbound>) {
    while let Some(outbound) = rx.recv().await {
        match outbound {
            Outbound::Frame(text) => {
                if ws_tx.send(Message::Text(text.as_ref().into())).await.is_err() {
                    break;
                }
            },
            Outbound::Close { code, reason } => {
                let frame = CloseFrame {
                    code,
                    reason: reason.into(),
                };
                let _ = ws_tx.send(Message::Close(Some(frame))).await;
                break;
            },
        }
    }
    let _ = ws_tx.close().await;
}

/// Next text frame, skipping control frames. `None` once the peer closes
/// or the stream errors.
async fn next_text(ws_rx: &mut SplitStream<WebSocket>) -> Option<Result<String, ()>> {
    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
            Ok(Message::Binary(_)) => return Some(Err(())),
            Ok(Message::Ping(_) | Message::Pong(_)) => continue,
            Ok(Message::Close(_)) | Err(_) => return None,
        }
    }
    None
}

// ── Observers ────────────────────────────────────────────────────────────────

/// Serve a frontend: send the room state once, then accept
/// `start_conversation` requests until the socket closes.
pub async fn handle_observer(socket: WebSocket, state: Arc<GatewayState>) {
    let (ws_tx, mut ws_rx) = socket.split();
    let (conn, rx) = Connection::channel(state.outbound_queue);
    let writer = tokio::spawn(write_loop(ws_tx, rx));
    let conn_id = conn.conn_id.clone();

    if let Err(e) = state.add_observer(Arc::clone(&conn)).await {
        warn!(conn_id = %conn_id, error = %e, "failed to send room state");
    }
    info!(conn_id = %conn_id, "observer connected");

    let send_timeout = state.registry.send_timeout();

    while let Some(frame) = next_text(&mut ws_rx).await {
        let Ok(text) = frame else {
            continue;
        };
        let Ok(ObserverFrame::StartConversation { topic, max_turns }) =
            serde_json::from_str::<ObserverFrame>(&text)
        else {
            debug!(conn_id = %conn_id, "ignoring unrecognized observer frame");
            continue;
        };

        match state.session.start(topic, max_turns).await {
            Ok(_loop_handle) => {
                info!(conn_id = %conn_id, "conversation started by observer");
            },
            Err(StartError::NoParticipants) => {
                let error = Event::Error {
                    message: NO_AGENTS_MESSAGE.into(),
                };
                if let Err(e) = conn.send_json(&error, send_timeout).await {
                    warn!(conn_id = %conn_id, error = %e, "failed to send error event");
                }
            },
            Err(StartError::AlreadyActive) => {
                debug!(conn_id = %conn_id, "conversation already active, ignoring start");
            },
        }
    }

    state.registry.remove_observer(&conn_id).await;
    let connected_secs = conn.connected_at.elapsed().as_secs();
    drop(conn);
    writer.abort();
    info!(conn_id = %conn_id, connected_secs, "observer disconnected");
}

// ── Participants ─────────────────────────────────────────────────────────────

/// Wait for the identify frame and verify its credential.
async fn authenticate(
    ws_rx: &mut SplitStream<WebSocket>,
    state: &GatewayState,
) -> Result<Profile, AuthError> {
    let first = tokio::time::timeout(state.identify_timeout, next_text(ws_rx))
        .await
        .map_err(|_| AuthError::HandshakeTimeout)?;
    let text = match first {
        Some(Ok(text)) => text,
        Some(Err(())) => return Err(AuthError::IdentifyRequired),
        None => return Err(AuthError::Disconnected),
    };
    let api_key = parse_identify(&text)?;
    state.verifier.verify(&api_key).await
}

/// Serve an agent: identify handshake, then route `turn_response` frames
/// into its turn slot until the socket closes.
pub async fn handle_participant(socket: WebSocket, state: Arc<GatewayState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let profile = match authenticate(&mut ws_rx, &state).await {
        Ok(profile) => profile,
        Err(AuthError::Disconnected) => {
            debug!("participant disconnected before identifying");
            return;
        },
        Err(e) => {
            warn!(error = %e, "participant authentication failed");
            let frame = CloseFrame {
                code: close_codes::POLICY_VIOLATION,
                reason: e.close_reason().into(),
            };
            let _ = ws_tx.send(Message::Close(Some(frame))).await;
            return;
        },
    };

    let (conn, rx) = Connection::channel(state.outbound_queue);
    let writer = tokio::spawn(write_loop(ws_tx, rx));
    let conn_id = conn.conn_id.clone();

    let participant = state.registry.add_participant(profile.clone(), conn).await;
    info!(conn_id = %conn_id, agent_id = %profile.id, agent = %profile.name, "participant joined");
    state
        .registry
        .broadcast(&Event::AgentJoined {
            agent: profile.clone(),
            room_id: state.room_id.clone(),
        })
        .await;

    while let Some(frame) = next_text(&mut ws_rx).await {
        let Ok(text) = frame else {
            continue;
        };
        match serde_json::from_str::<ParticipantFrame>(&text) {
            Ok(ParticipantFrame::TurnResponse(response)) => match participant.slot.put(response) {
                Ok(()) => debug!(agent_id = %profile.id, "turn response delivered"),
                Err(DeliveryError::SlotOccupied) => {
                    warn!(agent_id = %profile.id, "turn response dropped, one already pending");
                },
                Err(DeliveryError::Abandoned) => {
                    debug!(agent_id = %profile.id, "turn response for a replaced connection");
                },
            },
            Ok(ParticipantFrame::Identify { .. }) | Err(_) => {
                debug!(agent_id = %profile.id, "ignoring participant frame");
            },
        }
    }

    let connected_secs = participant.conn.connected_at.elapsed().as_secs();
    drop(participant);
    if let Some(left) = state.registry.release_participant(&profile.id, &conn_id).await {
        state
            .registry
            .broadcast(&Event::AgentLeft {
                agent: left.profile,
                room_id: state.room_id.clone(),
            })
            .await;
    }
    writer.abort();
    info!(conn_id = %conn_id, agent_id = %profile.id, connected_secs, "participant disconnected");
}
