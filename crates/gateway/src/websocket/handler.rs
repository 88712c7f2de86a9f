//! WebSocket handler for Axum
//!
//! Handles WebSocket connections, authentication, heartbeats and event routing.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::Response,
};
use futures::{stream::StreamExt, Sink, SinkExt, Stream};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use huddle_shared::UserId;

use crate::auth::bearer_token;
use crate::error::{ApiResult, CoordinatorError, CoordinatorResult};
use crate::state::AppState;

use super::{
    connection::Connection,
    events::{
        CallCommand, ClientEvent, PresenceCommand, RoomCommand, ServerEvent, SessionCommand,
        SessionEvent, SignalCommand,
    },
    signaling::SignalKind,
    state::Coordinator,
};

#[derive(Debug, Deserialize)]
pub struct WebSocketQuery {
    token: Option<String>,
}

/// WebSocket handler - upgrades HTTP connection to WebSocket.
/// The credential comes from the `token` query parameter or a Bearer header;
/// nothing is registered unless it verifies.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
    Query(params): Query<WebSocketQuery>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let token = params
        .token
        .as_deref()
        .or_else(|| bearer_token(&headers))
        .ok_or_else(|| {
            tracing::warn!("WebSocket auth failed: no credential presented");
            CoordinatorError::AuthenticationFailed
        })?;

    let identity = app_state.verifier.verify(token).map_err(|e| {
        tracing::warn!(error = %e, "WebSocket auth failed: invalid token");
        CoordinatorError::AuthenticationFailed
    })?;

    tracing::info!(user_id = %identity.user_id, "WebSocket connection upgrade requested");

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, identity.user_id, app_state)))
}

/// Heartbeat supervision settings for one connection
#[derive(Debug, Clone, Copy)]
pub struct Heartbeat {
    /// How often a ping goes out
    pub interval: Duration,
    /// Inbound silence after which the connection is closed
    pub timeout: Duration,
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, user_id: UserId, app_state: AppState) {
    let (sender, receiver) = socket.split();

    // Create channel for sending events to this connection
    let (tx, rx) = mpsc::unbounded_channel::<ServerEvent>();

    let coordinator = app_state.coordinator.clone();
    let conn = coordinator.open_connection(user_id, tx).await;

    let heartbeat = Heartbeat {
        interval: app_state.config.heartbeat_interval,
        timeout: app_state.config.heartbeat_timeout,
    };

    run_session(sender, receiver, rx, conn, &coordinator, heartbeat).await;
}

/// Drive a registered connection until the peer closes, the transport fails
/// or the heartbeat expires, then close it in the coordinator.
pub async fn run_session<S, R, E>(
    sink: S,
    mut stream: R,
    rx: mpsc::UnboundedReceiver<ServerEvent>,
    conn: Arc<Connection>,
    coordinator: &Coordinator,
    heartbeat: Heartbeat,
) where
    S: Sink<Message> + Unpin + Send + 'static,
    R: Stream<Item = Result<Message, E>> + Unpin + Send,
    E: std::fmt::Display + Send,
{
    let session_id = conn.session_id;
    let mut send_task = tokio::spawn(pump_outbound(sink, rx, Arc::clone(&conn), heartbeat));

    // Handle incoming messages
    loop {
        tokio::select! {
            msg = stream.next() => {
                match msg {
                    Some(Ok(msg)) => {
                        conn.touch();
                        match msg {
                            Message::Text(text) => {
                                handle_frame(&text, &conn, coordinator).await;
                            }
                            Message::Close(_) => {
                                tracing::info!(session_id = %session_id, "WebSocket close frame received");
                                break;
                            }
                            // Pong replies and pings only refresh liveness
                            _ => {}
                        }
                    }
                    Some(Err(e)) => {
                        tracing::debug!(session_id = %session_id, error = %e, "WebSocket transport error");
                        break;
                    }
                    None => break,
                }
            }
            _ = &mut send_task => break,
        }
    }

    // Cleanup on disconnect
    tracing::info!(session_id = %session_id, user_id = %conn.user_id, "WebSocket connection closing");
    coordinator.close_connection(&conn).await;

    send_task.abort();
}

/// Outbound events plus heartbeat supervision. Returns once the sink fails,
/// the event channel closes or the connection has been idle too long.
async fn pump_outbound<S>(
    mut sink: S,
    mut rx: mpsc::UnboundedReceiver<ServerEvent>,
    watched: Arc<Connection>,
    heartbeat: Heartbeat,
) where
    S: Sink<Message> + Unpin,
{
    let mut ticker = tokio::time::interval(heartbeat.interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                match serde_json::to_string(&event) {
                    Ok(json) => {
                        if sink.send(Message::Text(json)).await.is_err() {
                            break; // Connection closed
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = ?e, "Failed to serialize WebSocket event");
                    }
                }
            }
            _ = ticker.tick() => {
                if is_expired(watched.idle_for(), heartbeat.timeout) {
                    tracing::info!(
                        session_id = %watched.session_id,
                        idle_secs = watched.idle_for().as_secs(),
                        "Heartbeat timeout, closing connection"
                    );
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }
}

fn is_expired(idle: Duration, timeout: Duration) -> bool {
    idle > timeout
}

/// Parse and route one text frame. Malformed frames are answered with an
/// `INVALID_EVENT` error and the session continues.
pub async fn handle_frame(text: &str, conn: &Arc<Connection>, coordinator: &Coordinator) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(
                session_id = %conn.session_id,
                error = ?e,
                "Failed to parse client event"
            );
            let err = CoordinatorError::InvalidEvent("Invalid event format".to_string());
            let _ = conn.send(ServerEvent::error(err.code(), err.to_string()));
            return;
        }
    };

    if let Err(err) = handle_client_event(event, conn, coordinator).await {
        tracing::debug!(
            session_id = %conn.session_id,
            code = err.code(),
            "Client event rejected"
        );
        let _ = conn.send(ServerEvent::error(err.code(), err.to_string()));
    }
}

/// Route a client event. An `Err` is reported to the requesting connection
/// only.
async fn handle_client_event(
    event: ClientEvent,
    conn: &Arc<Connection>,
    coordinator: &Coordinator,
) -> CoordinatorResult<()> {
    let user_id = conn.user_id;

    match event {
        ClientEvent::Session(command) => match command {
            SessionCommand::Ping => {
                let _ = conn.send(SessionEvent::Pong.into());
            }
            SessionCommand::RoomWatch { room_id } => {
                coordinator.watch_room(Arc::clone(conn), &room_id).await?;
            }
            SessionCommand::RoomUnwatch { room_id } => {
                coordinator.unwatch_room(conn, &room_id).await;
            }
            SessionCommand::ChatSend { target_id, content } => {
                match coordinator.send_chat(user_id, target_id, content).await {
                    Err(CoordinatorError::TargetUnreachable) => {
                        tracing::debug!(user_id = %user_id, target_id = %target_id, "Chat target offline");
                    }
                    other => {
                        other?;
                    }
                }
            }
        },

        ClientEvent::Presence(PresenceCommand::StatusChange { status, message }) => {
            coordinator.presence.set_status(user_id, status, message).await?;
        }

        ClientEvent::Room(command) => match command {
            RoomCommand::RoomJoin { room_id } => {
                coordinator.rooms.join(user_id, &room_id).await?;
            }
            RoomCommand::RoomLeave { room_id } => {
                coordinator.rooms.leave(user_id, &room_id).await?;
            }
            RoomCommand::RoomKnock { room_id } => {
                coordinator.rooms.knock(user_id, &room_id).await?;
            }
        },

        ClientEvent::Call(command) => {
            let outcome = match command {
                CallCommand::CallInitiate { target_id, kind } => {
                    coordinator.calls.initiate(user_id, target_id, kind).await
                }
                CallCommand::CallAccept { caller_id } => {
                    coordinator.calls.accept(user_id, caller_id).await
                }
                CallCommand::CallReject { caller_id } => {
                    coordinator.calls.reject(user_id, caller_id).await
                }
                CallCommand::CallEnd { participant_ids } => {
                    Ok(coordinator.calls.end(user_id, &participant_ids).await)
                }
            };
            swallow_relay_failure(user_id, outcome);
        }

        ClientEvent::Signal(command) => {
            let (kind, target_id, payload) = match command {
                SignalCommand::SignalOffer { target_id, payload } => {
                    (SignalKind::Offer, target_id, payload)
                }
                SignalCommand::SignalAnswer { target_id, payload } => {
                    (SignalKind::Answer, target_id, payload)
                }
                SignalCommand::SignalIce { target_id, payload } => {
                    (SignalKind::Ice, target_id, payload)
                }
            };
            let outcome = coordinator
                .calls
                .signal(kind, user_id, target_id, payload)
                .await;
            swallow_relay_failure(user_id, outcome);
        }
    }

    Ok(())
}

/// Relay delivery is best-effort: failures are logged, never reported
fn swallow_relay_failure(user_id: UserId, outcome: CoordinatorResult<usize>) {
    if let Err(e) = outcome {
        tracing::debug!(user_id = %user_id, error = %e, "Relay event not delivered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_shared::{MemoryStore, PresenceStatus, RoomDefinition, RoomId};
    use serde_json::json;

    async fn setup() -> (Coordinator, Arc<Connection>, mpsc::UnboundedReceiver<ServerEvent>) {
        let store = Arc::new(MemoryStore::with_rooms([RoomDefinition {
            id: RoomId::from("focus-booth"),
            name: "Focus Booth".to_string(),
            capacity: 1,
            restricted: false,
        }]));
        let coordinator = Coordinator::new(store, false);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = coordinator.open_connection(UserId::new(), tx).await;
        while rx.try_recv().is_ok() {}
        (coordinator, conn, rx)
    }

    fn error_code(event: ServerEvent) -> String {
        match event {
            ServerEvent::Session(SessionEvent::Error { code, .. }) => code,
            other => panic!("Expected error event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ping_gets_pong() {
        let (coordinator, conn, mut rx) = setup().await;

        handle_frame(r#"{"type":"ping"}"#, &conn, &coordinator).await;

        assert_eq!(rx.try_recv().unwrap(), ServerEvent::Session(SessionEvent::Pong));
    }

    #[tokio::test]
    async fn test_malformed_frame_gets_invalid_event() {
        let (coordinator, conn, mut rx) = setup().await;

        handle_frame("not json", &conn, &coordinator).await;
        assert_eq!(error_code(rx.try_recv().unwrap()), "INVALID_EVENT");

        handle_frame(r#"{"type":"teleport"}"#, &conn, &coordinator).await;
        assert_eq!(error_code(rx.try_recv().unwrap()), "INVALID_EVENT");
    }

    #[tokio::test]
    async fn test_admission_error_goes_to_requester() {
        let (coordinator, conn, mut rx) = setup().await;

        let frame = json!({"type": "room_join", "roomId": "atlantis"}).to_string();
        handle_frame(&frame, &conn, &coordinator).await;

        assert_eq!(error_code(rx.try_recv().unwrap()), "ROOM_NOT_FOUND");
        assert_eq!(
            coordinator.presence.presence_of(&conn.user_id).await.status,
            PresenceStatus::Online
        );
    }

    #[tokio::test]
    async fn test_unselectable_status_rejected() {
        let (coordinator, conn, mut rx) = setup().await;

        let frame = json!({"type": "status_change", "status": "in_meeting"}).to_string();
        handle_frame(&frame, &conn, &coordinator).await;

        assert_eq!(error_code(rx.try_recv().unwrap()), "INVALID_EVENT");
    }

    #[tokio::test]
    async fn test_call_to_offline_target_is_silent() {
        let (coordinator, conn, mut rx) = setup().await;

        let frame = json!({
            "type": "call_initiate",
            "targetId": UserId::new(),
            "kind": "video"
        })
        .to_string();
        handle_frame(&frame, &conn, &coordinator).await;

        assert!(rx.try_recv().is_err());
        assert_eq!(coordinator.calls.active_sessions().await, 0);
    }

    #[tokio::test]
    async fn test_signal_payload_relayed_verbatim() {
        let (coordinator, conn, _rx) = setup().await;
        let peer = UserId::new();
        let (tx, mut peer_rx) = mpsc::unbounded_channel();
        coordinator.open_connection(peer, tx).await;
        while peer_rx.try_recv().is_ok() {}

        let payload = json!({"sdp": "v=0\r\n", "nested": {"n": [1, 2, 3]}});
        let frame = json!({
            "type": "signal_offer",
            "targetId": peer,
            "payload": payload
        })
        .to_string();
        handle_frame(&frame, &conn, &coordinator).await;

        let received = serde_json::to_value(peer_rx.try_recv().unwrap()).unwrap();
        assert_eq!(received["type"], "signal_offer");
        assert_eq!(received["fromId"], json!(conn.user_id));
        assert_eq!(received["payload"], payload);
    }

    #[test]
    fn test_heartbeat_expiry() {
        let timeout = Duration::from_secs(60);
        assert!(!is_expired(Duration::from_secs(59), timeout));
        assert!(!is_expired(timeout, timeout));
        assert!(is_expired(Duration::from_secs(61), timeout));
    }

    fn socket_pair() -> (
        futures::channel::mpsc::UnboundedSender<Message>,
        futures::channel::mpsc::UnboundedReceiver<Message>,
    ) {
        futures::channel::mpsc::unbounded()
    }

    fn sent(outbound: &mut futures::channel::mpsc::UnboundedReceiver<Message>) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Ok(Some(message)) = outbound.try_next() {
            messages.push(message);
        }
        messages
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_session_is_closed() {
        let (coordinator, conn, rx) = setup().await;
        let user_id = conn.user_id;
        let (sink, mut outbound) = socket_pair();
        // Inbound side stays open and silent
        let (_inbound_tx, inbound) =
            futures::channel::mpsc::unbounded::<Result<Message, axum::Error>>();
        let heartbeat = Heartbeat {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(30),
        };

        run_session(sink, inbound, rx, conn, &coordinator, heartbeat).await;

        assert!(!coordinator.registry.is_online(&user_id).await);
        assert_eq!(
            coordinator.presence.presence_of(&user_id).await.status,
            PresenceStatus::Offline
        );
        let messages = sent(&mut outbound);
        assert!(messages.iter().any(|m| matches!(m, Message::Ping(_))));
        assert!(matches!(messages.last(), Some(Message::Close(None))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbound_traffic_keeps_session_alive() {
        let (coordinator, conn, rx) = setup().await;
        let user_id = conn.user_id;
        let (sink, mut outbound) = socket_pair();
        let (inbound_tx, inbound) =
            futures::channel::mpsc::unbounded::<Result<Message, axum::Error>>();
        let heartbeat = Heartbeat {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(30),
        };

        // Answer pings for two minutes, then hang up
        tokio::spawn(async move {
            for _ in 0..12 {
                tokio::time::sleep(Duration::from_secs(10)).await;
                let _ = inbound_tx.unbounded_send(Ok(Message::Pong(Vec::new())));
            }
            let _ = inbound_tx.unbounded_send(Ok(Message::Close(None)));
        });

        let started = tokio::time::Instant::now();
        run_session(sink, inbound, rx, conn, &coordinator, heartbeat).await;

        assert!(started.elapsed() >= Duration::from_secs(120));
        assert!(!coordinator.registry.is_online(&user_id).await);
        assert!(!sent(&mut outbound)
            .iter()
            .any(|m| matches!(m, Message::Close(_))));
    }

    #[tokio::test]
    async fn test_session_routes_frames_until_close() {
        let (coordinator, conn, rx) = setup().await;
        let user_id = conn.user_id;
        let (sink, _outbound) = socket_pair();
        let (inbound_tx, inbound) =
            futures::channel::mpsc::unbounded::<Result<Message, axum::Error>>();
        inbound_tx
            .unbounded_send(Ok(Message::Text(r#"{"type":"ping"}"#.to_string())))
            .unwrap();
        inbound_tx.unbounded_send(Ok(Message::Close(None))).unwrap();
        let heartbeat = Heartbeat {
            interval: Duration::from_secs(25),
            timeout: Duration::from_secs(60),
        };

        run_session(sink, inbound, rx, conn, &coordinator, heartbeat).await;

        assert!(!coordinator.registry.is_online(&user_id).await);
        assert_eq!(
            coordinator.presence.presence_of(&user_id).await.status,
            PresenceStatus::Offline
        );
    }
}
