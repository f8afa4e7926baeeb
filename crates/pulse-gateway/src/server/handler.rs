//! WebSocket handler
//!
//! Drives one connection from upgrade to teardown: sends HELLO, then runs
//! a receive loop, a write loop, and a liveness watchdog until one of
//! them decides the connection is over. Teardown parks the session for
//! resumption when the close was resumable, otherwise invalidates it.

use crate::handlers::MessageRouter;
use crate::protocol::{CloseCode, GatewayMessage};
use crate::ratelimit::ActionClass;
use crate::server::{ConnectionHandle, GatewayState};
use crate::session::Session;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

/// How long teardown waits for the write loop to flush a close frame
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// WebSocket gateway handler
pub async fn gateway_handler(
    State(state): State<GatewayState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(state, socket))
}

/// Handle an upgraded WebSocket connection
async fn handle_socket(state: GatewayState, socket: WebSocket) {
    let conn_id = Session::generate_id();
    let (tx, mut rx) = tokio::sync::mpsc::channel::<GatewayMessage>(
        state.config().session.send_queue_size,
    );
    let connection = ConnectionHandle::new(conn_id.clone(), tx);

    tracing::info!(conn_id = %conn_id, "WebSocket connection established");

    let (mut ws_sink, mut ws_stream) = socket.split();

    // HELLO goes out before anything else
    let hello = GatewayMessage::hello(state.config().heartbeat.interval_ms);
    if let Ok(json) = hello.to_json() {
        if ws_sink.send(Message::Text(json.into())).await.is_err() {
            tracing::warn!(conn_id = %conn_id, "Failed to send Hello message");
            return;
        }
    }

    let state_recv = state.clone();
    let connection_recv = connection.clone();
    let conn_id_recv = conn_id.clone();

    // Receive loop: Some(code) = server decided to close, None = clean
    // client close.
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = ws_stream.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if let Err(close_code) =
                        handle_text_message(&state_recv, &connection_recv, &text)
                    {
                        tracing::debug!(
                            conn_id = %conn_id_recv,
                            close_code = %close_code,
                            "Closing connection"
                        );
                        return Some(close_code);
                    }
                }
                Ok(Message::Binary(_)) => {
                    tracing::debug!(conn_id = %conn_id_recv, "Binary messages not supported");
                    return Some(CloseCode::DecodeError);
                }
                Ok(Message::Ping(_) | Message::Pong(_)) => {}
                Ok(Message::Close(_)) => {
                    tracing::info!(conn_id = %conn_id_recv, "Client closed connection");
                    return None;
                }
                Err(e) => {
                    tracing::warn!(conn_id = %conn_id_recv, error = %e, "WebSocket error");
                    return Some(CloseCode::UnknownError);
                }
            }
        }
        // stream ended without a close frame
        Some(CloseCode::UnknownError)
    });

    let conn_id_send = conn_id.clone();
    let mut close_rx = connection.close_signal().watch();

    // Write loop: frames come through the queue, close requests through
    // the watched close signal so a full queue cannot swallow them.
    // Some(code) = close frame transmitted, None = transport gave out
    // first.
    let mut send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(frame) => {
                        if let Ok(json) = frame.to_json() {
                            if ws_sink.send(Message::Text(json.into())).await.is_err() {
                                tracing::warn!(
                                    conn_id = %conn_id_send,
                                    "Failed to write to WebSocket"
                                );
                                return None;
                            }
                        }
                    }
                    None => {
                        let _ = ws_sink.close().await;
                        return None;
                    }
                },
                Ok(()) = close_rx.changed() => {
                    let Some(code) = *close_rx.borrow_and_update() else {
                        continue;
                    };
                    // flush frames queued ahead of the close request
                    while let Ok(frame) = rx.try_recv() {
                        if let Ok(json) = frame.to_json() {
                            if ws_sink.send(Message::Text(json.into())).await.is_err() {
                                return None;
                            }
                        }
                    }
                    let frame = CloseFrame {
                        code: code.as_u16(),
                        reason: code.description().into(),
                    };
                    let _ = ws_sink.send(Message::Close(Some(frame))).await;
                    return Some(code);
                }
            }
        }
    });

    let connection_wd = connection.clone();
    let conn_id_wd = conn_id.clone();
    let heartbeat_timeout = Duration::from_millis(state.config().heartbeat.timeout_ms());
    let identify_timeout = Duration::from_secs(state.config().session.identify_timeout_secs);
    let check_every =
        Duration::from_millis((state.config().heartbeat.interval_ms / 2).max(500));

    // Watchdog: silent connections and connections that never identify
    // are timed out.
    let mut watchdog_task = tokio::spawn(async move {
        let mut ticker = interval(check_every);
        loop {
            ticker.tick().await;

            if !connection_wd.is_authenticated() && connection_wd.age() > identify_timeout {
                tracing::debug!(conn_id = %conn_id_wd, "Connection never identified");
                return CloseCode::SessionTimeout;
            }

            let silence = connection_wd.time_since_heartbeat();
            if silence > heartbeat_timeout {
                tracing::warn!(
                    conn_id = %conn_id_wd,
                    silence_ms = silence.as_millis() as u64,
                    "Connection timed out (no heartbeat)"
                );
                return CloseCode::SessionTimeout;
            }
        }
    });

    let resumable = tokio::select! {
        result = &mut recv_task => {
            watchdog_task.abort();
            match result.ok().flatten() {
                Some(code) => {
                    connection.request_close(code);
                    let _ = tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, &mut send_task).await;
                    code.is_resumable()
                }
                // deliberate disconnect; nothing to resume
                None => false,
            }
        }
        result = &mut send_task => {
            recv_task.abort();
            watchdog_task.abort();
            // transport failures are resumable, transmitted closes follow
            // their code
            result.ok().flatten().map_or(true, CloseCode::is_resumable)
        }
        result = &mut watchdog_task => {
            recv_task.abort();
            let code = result.unwrap_or(CloseCode::UnknownError);
            connection.request_close(code);
            let _ = tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, &mut send_task).await;
            code.is_resumable()
        }
    };

    recv_task.abort();
    send_task.abort();
    watchdog_task.abort();

    teardown(&state, &connection, resumable);
}

/// Handle a text message from the client
fn handle_text_message(
    state: &GatewayState,
    connection: &Arc<ConnectionHandle>,
    text: &str,
) -> Result<(), CloseCode> {
    // Overall inbound flood budget, checked before parsing
    if !state
        .rate_limiter()
        .check(connection.conn_id(), ActionClass::Recv)
        .is_allowed()
    {
        tracing::warn!(conn_id = %connection.conn_id(), "Inbound frame budget exceeded");
        return Err(CloseCode::RateLimited);
    }

    let message = GatewayMessage::from_json(text).map_err(|e| {
        tracing::debug!(
            conn_id = %connection.conn_id(),
            error = %e,
            "Failed to parse message"
        );
        CloseCode::DecodeError
    })?;

    tracing::trace!(
        conn_id = %connection.conn_id(),
        op = %message.op,
        "Received message"
    );

    match MessageRouter::route(state, connection, message) {
        Ok(Some(close_code)) => Err(close_code),
        Ok(None) => Ok(()),
        Err(e) => {
            tracing::warn!(
                conn_id = %connection.conn_id(),
                error = %e,
                "Handler error"
            );
            Err(e.to_close_code().unwrap_or(CloseCode::UnknownError))
        }
    }
}

/// Tear down a connection. A resumable close parks the session so the
/// client can RESUME within the TTL; anything else invalidates it.
fn teardown(state: &GatewayState, connection: &Arc<ConnectionHandle>, resumable: bool) {
    state.rate_limiter().forget(connection.conn_id());

    let Some(session) = connection.session() else {
        tracing::debug!(
            conn_id = %connection.conn_id(),
            "Connection closed before authenticating"
        );
        return;
    };

    if resumable {
        // Park before unregistering, under the dispatcher's transition
        // lock: a dispatch racing with teardown must find the session in
        // exactly one of the two sinks.
        let _transition = state.dispatcher().transition();
        state.resume_store().park(&session);
        state.registry().unregister(session.id());
    } else {
        state.registry().unregister(session.id());
        state.resume_store().invalidate(session.id());
        tracing::info!(session_id = %session.id(), "Session closed");
    }
}
