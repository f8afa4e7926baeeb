//! Resume handler (op 4)

use super::{HandlerError, HandlerResult};
use crate::events::{GatewayEventType, ResumedEvent};
use crate::protocol::{CloseCode, GatewayMessage, ResumePayload};
use crate::ratelimit::ActionClass;
use crate::server::{ConnectionHandle, GatewayState};
use crate::session::Session;
use std::sync::Arc;

/// Handles Resume messages
pub struct ResumeHandler;

impl ResumeHandler {
    /// Handle a Resume message.
    ///
    /// A valid resume re-registers the parked session on this connection,
    /// replays every buffered event after the client's sequence number
    /// with its original sequence, then dispatches RESUMED. When the
    /// record is gone or the replay window was lost, the client receives
    /// INVALID_SESSION and may re-identify on the same connection.
    pub fn handle(
        state: &GatewayState,
        connection: &Arc<ConnectionHandle>,
        payload: ResumePayload,
    ) -> HandlerResult<Option<CloseCode>> {
        if connection.is_authenticated() {
            tracing::warn!(
                conn_id = %connection.conn_id(),
                "Client sent Resume while already authenticated"
            );
            return Ok(Some(CloseCode::AlreadyAuthenticated));
        }

        if !state
            .rate_limiter()
            .check(connection.conn_id(), ActionClass::Resume)
            .is_allowed()
        {
            return Ok(Some(CloseCode::RateLimited));
        }

        let token = payload
            .token
            .strip_prefix("Bearer ")
            .unwrap_or(&payload.token);

        let user_id = match state.tokens().authenticate(token) {
            Ok(id) => id,
            Err(e) => {
                tracing::debug!(
                    conn_id = %connection.conn_id(),
                    error = %e,
                    "Token validation failed during resume"
                );
                connection
                    .send_frame(GatewayMessage::invalid_session(false))
                    .ok();
                return Ok(None);
            }
        };

        // Hold the dispatcher's transition lock from take through replay:
        // an event dispatched meanwhile waits, then finds the live
        // session, instead of falling between record and registry.
        let _transition = state.dispatcher().transition();

        let Some(record) = state.resume_store().take(&payload.session_id) else {
            tracing::debug!(
                session_id = %payload.session_id,
                user_id = %user_id,
                "Resume failed: no resumable session"
            );
            connection
                .send_frame(GatewayMessage::invalid_session(false))
                .ok();
            return Ok(None);
        };

        // A record may only be resumed by the user that owns it
        if record.user_id() != user_id {
            tracing::warn!(
                session_id = %payload.session_id,
                user_id = %user_id,
                owner_id = %record.user_id(),
                "Resume rejected: session belongs to another user"
            );
            return Ok(Some(CloseCode::AuthenticationFailed));
        }

        // The client cannot have seen a sequence number that was never sent
        if payload.seq >= record.next_seq() {
            tracing::debug!(
                session_id = %payload.session_id,
                client_seq = payload.seq,
                next_seq = record.next_seq(),
                "Resume rejected: sequence ahead of session"
            );
            return Ok(Some(CloseCode::InvalidSequence));
        }

        if !record.can_replay_from(payload.seq) {
            tracing::debug!(
                session_id = %payload.session_id,
                client_seq = payload.seq,
                "Resume failed: replay window lost"
            );
            connection
                .send_frame(GatewayMessage::invalid_session(false))
                .ok();
            return Ok(None);
        }

        let (shard_id, shard_count) = record.shard();
        let session = Arc::new(Session::with_next_seq(
            record.session_id().to_string(),
            user_id,
            shard_id,
            shard_count,
            record.next_seq(),
            connection.sender(),
            connection.close_signal().clone(),
        ));
        state.registry().register(session.clone());
        for &topic in record.subscriptions() {
            state.registry().subscribe(&session, topic);
        }

        let missed = record.events_after(payload.seq);
        let replayed = missed.len();
        for event in missed {
            session
                .send_frame(GatewayMessage::dispatch(
                    event.event_type,
                    event.seq,
                    event.data,
                ))
                .map_err(|e| HandlerError::Internal(format!("Failed to replay event: {e}")))?;
        }

        let resumed_data = serde_json::to_value(ResumedEvent::default())
            .map_err(|e| HandlerError::Internal(format!("Failed to serialize RESUMED: {e}")))?;
        session
            .deliver(GatewayEventType::Resumed.as_str(), resumed_data)
            .map_err(|e| HandlerError::Internal(format!("Failed to queue RESUMED: {e}")))?;

        connection.set_session(session.clone());

        tracing::info!(
            session_id = %session.id(),
            user_id = %user_id,
            client_seq = payload.seq,
            replayed,
            "Session resumed"
        );

        Ok(None)
    }
}
