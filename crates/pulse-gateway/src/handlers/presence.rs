//! Presence Update handler (op 3)

use super::{HandlerError, HandlerResult};
use crate::dispatch::{DispatchOptions, Topic};
use crate::events::{GatewayEventType, PresenceEvent, RateLimitedEvent};
use crate::protocol::{CloseCode, PresenceUpdatePayload};
use crate::ratelimit::{ActionClass, Decision};
use crate::server::{ConnectionHandle, GatewayState};
use std::sync::Arc;

/// Handles Presence Update messages
pub struct PresenceHandler;

impl PresenceHandler {
    /// Handle a Presence Update message.
    ///
    /// The update fans out to the subscribers of every guild the user
    /// belongs to, and to the user's friends. Exceeding the presence
    /// budget does not close the connection; the session receives a
    /// RATE_LIMITED dispatch instead and the update is dropped.
    pub fn handle(
        state: &GatewayState,
        connection: &Arc<ConnectionHandle>,
        payload: PresenceUpdatePayload,
    ) -> HandlerResult<Option<CloseCode>> {
        let Some(session) = connection.session() else {
            tracing::warn!(
                conn_id = %connection.conn_id(),
                "Presence update from unauthenticated client"
            );
            return Ok(Some(CloseCode::NotAuthenticated));
        };

        if let Decision::Deny { retry_after } = state
            .rate_limiter()
            .check(connection.conn_id(), ActionClass::PresenceUpdate)
        {
            let event = RateLimitedEvent::new(retry_after.as_secs_f64());
            session
                .deliver(
                    GatewayEventType::RateLimited.as_str(),
                    serde_json::to_value(&event).unwrap_or_default(),
                )
                .ok();
            return Ok(None);
        }

        if !payload.is_valid_status() {
            return Err(HandlerError::InvalidPayload(format!(
                "Invalid status: {}. Must be one of: online, idle, dnd, offline",
                payload.status
            )));
        }

        let user_id = session.user_id();
        let status = payload.status;

        let mut topics: Vec<Topic> = state
            .storage()
            .guilds_for_user(user_id)
            .into_iter()
            .map(Topic::Guild)
            .collect();
        topics.push(Topic::Friend(user_id));

        let summary = state.dispatcher().dispatch_many(
            &topics,
            GatewayEventType::PresenceUpdate,
            DispatchOptions::default(),
            |topic| {
                let guild_id = match topic {
                    Topic::Guild(id) => Some(id),
                    _ => None,
                };
                serde_json::to_value(PresenceEvent {
                    user_id,
                    guild_id,
                    status: status.clone(),
                })
                .unwrap_or_default()
            },
        );

        tracing::debug!(
            session_id = %session.id(),
            user_id = %user_id,
            status = %status,
            delivered = summary.delivered,
            buffered = summary.buffered,
            "Presence update dispatched"
        );

        Ok(None)
    }
}
