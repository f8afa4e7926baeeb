//! Lazy Request handler (op 14)

use super::{HandlerError, HandlerResult};
use crate::dispatch::Topic;
use crate::events::{GatewayEventType, MemberListUpdateEvent, RateLimitedEvent};
use crate::protocol::{CloseCode, LazyRequestPayload};
use crate::ratelimit::{ActionClass, Decision};
use crate::server::{ConnectionHandle, GatewayState};
use pulse_core::DomainError;
use std::sync::Arc;

/// Handles Lazy Request messages
pub struct LazyRequestHandler;

impl LazyRequestHandler {
    /// Handle a Lazy Request message.
    ///
    /// Opts the session in or out of GUILD_MEMBER_LIST_UPDATE traffic for
    /// one guild. Opting in immediately delivers the current member count
    /// so the client can render without waiting for the next change.
    pub fn handle(
        state: &GatewayState,
        connection: &Arc<ConnectionHandle>,
        payload: LazyRequestPayload,
    ) -> HandlerResult<Option<CloseCode>> {
        let Some(session) = connection.session() else {
            tracing::warn!(
                conn_id = %connection.conn_id(),
                "Lazy request from unauthenticated client"
            );
            return Ok(Some(CloseCode::NotAuthenticated));
        };

        if let Decision::Deny { retry_after } = state
            .rate_limiter()
            .check(connection.conn_id(), ActionClass::LazyRequest)
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

        let user_id = session.user_id();
        if !state.storage().is_member(payload.guild_id, user_id) {
            return Err(HandlerError::Domain(DomainError::NotAMember {
                guild_id: payload.guild_id,
                user_id,
            }));
        }

        let topic = Topic::LazyMemberList(payload.guild_id);
        if payload.subscribe {
            state.registry().subscribe(&session, topic);

            let event = MemberListUpdateEvent {
                guild_id: payload.guild_id,
                member_count: state.storage().member_count(payload.guild_id),
            };
            session
                .deliver(
                    GatewayEventType::GuildMemberListUpdate.as_str(),
                    serde_json::to_value(&event).unwrap_or_default(),
                )
                .map_err(|e| {
                    HandlerError::Internal(format!("Failed to queue member list update: {e}"))
                })?;
        } else {
            state.registry().unsubscribe(&session, topic);
        }

        tracing::debug!(
            session_id = %session.id(),
            guild_id = %payload.guild_id,
            subscribe = payload.subscribe,
            "Lazy request handled"
        );

        Ok(None)
    }
}
