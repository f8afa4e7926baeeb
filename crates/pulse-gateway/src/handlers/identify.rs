//! Identify handler (op 2)

use super::{HandlerError, HandlerResult};
use crate::dispatch::Topic;
use crate::events::{GatewayEventType, GuildPayload, ReadyEvent};
use crate::protocol::{CloseCode, IdentifyPayload};
use crate::ratelimit::ActionClass;
use crate::server::{ConnectionHandle, GatewayState};
use crate::session::Session;
use std::sync::Arc;

/// Handles Identify messages
pub struct IdentifyHandler;

impl IdentifyHandler {
    /// Handle an Identify message
    ///
    /// On success the connection carries an authenticated session, a
    /// READY dispatch with sequence 0 is queued, followed by one
    /// GUILD_CREATE per guild routed to this shard.
    pub fn handle(
        state: &GatewayState,
        connection: &Arc<ConnectionHandle>,
        payload: IdentifyPayload,
    ) -> HandlerResult<Option<CloseCode>> {
        if connection.is_authenticated() {
            tracing::warn!(
                conn_id = %connection.conn_id(),
                "Client sent Identify while already authenticated"
            );
            return Ok(Some(CloseCode::AlreadyAuthenticated));
        }

        if !state
            .rate_limiter()
            .check(connection.conn_id(), ActionClass::Identify)
            .is_allowed()
        {
            return Ok(Some(CloseCode::RateLimited));
        }

        // Accept tokens with or without the Bearer prefix
        let token = payload
            .token
            .strip_prefix("Bearer ")
            .unwrap_or(&payload.token);

        let user_id = state.tokens().authenticate(token).map_err(|e| {
            tracing::debug!(conn_id = %connection.conn_id(), error = %e, "Token validation failed");
            HandlerError::AuthenticationFailed(e.to_string())
        })?;

        let user = state
            .storage()
            .user(user_id)
            .ok_or_else(|| HandlerError::AuthenticationFailed("Unknown user".to_string()))?;

        let (shard_id, shard_count) = payload.shard_pair();
        if shard_count == 0 || shard_id >= shard_count {
            tracing::debug!(
                conn_id = %connection.conn_id(),
                shard_id,
                shard_count,
                "Rejected invalid shard pair"
            );
            return Ok(Some(CloseCode::InvalidShard));
        }

        let session = Arc::new(Session::new(
            connection.conn_id().to_string(),
            user_id,
            shard_id,
            shard_count,
            connection.sender(),
            connection.close_signal().clone(),
        ));
        state.registry().register(session.clone());

        // Guild topics, restricted to guilds that route to this shard
        let mut guild_ids: Vec<_> = state
            .storage()
            .guilds_for_user(user_id)
            .into_iter()
            .filter(|&g| session.accepts_guild(g))
            .collect();
        guild_ids.sort_unstable();

        for &guild_id in &guild_ids {
            state.registry().subscribe(&session, Topic::Guild(guild_id));
        }

        // Friend topics: events about each friend reach this session
        for peer in state.storage().friends_of(user_id) {
            state.registry().subscribe(&session, Topic::Friend(peer));
        }

        let ready = ReadyEvent {
            v: ReadyEvent::VERSION,
            user,
            guild_ids: guild_ids.clone(),
            session_id: session.id().to_string(),
        };
        let ready_data = serde_json::to_value(&ready)
            .map_err(|e| HandlerError::Internal(format!("Failed to serialize READY: {e}")))?;

        session
            .deliver(GatewayEventType::Ready.as_str(), ready_data)
            .map_err(|e| HandlerError::Internal(format!("Failed to queue READY: {e}")))?;

        for &guild_id in &guild_ids {
            let Some(guild) = state.storage().guild(guild_id) else {
                continue;
            };
            let guild_create = GuildPayload {
                id: guild.id,
                name: guild.name,
                owner_id: guild.owner_id,
                member_count: state.storage().member_count(guild_id),
            };
            let data = serde_json::to_value(&guild_create).map_err(|e| {
                HandlerError::Internal(format!("Failed to serialize GUILD_CREATE: {e}"))
            })?;

            session
                .deliver(GatewayEventType::GuildCreate.as_str(), data)
                .map_err(|e| HandlerError::Internal(format!("Failed to queue GUILD_CREATE: {e}")))?;
        }

        connection.set_session(session.clone());

        tracing::info!(
            session_id = %session.id(),
            user_id = %user_id,
            shard_id,
            shard_count,
            guilds = guild_ids.len(),
            "Client identified"
        );

        Ok(None)
    }
}
