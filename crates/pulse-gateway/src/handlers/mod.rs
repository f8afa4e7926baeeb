//! Op code handlers
//!
//! Handles incoming WebSocket messages based on their operation code.

mod error;
mod heartbeat;
mod identify;
mod lazy_request;
mod presence;
mod resume;

pub use error::{HandlerError, HandlerResult};
pub use heartbeat::HeartbeatHandler;
pub use identify::IdentifyHandler;
pub use lazy_request::LazyRequestHandler;
pub use presence::PresenceHandler;
pub use resume::ResumeHandler;

use crate::protocol::{CloseCode, GatewayMessage, OpCode};
use crate::server::{ConnectionHandle, GatewayState};
use std::sync::Arc;

/// Routes incoming client messages to the handler for their op code
pub struct MessageRouter;

impl MessageRouter {
    /// Handle an incoming client message
    pub fn route(
        state: &GatewayState,
        connection: &Arc<ConnectionHandle>,
        message: GatewayMessage,
    ) -> HandlerResult<Option<CloseCode>> {
        if !message.op.is_client_op() {
            tracing::warn!(
                conn_id = %connection.conn_id(),
                op = %message.op,
                "Received server-only op code from client"
            );
            return Ok(Some(CloseCode::UnknownOpcode));
        }

        match message.op {
            OpCode::Heartbeat => {
                let seq = message.as_heartbeat_seq().ok_or_else(|| {
                    HandlerError::InvalidPayload("Invalid Heartbeat payload".to_string())
                })?;

                HeartbeatHandler::handle(connection, seq)
            }
            OpCode::Identify => {
                let payload = message.as_identify().ok_or_else(|| {
                    HandlerError::InvalidPayload("Invalid Identify payload".to_string())
                })?;

                IdentifyHandler::handle(state, connection, payload)
            }
            OpCode::Resume => {
                let payload = message.as_resume().ok_or_else(|| {
                    HandlerError::InvalidPayload("Invalid Resume payload".to_string())
                })?;

                ResumeHandler::handle(state, connection, payload)
            }
            OpCode::PresenceUpdate => {
                let payload = message.as_presence_update().ok_or_else(|| {
                    HandlerError::InvalidPayload("Invalid PresenceUpdate payload".to_string())
                })?;

                PresenceHandler::handle(state, connection, payload)
            }
            OpCode::LazyRequest => {
                let payload = message.as_lazy_request().ok_or_else(|| {
                    HandlerError::InvalidPayload("Invalid LazyRequest payload".to_string())
                })?;

                LazyRequestHandler::handle(state, connection, payload)
            }
            // These ops never reach here due to the is_client_op check
            _ => {
                tracing::error!(op = %message.op, "Unhandled client op code");
                Ok(Some(CloseCode::UnknownOpcode))
            }
        }
    }
}
