//! Heartbeat handler (op 1)

use super::{HandlerError, HandlerResult};
use crate::protocol::{CloseCode, GatewayMessage};
use crate::server::ConnectionHandle;
use std::sync::Arc;

/// Handles heartbeat messages
pub struct HeartbeatHandler;

impl HeartbeatHandler {
    /// Handle a heartbeat from the client.
    ///
    /// Heartbeats are accepted before authentication; the watchdog uses
    /// them from the moment the socket opens. `last_sequence` is the
    /// client's last received sequence number, or None before any
    /// dispatch.
    pub fn handle(
        connection: &Arc<ConnectionHandle>,
        last_sequence: Option<u64>,
    ) -> HandlerResult<Option<CloseCode>> {
        connection.record_heartbeat();

        tracing::trace!(
            conn_id = %connection.conn_id(),
            client_seq = ?last_sequence,
            "Heartbeat received"
        );

        connection
            .send_frame(GatewayMessage::heartbeat_ack())
            .map_err(|e| HandlerError::Internal(format!("Failed to queue heartbeat ACK: {e}")))?;

        Ok(None)
    }
}
