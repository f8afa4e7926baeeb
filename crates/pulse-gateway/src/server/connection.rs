//! Connection handle
//!
//! Tracks one WebSocket connection from accept to teardown. A connection
//! starts unauthenticated; after a successful IDENTIFY or RESUME it
//! carries the authenticated `Session`. Heartbeat liveness belongs to
//! the connection, not the session, because the identify-timeout
//! watchdog also needs it before authentication.

use crate::protocol::{CloseCode, GatewayMessage};
use crate::session::{CloseSignal, DeliveryError, Session};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// A single WebSocket connection
pub struct ConnectionHandle {
    conn_id: String,
    sender: mpsc::Sender<GatewayMessage>,
    close: CloseSignal,
    session: RwLock<Option<Arc<Session>>>,
    last_heartbeat: RwLock<Instant>,
    created_at: Instant,
}

impl ConnectionHandle {
    pub fn new(conn_id: String, sender: mpsc::Sender<GatewayMessage>) -> Arc<Self> {
        Arc::new(Self {
            conn_id,
            sender,
            close: CloseSignal::new(),
            session: RwLock::new(None),
            last_heartbeat: RwLock::new(Instant::now()),
            created_at: Instant::now(),
        })
    }

    pub fn conn_id(&self) -> &str {
        &self.conn_id
    }

    /// A clone of the outbound queue handle, for building the session
    pub fn sender(&self) -> mpsc::Sender<GatewayMessage> {
        self.sender.clone()
    }

    /// The close signal shared with the session and the write loop
    pub fn close_signal(&self) -> &CloseSignal {
        &self.close
    }

    /// The authenticated session, if IDENTIFY or RESUME succeeded
    pub fn session(&self) -> Option<Arc<Session>> {
        self.session.read().clone()
    }

    pub fn set_session(&self, session: Arc<Session>) {
        *self.session.write() = Some(session);
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.read().is_some()
    }

    /// Enqueue a frame outside any session (ACKs, INVALID_SESSION)
    pub fn send_frame(&self, frame: GatewayMessage) -> Result<(), DeliveryError> {
        match self.sender.try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(DeliveryError::Saturated),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(DeliveryError::Closed),
        }
    }

    /// Ask the write loop to close the socket with a code. Goes through
    /// the close signal rather than the frame queue, so it cannot be
    /// dropped when the queue is full.
    pub fn request_close(&self, code: CloseCode) {
        self.close.request(code);
    }

    pub fn record_heartbeat(&self) {
        *self.last_heartbeat.write() = Instant::now();
    }

    pub fn time_since_heartbeat(&self) -> Duration {
        self.last_heartbeat.read().elapsed()
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("conn_id", &self.conn_id)
            .field("authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::Snowflake;

    #[tokio::test]
    async fn test_starts_unauthenticated() {
        let (tx, _rx) = mpsc::channel(4);
        let conn = ConnectionHandle::new("c1".to_string(), tx);

        assert!(!conn.is_authenticated());
        assert!(conn.session().is_none());
    }

    #[tokio::test]
    async fn test_set_session_authenticates() {
        let (tx, _rx) = mpsc::channel(4);
        let conn = ConnectionHandle::new("c1".to_string(), tx);

        let session = Arc::new(Session::new(
            "c1".to_string(),
            Snowflake::new(1),
            0,
            1,
            conn.sender(),
            conn.close_signal().clone(),
        ));
        conn.set_session(session);

        assert!(conn.is_authenticated());
        assert_eq!(conn.session().map(|s| s.user_id()), Some(Snowflake::new(1)));
    }

    #[tokio::test]
    async fn test_heartbeat_tracking() {
        let (tx, _rx) = mpsc::channel(4);
        let conn = ConnectionHandle::new("c1".to_string(), tx);

        conn.record_heartbeat();
        assert!(conn.time_since_heartbeat() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_request_close_signals_write_loop() {
        let (tx, _rx) = mpsc::channel(4);
        let conn = ConnectionHandle::new("c1".to_string(), tx);
        let mut watch = conn.close_signal().watch();

        conn.request_close(CloseCode::RateLimited);
        assert!(watch.changed().await.is_ok());
        assert_eq!(*watch.borrow(), Some(CloseCode::RateLimited));

        // a later request does not replace the first code
        conn.request_close(CloseCode::UnknownError);
        assert_eq!(
            conn.close_signal().requested(),
            Some(CloseCode::RateLimited)
        );
    }
}
