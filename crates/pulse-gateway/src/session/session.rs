//! Authenticated session state
//!
//! A `Session` exists only after a successful IDENTIFY or RESUME. It owns
//! the per-session sequence counter and the outbound queue handle; the
//! actual socket write loop lives in the server module.

use crate::dispatch::Topic;
use crate::protocol::{CloseCode, GatewayMessage};
use parking_lot::{Mutex, RwLock};
use pulse_core::Snowflake;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Why a delivery attempt did not enqueue
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The outbound queue is full; the session is too slow to keep up
    #[error("outbound queue saturated")]
    Saturated,
    /// The receiving half is gone; the connection is being torn down
    #[error("outbound queue closed")]
    Closed,
}

/// Out-of-band close signal shared by a connection and its session.
///
/// Close requests never ride the data queue: a saturated queue would
/// drop them and leave the connection live after a failed delivery. The
/// socket write loop watches this signal instead, so a requested close
/// always tears the connection down. The first requested code wins.
#[derive(Debug, Clone)]
pub struct CloseSignal {
    tx: Arc<watch::Sender<Option<CloseCode>>>,
}

impl CloseSignal {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Request a close. Later requests do not overwrite the first code.
    pub fn request(&self, code: CloseCode) {
        self.tx.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = Some(code);
                true
            } else {
                false
            }
        });
    }

    /// The requested close code, if any
    #[must_use]
    pub fn requested(&self) -> Option<CloseCode> {
        *self.tx.borrow()
    }

    /// A receiver for the socket write loop to watch
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Option<CloseCode>> {
        self.tx.subscribe()
    }
}

impl Default for CloseSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// An authenticated gateway session
pub struct Session {
    id: String,
    user_id: Snowflake,
    shard_id: u32,
    shard_count: u32,
    /// Sequence number the next dispatch will carry. Starts at 0 so the
    /// READY dispatch is seq 0.
    next_seq: AtomicU64,
    /// Serializes stamp-and-enqueue so per-session delivery order matches
    /// sequence order even under concurrent dispatches.
    delivery: Mutex<()>,
    sender: mpsc::Sender<GatewayMessage>,
    close: CloseSignal,
    subscriptions: RwLock<HashSet<Topic>>,
}

impl Session {
    /// Generate a new session ID
    #[must_use]
    pub fn generate_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Create a fresh session with the sequence counter at 0
    #[must_use]
    pub fn new(
        id: String,
        user_id: Snowflake,
        shard_id: u32,
        shard_count: u32,
        sender: mpsc::Sender<GatewayMessage>,
        close: CloseSignal,
    ) -> Self {
        Self::with_next_seq(id, user_id, shard_id, shard_count, 0, sender, close)
    }

    /// Recreate a session that continues a previous sequence counter.
    /// Used on resume.
    #[must_use]
    pub fn with_next_seq(
        id: String,
        user_id: Snowflake,
        shard_id: u32,
        shard_count: u32,
        next_seq: u64,
        sender: mpsc::Sender<GatewayMessage>,
        close: CloseSignal,
    ) -> Self {
        Self {
            id,
            user_id,
            shard_id,
            shard_count,
            next_seq: AtomicU64::new(next_seq),
            delivery: Mutex::new(()),
            sender,
            close,
            subscriptions: RwLock::new(HashSet::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user_id(&self) -> Snowflake {
        self.user_id
    }

    pub fn shard(&self) -> (u32, u32) {
        (self.shard_id, self.shard_count)
    }

    /// The sequence number the next dispatch will be stamped with
    pub fn next_seq(&self) -> u64 {
        self.next_seq.load(Ordering::SeqCst)
    }

    /// Whether events for this guild route to this session's shard
    pub fn accepts_guild(&self, guild_id: Snowflake) -> bool {
        guild_id.shard_index(self.shard_count) == self.shard_id
    }

    /// Stamp a dispatch with the next sequence number and enqueue it.
    ///
    /// The counter only advances when the frame is actually queued, so a
    /// saturated or closed session never produces sequence gaps: the
    /// failed event is recovered through the resumption buffer after the
    /// connection is torn down.
    pub fn deliver(&self, event_type: &str, data: Value) -> Result<u64, DeliveryError> {
        let _guard = self.delivery.lock();
        let seq = self.next_seq.load(Ordering::SeqCst);
        let frame = GatewayMessage::dispatch(event_type, seq, data);

        match self.sender.try_send(frame) {
            Ok(()) => {
                self.next_seq.store(seq + 1, Ordering::SeqCst);
                Ok(seq)
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(DeliveryError::Saturated),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(DeliveryError::Closed),
        }
    }

    /// Enqueue a non-dispatch frame (HELLO, RECONNECT, ACK, ...)
    pub fn send_frame(&self, frame: GatewayMessage) -> Result<(), DeliveryError> {
        match self.sender.try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(DeliveryError::Saturated),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(DeliveryError::Closed),
        }
    }

    /// Ask the write loop to close the socket. Delivered through the
    /// close signal, so a full outbound queue cannot swallow it.
    pub fn request_close(&self, code: CloseCode) {
        self.close.request(code);
    }

    /// The close code requested for this session's connection, if any
    pub fn close_requested(&self) -> Option<CloseCode> {
        self.close.requested()
    }

    /// Whether the outbound path is gone
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    // === Subscriptions ===

    /// Record a topic subscription on the session itself. The registry
    /// keeps the reverse index; both must be updated together.
    pub fn add_subscription(&self, topic: Topic) -> bool {
        self.subscriptions.write().insert(topic)
    }

    pub fn remove_subscription(&self, topic: Topic) -> bool {
        self.subscriptions.write().remove(&topic)
    }

    pub fn is_subscribed(&self, topic: Topic) -> bool {
        self.subscriptions.read().contains(&topic)
    }

    /// Snapshot of the current subscription set
    pub fn subscriptions(&self) -> HashSet<Topic> {
        self.subscriptions.read().clone()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("shard", &(self.shard_id, self.shard_count))
            .field("next_seq", &self.next_seq())
            .finish_non_exhaustive()
    }
}
