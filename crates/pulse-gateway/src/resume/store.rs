//! Resumption records and the resume store
//!
//! When an authenticated session disconnects resumably, its identity,
//! subscriptions, and sequence counter are parked here for a bounded TTL.
//! The dispatcher keeps stamping events into the parked record's replay
//! buffer, so a client that RESUMEs in time receives exactly the events
//! it missed, in order, with their original sequence numbers.
//!
//! The buffer is bounded and drops oldest first. A resume that needs a
//! dropped event cannot be satisfied and is answered with
//! INVALID_SESSION; this is the documented bounded-data-loss window.

use crate::dispatch::Topic;
use crate::session::Session;
use dashmap::DashMap;
use pulse_core::Snowflake;
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

/// An event stamped and buffered while the session was disconnected
#[derive(Debug, Clone)]
pub struct BufferedEvent {
    pub seq: u64,
    pub event_type: String,
    pub data: Value,
}

/// A disconnected session awaiting resumption
#[derive(Debug)]
pub struct ResumptionRecord {
    session_id: String,
    user_id: Snowflake,
    shard_id: u32,
    shard_count: u32,
    next_seq: u64,
    subscriptions: HashSet<Topic>,
    buffer: VecDeque<BufferedEvent>,
    /// Highest sequence number evicted from the buffer, if any
    dropped_up_to: Option<u64>,
    expires_at: Instant,
}

impl ResumptionRecord {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn user_id(&self) -> Snowflake {
        self.user_id
    }

    pub fn shard(&self) -> (u32, u32) {
        (self.shard_id, self.shard_count)
    }

    /// Sequence number the next buffered event will carry
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub fn subscriptions(&self) -> &HashSet<Topic> {
        &self.subscriptions
    }

    pub fn is_subscribed(&self, topic: Topic) -> bool {
        self.subscriptions.contains(&topic)
    }

    pub fn accepts_guild(&self, guild_id: Snowflake) -> bool {
        guild_id.shard_index(self.shard_count) == self.shard_id
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Stamp an event with the record's sequence counter and buffer it,
    /// evicting the oldest entry when the buffer is full.
    pub fn buffer_event(&mut self, event_type: &str, data: Value, capacity: usize) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;

        self.buffer.push_back(BufferedEvent {
            seq,
            event_type: event_type.to_string(),
            data,
        });

        while self.buffer.len() > capacity {
            if let Some(evicted) = self.buffer.pop_front() {
                self.dropped_up_to = Some(evicted.seq);
            }
        }

        seq
    }

    /// Whether a client that last saw `client_seq` can be fully caught
    /// up from the buffer. Fails when a needed event was evicted.
    pub fn can_replay_from(&self, client_seq: u64) -> bool {
        match self.dropped_up_to {
            Some(dropped) => client_seq >= dropped,
            None => true,
        }
    }

    /// Consume the record, returning buffered events after `client_seq`
    /// in sequence order.
    #[must_use]
    pub fn events_after(self, client_seq: u64) -> Vec<BufferedEvent> {
        self.buffer
            .into_iter()
            .filter(|e| e.seq > client_seq)
            .collect()
    }
}

/// TTL'd store of resumable sessions
pub struct ResumeStore {
    records: DashMap<String, ResumptionRecord>,
    ttl: Duration,
    buffer_capacity: usize,
}

impl ResumeStore {
    #[must_use]
    pub fn new(ttl: Duration, buffer_capacity: usize) -> Self {
        Self {
            records: DashMap::new(),
            ttl,
            buffer_capacity,
        }
    }

    /// Park a disconnecting session for later resumption
    pub fn park(&self, session: &Session) {
        let (shard_id, shard_count) = session.shard();
        let record = ResumptionRecord {
            session_id: session.id().to_string(),
            user_id: session.user_id(),
            shard_id,
            shard_count,
            next_seq: session.next_seq(),
            subscriptions: session.subscriptions(),
            buffer: VecDeque::new(),
            dropped_up_to: None,
            expires_at: Instant::now() + self.ttl,
        };

        tracing::debug!(
            session_id = %session.id(),
            user_id = %session.user_id(),
            next_seq = record.next_seq,
            "Session parked for resumption"
        );

        self.records.insert(session.id().to_string(), record);
    }

    /// Remove and return a record. Expired records are discarded and
    /// reported as absent.
    pub fn take(&self, session_id: &str) -> Option<ResumptionRecord> {
        let (_, record) = self.records.remove(session_id)?;
        if record.is_expired() {
            tracing::debug!(session_id = %session_id, "Resumption record expired");
            return None;
        }
        Some(record)
    }

    /// Drop a record without resuming it (e.g. non-resumable close)
    pub fn invalidate(&self, session_id: &str) {
        self.records.remove(session_id);
    }

    /// Buffer an event into every unexpired record matching the filter.
    /// Returns how many records accepted it.
    pub fn buffer_matching<F>(&self, event_type: &str, data: &Value, mut filter: F) -> usize
    where
        F: FnMut(&ResumptionRecord) -> bool,
    {
        let mut buffered = 0;
        for mut entry in self.records.iter_mut() {
            if entry.is_expired() || !filter(entry.value()) {
                continue;
            }
            entry.buffer_event(event_type, data.clone(), self.buffer_capacity);
            buffered += 1;
        }
        buffered
    }

    /// Add a subscription to every parked record of a user, so
    /// membership granted during a disconnect is visible after resume.
    pub fn subscribe_user(&self, user_id: Snowflake, topic: Topic) {
        for mut entry in self.records.iter_mut() {
            if entry.user_id == user_id {
                entry.subscriptions.insert(topic);
            }
        }
    }

    /// Remove a subscription from every parked record of a user
    pub fn unsubscribe_user(&self, user_id: Snowflake, topic: Topic) {
        for mut entry in self.records.iter_mut() {
            if entry.user_id == user_id {
                entry.subscriptions.remove(&topic);
            }
        }
    }

    /// Drop expired records. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| !record.is_expired());
        let purged = before - self.records.len();
        if purged > 0 {
            tracing::debug!(purged, "Purged expired resumption records");
        }
        purged
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.records.contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl std::fmt::Debug for ResumeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResumeStore")
            .field("records", &self.records.len())
            .field("ttl", &self.ttl)
            .field("buffer_capacity", &self.buffer_capacity)
            .finish()
    }
}
