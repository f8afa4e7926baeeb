//! Session registry
//!
//! Tracks all live authenticated sessions with secondary indexes by user
//! and by topic, using `DashMap` for concurrent access. Registration,
//! subscription, and lookup all go through this type; nothing else holds
//! the indexes.

use super::Session;
use crate::dispatch::Topic;
use crate::protocol::GatewayMessage;
use dashmap::DashMap;
use pulse_core::Snowflake;
use std::collections::HashSet;
use std::sync::Arc;

/// Registry of live sessions
pub struct SessionRegistry {
    /// Sessions by session ID
    sessions: DashMap<String, Arc<Session>>,

    /// User ID to session IDs mapping
    user_index: DashMap<Snowflake, HashSet<String>>,

    /// Topic to session IDs mapping
    topic_index: DashMap<Topic, HashSet<String>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            user_index: DashMap::new(),
            topic_index: DashMap::new(),
        }
    }

    #[must_use]
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a session and index it by user.
    ///
    /// The session is always subscribed to its own user topic.
    pub fn register(&self, session: Arc<Session>) {
        let session_id = session.id().to_string();
        let user_id = session.user_id();

        self.sessions.insert(session_id.clone(), session.clone());
        self.user_index
            .entry(user_id)
            .or_default()
            .insert(session_id.clone());

        self.subscribe(&session, Topic::User(user_id));

        tracing::debug!(session_id = %session_id, user_id = %user_id, "Session registered");
    }

    /// Remove a session and drop it from every index.
    ///
    /// The topic index is cleared before the session entry so a dispatch
    /// racing with removal either sees the full subscription or none.
    pub fn unregister(&self, session_id: &str) -> Option<Arc<Session>> {
        let session = self.sessions.get(session_id).map(|r| r.clone())?;

        for topic in session.subscriptions() {
            self.topic_index.alter(&topic, |_, mut ids| {
                ids.remove(session_id);
                ids
            });
            self.topic_index.remove_if(&topic, |_, ids| ids.is_empty());
        }

        self.sessions.remove(session_id);

        self.user_index.alter(&session.user_id(), |_, mut ids| {
            ids.remove(session_id);
            ids
        });
        self.user_index
            .remove_if(&session.user_id(), |_, ids| ids.is_empty());

        tracing::debug!(session_id = %session_id, "Session unregistered");

        Some(session)
    }

    // === Subscriptions ===

    /// Subscribe a session to a topic (session set and reverse index)
    pub fn subscribe(&self, session: &Arc<Session>, topic: Topic) {
        session.add_subscription(topic);
        self.topic_index
            .entry(topic)
            .or_default()
            .insert(session.id().to_string());

        tracing::trace!(session_id = %session.id(), %topic, "Subscribed");
    }

    /// Unsubscribe a session from a topic.
    ///
    /// The reverse index is cleared first, so once this returns no new
    /// dispatch for the topic will pick the session up.
    pub fn unsubscribe(&self, session: &Arc<Session>, topic: Topic) {
        self.topic_index.alter(&topic, |_, mut ids| {
            ids.remove(session.id());
            ids
        });
        self.topic_index.remove_if(&topic, |_, ids| ids.is_empty());
        session.remove_subscription(topic);

        tracing::trace!(session_id = %session.id(), %topic, "Unsubscribed");
    }

    /// Subscribe every live session of a user to a topic. Used when
    /// membership or relationships change while sessions are connected.
    pub fn subscribe_user(&self, user_id: Snowflake, topic: Topic) {
        for session in self.sessions_for_user(user_id) {
            self.subscribe(&session, topic);
        }
    }

    /// Unsubscribe every live session of a user from a topic
    pub fn unsubscribe_user(&self, user_id: Snowflake, topic: Topic) {
        for session in self.sessions_for_user(user_id) {
            self.unsubscribe(&session, topic);
        }
    }

    // === Lookup ===

    pub fn session(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.get(session_id).map(|r| r.clone())
    }

    pub fn has_session(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// All live sessions subscribed to a topic
    pub fn sessions_for(&self, topic: Topic) -> Vec<Arc<Session>> {
        self.topic_index
            .get(&topic)
            .map(|ids| {
                ids.iter()
                    .filter_map(|sid| self.sessions.get(sid).map(|s| s.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All live sessions of a user
    pub fn sessions_for_user(&self, user_id: Snowflake) -> Vec<Arc<Session>> {
        self.user_index
            .get(&user_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|sid| self.sessions.get(sid).map(|s| s.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Send a non-dispatch frame to every live session. Used for
    /// RECONNECT during graceful shutdown.
    pub fn broadcast_frame(&self, frame: &GatewayMessage) -> usize {
        let mut sent = 0;
        for entry in &self.sessions {
            if entry.send_frame(frame.clone()).is_ok() {
                sent += 1;
            }
        }
        sent
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn user_count(&self) -> usize {
        self.user_index.len()
    }

    pub fn topic_count(&self) -> usize {
        self.topic_index.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.sessions.len())
            .field("users", &self.user_index.len())
            .field("topics", &self.topic_index.len())
            .finish()
    }
}
