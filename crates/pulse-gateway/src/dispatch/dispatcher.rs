//! Event dispatcher
//!
//! Fans an event out to every live session subscribed to a topic, and
//! into the replay buffer of every parked (disconnected but resumable)
//! session that would have received it. Channel topics are
//! permission-filtered at delivery time: recipients are the channel's
//! guild subscribers who can currently view the channel.
//!
//! Delivery never blocks and never retries. A session whose outbound
//! queue is saturated is asked to close resumably; the missed events
//! reach it through the resumption buffer once it reconnects.

use crate::dispatch::Topic;
use crate::events::GatewayEventType;
use crate::protocol::CloseCode;
use crate::resume::{ResumeStore, ResumptionRecord};
use crate::session::{DeliveryError, Session, SessionRegistry};
use crate::store::StorageView;
use parking_lot::{RwLock, RwLockWriteGuard};
use pulse_core::Snowflake;
use serde_json::Value;
use std::sync::Arc;

/// Per-dispatch delivery options
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchOptions {
    /// Skip all sessions (and parked records) of this user. Used for
    /// events the acting user should not echo back to itself.
    pub exclude_user: Option<Snowflake>,
}

/// Outcome of a dispatch call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Frames queued to live sessions
    pub delivered: usize,
    /// Events stamped into resumption buffers
    pub buffered: usize,
    /// Live sessions that could not accept the frame
    pub failed: usize,
}

impl DispatchSummary {
    fn absorb(&mut self, other: Self) {
        self.delivered += other.delivered;
        self.buffered += other.buffered;
        self.failed += other.failed;
    }
}

/// Routes events to live sessions and resumption buffers by topic
pub struct Dispatcher {
    registry: Arc<SessionRegistry>,
    resume_store: Arc<ResumeStore>,
    storage: Arc<StorageView>,
    /// Held for write while a session moves between the live registry and
    /// the resume store, and for read by every dispatch. Keeps a dispatch
    /// from observing the gap where a session is in neither sink.
    transitions: RwLock<()>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        registry: Arc<SessionRegistry>,
        resume_store: Arc<ResumeStore>,
        storage: Arc<StorageView>,
    ) -> Self {
        Self {
            registry,
            resume_store,
            storage,
            transitions: RwLock::new(()),
        }
    }

    /// Lock out dispatches while a session moves between the live
    /// registry and the resume store. Teardown holds this across
    /// park-and-unregister, resume across take-and-register, so every
    /// event lands in exactly one of the two sinks.
    #[must_use]
    pub fn transition(&self) -> RwLockWriteGuard<'_, ()> {
        self.transitions.write()
    }

    /// Dispatch an event to a topic with default options
    pub fn dispatch(&self, topic: Topic, event: GatewayEventType, data: Value) -> DispatchSummary {
        self.dispatch_with(topic, event, data, DispatchOptions::default())
    }

    /// Dispatch an event to a topic.
    ///
    /// Ordering: dispatches issued sequentially from one caller reach
    /// each subscriber in issue order. Dispatches issued concurrently
    /// from separate tasks have no defined order relative to each other;
    /// a caller that needs one must serialize its dispatch calls.
    pub fn dispatch_with(
        &self,
        topic: Topic,
        event: GatewayEventType,
        data: Value,
        options: DispatchOptions,
    ) -> DispatchSummary {
        let _transition = self.transitions.read();
        let mut summary = DispatchSummary::default();
        let event_type = event.as_str();

        // Channel topics resolve to guild subscribers filtered by
        // per-recipient channel visibility.
        let (index_topic, channel_filter) = match topic {
            Topic::Channel(channel_id) => {
                let Some(channel) = self.storage.channel(channel_id) else {
                    // Dispatching to a channel storage does not know is an
                    // internal defect; drop the event rather than guess.
                    tracing::warn!(%topic, event_type, "Dispatch to unknown channel dropped");
                    return summary;
                };
                (Topic::Guild(channel.guild_id), Some(channel_id))
            }
            other => (other, None),
        };

        let guild_scope = index_topic.guild_scope();

        for session in self.registry.sessions_for(index_topic) {
            if !self.session_eligible(&session, guild_scope, channel_filter, options) {
                continue;
            }

            match session.deliver(event_type, data.clone()) {
                Ok(_) => summary.delivered += 1,
                Err(err) => {
                    summary.failed += 1;
                    self.handle_delivery_failure(&session, event_type, err);
                }
            }
        }

        summary.buffered = self.resume_store.buffer_matching(event_type, &data, |record| {
            Self::record_eligible(record, index_topic, guild_scope, channel_filter, options)
                && channel_filter
                    .map_or(true, |cid| self.storage.can_view_channel(cid, record.user_id()))
        });

        tracing::trace!(
            %topic,
            event_type,
            delivered = summary.delivered,
            buffered = summary.buffered,
            failed = summary.failed,
            "Event dispatched"
        );

        summary
    }

    /// Dispatch one event to several topics, building each payload from
    /// the topic it targets. Used for presence fan-out where the guild
    /// payloads carry the guild id.
    pub fn dispatch_many<F>(
        &self,
        topics: &[Topic],
        event: GatewayEventType,
        options: DispatchOptions,
        payload_fn: F,
    ) -> DispatchSummary
    where
        F: Fn(Topic) -> Value,
    {
        let mut summary = DispatchSummary::default();
        for &topic in topics {
            summary.absorb(self.dispatch_with(topic, event, payload_fn(topic), options));
        }
        summary
    }

    fn session_eligible(
        &self,
        session: &Arc<Session>,
        guild_scope: Option<Snowflake>,
        channel_filter: Option<Snowflake>,
        options: DispatchOptions,
    ) -> bool {
        if options.exclude_user == Some(session.user_id()) {
            return false;
        }
        if let Some(guild_id) = guild_scope {
            if !session.accepts_guild(guild_id) {
                return false;
            }
        }
        if let Some(channel_id) = channel_filter {
            if !self.storage.can_view_channel(channel_id, session.user_id()) {
                return false;
            }
        }
        true
    }

    fn record_eligible(
        record: &ResumptionRecord,
        index_topic: Topic,
        guild_scope: Option<Snowflake>,
        _channel_filter: Option<Snowflake>,
        options: DispatchOptions,
    ) -> bool {
        if options.exclude_user == Some(record.user_id()) {
            return false;
        }
        if !record.is_subscribed(index_topic) {
            return false;
        }
        if let Some(guild_id) = guild_scope {
            if !record.accepts_guild(guild_id) {
                return false;
            }
        }
        true
    }

    fn handle_delivery_failure(&self, session: &Arc<Session>, event_type: &str, err: DeliveryError) {
        match err {
            DeliveryError::Saturated => {
                // Too slow to keep up. Close resumably; the sequence
                // counter did not advance, so the resumption buffer picks
                // up from exactly the first undelivered event.
                tracing::warn!(
                    session_id = %session.id(),
                    event_type,
                    "Outbound queue saturated, closing session"
                );
                session.request_close(CloseCode::UnknownError);
            }
            DeliveryError::Closed => {
                tracing::trace!(
                    session_id = %session.id(),
                    event_type,
                    "Skipped delivery to closing session"
                );
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("resume_store", &self.resume_store)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{GatewayMessage, OpCode};
    use crate::session::CloseSignal;
    use pulse_core::{
        ChannelRecord, GuildRecord, MemberRecord, OverwriteRecord, OverwriteTarget, Permissions,
        RoleRecord,
    };
    use std::time::Duration;
    use tokio::sync::mpsc;

    const GUILD: Snowflake = Snowflake::new(100);
    const CHANNEL: Snowflake = Snowflake::new(200);

    struct Fixture {
        registry: Arc<SessionRegistry>,
        resume_store: Arc<ResumeStore>,
        storage: Arc<StorageView>,
        dispatcher: Dispatcher,
    }

    fn fixture() -> Fixture {
        let registry = SessionRegistry::new_shared();
        let resume_store = Arc::new(ResumeStore::new(Duration::from_secs(60), 16));
        let storage = StorageView::new_shared();

        storage.upsert_guild(GuildRecord {
            id: GUILD,
            name: "g".to_string(),
            owner_id: Snowflake::new(999),
            roles: vec![RoleRecord {
                id: GUILD,
                name: "@everyone".to_string(),
                permissions: Permissions::DEFAULT,
                position: 0,
            }],
        });
        storage.upsert_channel(ChannelRecord {
            id: CHANNEL,
            guild_id: GUILD,
            name: "general".to_string(),
            position: 0,
            overwrites: vec![],
        });

        let dispatcher = Dispatcher::new(registry.clone(), resume_store.clone(), storage.clone());
        Fixture {
            registry,
            resume_store,
            storage,
            dispatcher,
        }
    }

    fn add_session(
        fx: &Fixture,
        user_id: i64,
        queue: usize,
    ) -> (Arc<Session>, mpsc::Receiver<GatewayMessage>) {
        let (tx, rx) = mpsc::channel(queue);
        let session = Arc::new(Session::new(
            Session::generate_id(),
            Snowflake::new(user_id),
            0,
            1,
            tx,
            CloseSignal::new(),
        ));
        fx.registry.register(session.clone());
        (session, rx)
    }

    fn add_member(fx: &Fixture, user_id: i64) {
        fx.storage.upsert_member(
            GUILD,
            MemberRecord {
                user_id: Snowflake::new(user_id),
                nickname: None,
                role_ids: vec![],
            },
        );
    }

    fn next_frame(rx: &mut mpsc::Receiver<GatewayMessage>) -> GatewayMessage {
        rx.try_recv().expect("expected a queued frame")
    }

    #[tokio::test]
    async fn test_guild_dispatch_reaches_subscribers_only() {
        let fx = fixture();
        let (s1, mut rx1) = add_session(&fx, 1, 8);
        let (_s2, mut rx2) = add_session(&fx, 2, 8);

        fx.registry.subscribe(&s1, Topic::Guild(GUILD));

        let summary = fx.dispatcher.dispatch(
            Topic::Guild(GUILD),
            GatewayEventType::MessageCreate,
            serde_json::json!({"id": "1"}),
        );

        assert_eq!(summary.delivered, 1);
        let frame = next_frame(&mut rx1);
        assert_eq!(frame.t.as_deref(), Some("MESSAGE_CREATE"));
        assert_eq!(frame.s, Some(0));
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_channel_dispatch_filters_by_visibility() {
        let fx = fixture();
        let (s1, mut rx1) = add_session(&fx, 1, 8);
        let (s2, mut rx2) = add_session(&fx, 2, 8);
        add_member(&fx, 1);
        add_member(&fx, 2);
        fx.registry.subscribe(&s1, Topic::Guild(GUILD));
        fx.registry.subscribe(&s2, Topic::Guild(GUILD));

        // deny VIEW_CHANNEL to user 2 only
        fx.storage.upsert_channel(ChannelRecord {
            id: CHANNEL,
            guild_id: GUILD,
            name: "general".to_string(),
            position: 0,
            overwrites: vec![OverwriteRecord {
                target: OverwriteTarget::User(Snowflake::new(2)),
                allow: Permissions::empty(),
                deny: Permissions::VIEW_CHANNEL,
            }],
        });

        let summary = fx.dispatcher.dispatch(
            Topic::Channel(CHANNEL),
            GatewayEventType::MessageCreate,
            serde_json::json!({"id": "1"}),
        );

        assert_eq!(summary.delivered, 1);
        assert_eq!(next_frame(&mut rx1).t.as_deref(), Some("MESSAGE_CREATE"));
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_channel_drops_event() {
        let fx = fixture();
        let summary = fx.dispatcher.dispatch(
            Topic::Channel(Snowflake::new(12345)),
            GatewayEventType::MessageCreate,
            serde_json::json!({}),
        );
        assert_eq!(summary, DispatchSummary::default());
    }

    #[tokio::test]
    async fn test_exclude_user_skips_their_sessions() {
        let fx = fixture();
        let (s1, mut rx1) = add_session(&fx, 1, 8);
        let (s2, mut rx2) = add_session(&fx, 2, 8);
        fx.registry.subscribe(&s1, Topic::Guild(GUILD));
        fx.registry.subscribe(&s2, Topic::Guild(GUILD));

        let summary = fx.dispatcher.dispatch_with(
            Topic::Guild(GUILD),
            GatewayEventType::TypingStart,
            serde_json::json!({}),
            DispatchOptions {
                exclude_user: Some(Snowflake::new(1)),
            },
        );

        assert_eq!(summary.delivered, 1);
        assert!(rx1.try_recv().is_err());
        assert_eq!(next_frame(&mut rx2).t.as_deref(), Some("TYPING_START"));
    }

    #[tokio::test]
    async fn test_shard_routing_filters_guild_events() {
        let fx = fixture();
        // guild 100 routes to shard 0 of 2
        let (tx, mut rx) = mpsc::channel(8);
        let wrong_shard = Arc::new(Session::new(
            "other-shard".to_string(),
            Snowflake::new(1),
            1,
            2,
            tx,
            CloseSignal::new(),
        ));
        fx.registry.register(wrong_shard.clone());
        fx.registry.subscribe(&wrong_shard, Topic::Guild(GUILD));

        let summary = fx.dispatcher.dispatch(
            Topic::Guild(GUILD),
            GatewayEventType::MessageCreate,
            serde_json::json!({}),
        );

        assert_eq!(summary.delivered, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_parked_record_buffers_events() {
        let fx = fixture();
        let (s1, rx1) = add_session(&fx, 1, 8);
        fx.registry.subscribe(&s1, Topic::Guild(GUILD));

        // one delivered event, then park and drop the live session
        s1.deliver("READY", serde_json::json!({})).unwrap();
        fx.resume_store.park(&s1);
        fx.registry.unregister(s1.id());
        drop(rx1);

        let summary = fx.dispatcher.dispatch(
            Topic::Guild(GUILD),
            GatewayEventType::MessageCreate,
            serde_json::json!({"id": "7"}),
        );

        assert_eq!(summary.delivered, 0);
        assert_eq!(summary.buffered, 1);

        // a client that saw seq 0 replays exactly the buffered event
        let record = fx.resume_store.take(s1.id()).unwrap();
        let events = record.events_after(0);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].seq, 1);
        assert_eq!(events[0].event_type, "MESSAGE_CREATE");
    }

    #[tokio::test]
    async fn test_event_during_park_window_lands_in_buffer() {
        let fx = fixture();
        let (s1, rx1) = add_session(&fx, 1, 8);
        fx.registry.subscribe(&s1, Topic::Guild(GUILD));
        s1.deliver("READY", serde_json::json!({})).unwrap();
        drop(rx1);

        // parked but not yet unregistered, as during teardown; the event
        // must reach the buffer even though the live queue is gone
        fx.resume_store.park(&s1);
        let summary = fx.dispatcher.dispatch(
            Topic::Guild(GUILD),
            GatewayEventType::MessageCreate,
            serde_json::json!({"id": "8"}),
        );
        fx.registry.unregister(s1.id());

        assert_eq!(summary.delivered, 0);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.buffered, 1);

        let record = fx.resume_store.take(s1.id()).unwrap();
        let events = record.events_after(0);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].seq, 1);
    }

    #[tokio::test]
    async fn test_saturated_session_is_asked_to_close() {
        let fx = fixture();
        let (s1, mut rx1) = add_session(&fx, 1, 1);
        fx.registry.subscribe(&s1, Topic::Guild(GUILD));

        // fill the queue, then dispatch
        s1.send_frame(GatewayMessage::heartbeat_ack()).unwrap();
        let summary = fx.dispatcher.dispatch(
            Topic::Guild(GUILD),
            GatewayEventType::MessageCreate,
            serde_json::json!({}),
        );

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.delivered, 0);

        // the close request rides the out-of-band signal, so the full
        // queue cannot swallow it; the sequence counter must not have
        // advanced past the undelivered event
        assert_eq!(s1.close_requested(), Some(CloseCode::UnknownError));
        assert_eq!(s1.next_seq(), 0);
        assert_eq!(next_frame(&mut rx1).op, OpCode::HeartbeatAck);
        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dispatch_many_builds_payload_per_topic() {
        let fx = fixture();
        let (s1, mut rx1) = add_session(&fx, 1, 8);
        fx.registry.subscribe(&s1, Topic::Guild(GUILD));
        // own user topic is subscribed at registration

        let topics = vec![Topic::Guild(GUILD), Topic::User(Snowflake::new(1))];
        let summary = fx.dispatcher.dispatch_many(
            &topics,
            GatewayEventType::PresenceUpdate,
            DispatchOptions::default(),
            |topic| serde_json::json!({ "scope": topic.kind() }),
        );

        assert_eq!(summary.delivered, 2);
        let first = next_frame(&mut rx1);
        let second = next_frame(&mut rx1);
        assert_eq!(first.s, Some(0));
        assert_eq!(second.s, Some(1));
        assert_ne!(first.d, second.d);
    }
}
