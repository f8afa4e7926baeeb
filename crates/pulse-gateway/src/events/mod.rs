//! Dispatch event names and the payloads the gateway itself constructs

mod event_types;
mod payloads;

pub use event_types::GatewayEventType;
pub use payloads::{
    GuildPayload, MemberListUpdateEvent, PresenceEvent, RateLimitedEvent, ReadyEvent, ResumedEvent,
};
