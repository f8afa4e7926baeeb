//! # pulse-gateway
//!
//! WebSocket gateway: connection lifecycle, session registry, topic
//! dispatch, and resumption.

pub mod dispatch;
pub mod events;
pub mod handlers;
pub mod protocol;
pub mod ratelimit;
pub mod resume;
pub mod server;
pub mod session;
pub mod store;

pub use server::{create_app, create_router, run, GatewayState};
