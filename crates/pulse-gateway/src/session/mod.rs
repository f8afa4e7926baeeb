//! Sessions and the live-session registry

mod registry;
mod session;

pub use registry::SessionRegistry;
pub use session::{CloseSignal, DeliveryError, Session};
