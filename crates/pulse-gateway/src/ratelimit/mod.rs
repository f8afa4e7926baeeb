//! Per-connection rate limiting

mod limiter;

pub use limiter::{ActionClass, Decision, RateLimiter};
