//! Topic-keyed event dispatch

mod dispatcher;
mod topic;

pub use dispatcher::{DispatchOptions, DispatchSummary, Dispatcher};
pub use topic::Topic;
