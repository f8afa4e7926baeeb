//! Session resumption

mod store;

pub use store::{BufferedEvent, ResumeStore, ResumptionRecord};
