//! In-memory view of guilds, channels, members, and relationships

mod view;

pub use view::StorageView;
