pub mod content;
pub mod event;

pub use content::{ContentId, ContentItem, ContentKind, ContentStatus};
pub use event::{iso_timestamp, DataType, SnapshotEntry, SseEvent};
#[cfg(test)]
pub(crate) use event::render_event;
