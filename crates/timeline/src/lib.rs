pub mod error;
pub mod ids;
/// Domain entities and deterministic lifecycle boundaries for timeline entries.
pub mod message;
pub mod store;

pub use error::{TimelineError, TimelineResult};
pub use ids::{AssetId, MessageId, ReferenceId};
pub use message::{MessageBody, MessageKind, MessageState, Role, StreamMessage};
pub use store::{
    DEFAULT_TIMELINE_CAPACITY, SnapshotListener, Subscription, TimelineStore,
};
