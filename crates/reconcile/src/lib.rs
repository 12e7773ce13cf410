/// Viewport follow behavior, independent from message content.
pub mod follow;
pub mod reconciler;
pub mod sink;
/// Kind-specific view transition predicates.
pub mod transition;

pub use follow::ViewportFollow;
pub use reconciler::{ReconcileStats, Reconciler, visible_messages};
pub use sink::RenderSink;
pub use transition::{ViewTransition, classify};
