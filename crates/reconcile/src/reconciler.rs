use std::collections::{HashMap, HashSet};

use medley_timeline::{MessageId, StreamMessage};

use crate::follow::ViewportFollow;
use crate::sink::RenderSink;
use crate::transition::{ViewTransition, classify};

struct RenderedEntry<H> {
    last: StreamMessage,
    handle: H,
}

/// Work performed by one reconcile pass, for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub mounted: usize,
    pub patched: usize,
    pub released: usize,
    pub unchanged: usize,
}

/// Maps timeline snapshots onto a rendered view with minimal rebuild work.
///
/// Memory is keyed by message id: the last-rendered message decides, through
/// the kind's transition predicate, whether an update remounts the node or
/// patches it in place. Reconciling the same snapshot twice is free.
pub struct Reconciler<S: RenderSink> {
    sink: S,
    rendered: HashMap<MessageId, RenderedEntry<S::Handle>>,
    order: Vec<MessageId>,
    follow: ViewportFollow,
    empty: bool,
}

impl<S: RenderSink> Reconciler<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            rendered: HashMap::new(),
            order: Vec::new(),
            follow: ViewportFollow::new(),
            empty: true,
        }
    }

    /// Reconciles the (already filtered) ordered message list onto the sink.
    pub fn reconcile(&mut self, messages: &[StreamMessage]) -> ReconcileStats {
        let mut stats = ReconcileStats::default();
        let next_ids: HashSet<MessageId> = messages.iter().map(|message| message.id).collect();
        let previous_order = std::mem::take(&mut self.order);

        // Release view nodes whose messages left the timeline.
        for id in &previous_order {
            if !next_ids.contains(id) {
                if let Some(entry) = self.rendered.remove(id) {
                    self.sink.release(entry.handle);
                    stats.released += 1;
                }
            }
        }

        let mut next_order = Vec::with_capacity(messages.len());
        for message in messages {
            next_order.push(message.id);

            match self.rendered.remove(&message.id) {
                None => {
                    let handle = self.sink.mount(message);
                    stats.mounted += 1;
                    self.rendered.insert(
                        message.id,
                        RenderedEntry {
                            last: message.clone(),
                            handle,
                        },
                    );
                }
                Some(mut entry) => {
                    match classify(&entry.last, message) {
                        ViewTransition::Unchanged => {
                            stats.unchanged += 1;
                        }
                        ViewTransition::Patch => {
                            self.sink.patch(&mut entry.handle, message);
                            stats.patched += 1;
                        }
                        ViewTransition::Remount => {
                            self.sink.release(entry.handle);
                            entry.handle = self.sink.mount(message);
                            stats.released += 1;
                            stats.mounted += 1;
                        }
                    }
                    entry.last = message.clone();
                    self.rendered.insert(message.id, entry);
                }
            }
        }

        self.empty = messages.is_empty();

        if messages.is_empty() {
            if !previous_order.is_empty() {
                // The view was cleared; resume tail-following for whatever comes next.
                self.follow.reset();
            }
        } else {
            // A pure append keeps an end-pinned viewport pinned; anything else
            // preserves the user's position.
            let pure_append =
                next_order.len() > previous_order.len() && next_order.starts_with(&previous_order);
            if pure_append && self.follow.is_following_end() {
                self.follow.request_scroll_to_end_if_following();
            }
        }

        self.order = next_order;

        if stats != ReconcileStats::default() {
            tracing::trace!(
                mounted = stats.mounted,
                patched = stats.patched,
                released = stats.released,
                "reconciled timeline view"
            );
        }

        stats
    }

    /// True when the filtered timeline rendered empty, for the empty-state
    /// indicator.
    pub fn is_empty_state(&self) -> bool {
        self.empty
    }

    pub fn follow(&self) -> &ViewportFollow {
        &self.follow
    }

    pub fn follow_mut(&mut self) -> &mut ViewportFollow {
        &mut self.follow
    }

    pub fn rendered_len(&self) -> usize {
        self.rendered.len()
    }
}

/// Filters user-hidden entries out of a snapshot before reconciliation.
pub fn visible_messages(messages: &[StreamMessage]) -> Vec<StreamMessage> {
    messages
        .iter()
        .filter(|message| !message.hidden)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use medley_timeline::{MessageBody, MessageKind, Role};

    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum SinkEvent {
        Mounted(MessageId),
        Patched(MessageId),
        Released(MessageId),
    }

    #[derive(Default)]
    struct RecordingSink {
        log: Arc<Mutex<Vec<SinkEvent>>>,
    }

    impl RecordingSink {
        fn new() -> (Self, Arc<Mutex<Vec<SinkEvent>>>) {
            let log = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    log: Arc::clone(&log),
                },
                log,
            )
        }
    }

    impl RenderSink for RecordingSink {
        type Handle = MessageId;

        fn mount(&mut self, message: &StreamMessage) -> Self::Handle {
            self.log
                .lock()
                .expect("test lock")
                .push(SinkEvent::Mounted(message.id));
            message.id
        }

        fn patch(&mut self, handle: &mut Self::Handle, _message: &StreamMessage) {
            self.log
                .lock()
                .expect("test lock")
                .push(SinkEvent::Patched(*handle));
        }

        fn release(&mut self, handle: Self::Handle) {
            self.log
                .lock()
                .expect("test lock")
                .push(SinkEvent::Released(handle));
        }
    }

    fn timeline_pair() -> Vec<StreamMessage> {
        vec![
            StreamMessage::user(MessageKind::Generate, "a cat"),
            StreamMessage::ai_pending(MessageKind::Generate, Some("midjourney".to_string())),
        ]
    }

    #[test]
    fn reconciling_an_unchanged_list_twice_does_no_work() {
        let (sink, log) = RecordingSink::new();
        let mut reconciler = Reconciler::new(sink);
        let messages = timeline_pair();

        let first = reconciler.reconcile(&messages);
        assert_eq!(first.mounted, 2);

        log.lock().expect("test lock").clear();
        let second = reconciler.reconcile(&messages);
        assert_eq!(second, ReconcileStats {
            unchanged: 2,
            ..ReconcileStats::default()
        });
        assert!(log.lock().expect("test lock").is_empty());
    }

    #[test]
    fn a_pure_append_mounts_exactly_the_new_message() {
        let (sink, log) = RecordingSink::new();
        let mut reconciler = Reconciler::new(sink);
        let mut messages = timeline_pair();
        reconciler.reconcile(&messages);
        log.lock().expect("test lock").clear();

        let appended = StreamMessage::user(MessageKind::Video, "animate it");
        let appended_id = appended.id;
        messages.push(appended);

        let stats = reconciler.reconcile(&messages);
        assert_eq!(stats.mounted, 1);
        assert_eq!(stats.patched, 0);
        assert_eq!(stats.released, 0);
        assert_eq!(
            *log.lock().expect("test lock"),
            vec![SinkEvent::Mounted(appended_id)]
        );
    }

    #[test]
    fn progress_ticks_patch_without_remounting() {
        let (sink, log) = RecordingSink::new();
        let mut reconciler = Reconciler::new(sink);
        let mut messages = timeline_pair();
        reconciler.reconcile(&messages);
        log.lock().expect("test lock").clear();

        messages[1].apply_progress(42);
        let stats = reconciler.reconcile(&messages);

        assert_eq!(stats.patched, 1);
        assert_eq!(stats.mounted, 0);
        assert_eq!(stats.released, 0);
        assert_eq!(
            *log.lock().expect("test lock"),
            vec![SinkEvent::Patched(messages[1].id)]
        );
    }

    #[test]
    fn a_resolving_result_remounts_the_finished_tile() {
        let (sink, log) = RecordingSink::new();
        let mut reconciler = Reconciler::new(sink);
        let mut messages = timeline_pair();
        reconciler.reconcile(&messages);
        log.lock().expect("test lock").clear();

        messages[1].record_result(MessageBody::Generate {
            grid_image_url: Some("https://x/grid.png".to_string()),
        });
        let stats = reconciler.reconcile(&messages);

        assert_eq!(stats.released, 1);
        assert_eq!(stats.mounted, 1);
        assert_eq!(
            *log.lock().expect("test lock"),
            vec![
                SinkEvent::Released(messages[1].id),
                SinkEvent::Mounted(messages[1].id),
            ]
        );
    }

    #[test]
    fn deleted_messages_release_their_view_nodes() {
        let (sink, log) = RecordingSink::new();
        let mut reconciler = Reconciler::new(sink);
        let messages = timeline_pair();
        let removed_id = messages[0].id;
        reconciler.reconcile(&messages);
        log.lock().expect("test lock").clear();

        let stats = reconciler.reconcile(&messages[1..]);
        assert_eq!(stats.released, 1);
        assert_eq!(reconciler.rendered_len(), 1);
        assert_eq!(
            *log.lock().expect("test lock"),
            vec![SinkEvent::Released(removed_id)]
        );
    }

    #[test]
    fn hidden_messages_are_filtered_before_reconciliation() {
        let (sink, _log) = RecordingSink::new();
        let mut reconciler = Reconciler::new(sink);
        let mut messages = timeline_pair();
        reconciler.reconcile(&visible_messages(&messages));
        assert_eq!(reconciler.rendered_len(), 2);

        messages[0].hidden = true;
        let stats = reconciler.reconcile(&visible_messages(&messages));
        assert_eq!(stats.released, 1);
        assert_eq!(reconciler.rendered_len(), 1);
    }

    #[test]
    fn empty_state_indicator_tracks_the_filtered_list() {
        let (sink, _log) = RecordingSink::new();
        let mut reconciler = Reconciler::new(sink);
        assert!(reconciler.is_empty_state());

        let messages = timeline_pair();
        reconciler.reconcile(&messages);
        assert!(!reconciler.is_empty_state());

        // Scroll away, then clear the timeline: the viewport forgets the old
        // position and resumes tail-following.
        reconciler.follow_mut().update_follow_state(500.0, 500.0);
        reconciler.follow_mut().update_follow_state(100.0, 500.0);
        assert!(!reconciler.follow().is_following_end());

        reconciler.reconcile(&[]);
        assert!(reconciler.is_empty_state());
        assert!(reconciler.follow().is_following_end());
    }

    #[test]
    fn pure_appends_keep_an_end_pinned_viewport_pinned() {
        let (sink, _log) = RecordingSink::new();
        let mut reconciler = Reconciler::new(sink);
        let mut messages = timeline_pair();
        reconciler.reconcile(&messages);
        reconciler.follow_mut().update_follow_state(500.0, 500.0);
        assert!(reconciler.follow().is_following_end());

        messages.push(StreamMessage::user(MessageKind::Generate, "more"));
        reconciler.reconcile(&messages);
        assert_eq!(reconciler.follow_mut().apply_pending_scroll(560.0), Some(560.0));
    }

    #[test]
    fn a_reorder_is_not_a_pure_append_and_preserves_the_position() {
        let (sink, _log) = RecordingSink::new();
        let mut reconciler = Reconciler::new(sink);
        let mut messages = timeline_pair();
        reconciler.reconcile(&messages);

        // Scroll away so follow mode pauses.
        reconciler.follow_mut().update_follow_state(500.0, 500.0);
        reconciler.follow_mut().update_follow_state(100.0, 500.0);
        assert!(!reconciler.follow().is_following_end());

        messages.swap(0, 1);
        reconciler.reconcile(&messages);
        assert_eq!(reconciler.follow_mut().apply_pending_scroll(500.0), None);
    }

    #[test]
    fn role_flip_on_the_same_id_forces_a_remount() {
        let (sink, _log) = RecordingSink::new();
        let mut reconciler = Reconciler::new(sink);
        let mut messages = timeline_pair();
        reconciler.reconcile(&messages);

        messages[1].role = Role::User;
        let stats = reconciler.reconcile(&messages);
        assert_eq!(stats.released, 1);
        assert_eq!(stats.mounted, 1);
    }
}
