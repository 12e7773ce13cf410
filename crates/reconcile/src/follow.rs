/// Near-end distance used to resume follow mode deterministically.
const FOLLOW_RESUME_THRESHOLD: f32 = 24.0;
/// Small delta used to ignore floating-point scroll jitter.
const SCROLL_DELTA_EPSILON: f32 = 1.0;

/// Tracks whether the viewport should stay pinned to the timeline tail,
/// independent of message content.
///
/// Offsets are abstract distances from the top of the content; `max_offset` is
/// the offset of the fully-scrolled-to-end position. The render sink reports
/// observed offsets and asks for a scroll target per frame.
pub struct ViewportFollow {
    pending_scroll_to_end: bool,
    follow_end: bool,
    last_offset: f32,
    last_max_offset: f32,
}

impl ViewportFollow {
    pub fn new() -> Self {
        Self {
            pending_scroll_to_end: false,
            follow_end: true,
            last_offset: 0.0,
            last_max_offset: 0.0,
        }
    }

    pub fn is_following_end(&self) -> bool {
        self.follow_end
    }

    pub fn request_scroll_to_end_if_following(&mut self) {
        if self.follow_end || self.was_near_end() {
            self.pending_scroll_to_end = true;
        }
    }

    /// Forgets tracked offsets and resumes tail-following, for when the
    /// rendered content is replaced wholesale (e.g. the timeline was cleared).
    pub fn reset(&mut self) {
        self.last_offset = 0.0;
        self.last_max_offset = 0.0;
        self.follow_end = true;
        self.pending_scroll_to_end = true;
    }

    /// Folds one observed viewport position into the follow state.
    pub fn update_follow_state(&mut self, offset: f32, max_offset: f32) {
        let offset_delta = offset - self.last_offset;
        let max_delta = (max_offset - self.last_max_offset).abs();
        let content_size_changed = max_delta > SCROLL_DELTA_EPSILON;
        let user_scrolled_away = offset_delta < -SCROLL_DELTA_EPSILON && !content_size_changed;
        let user_scrolled_toward_end = offset_delta > SCROLL_DELTA_EPSILON && !content_size_changed;

        // Keep follow mode enabled while we are fulfilling an explicit follow request.
        if self.pending_scroll_to_end || (content_size_changed && self.was_near_end()) {
            self.follow_end = true;
        } else if self.follow_end {
            // Pause follow mode only when the user manually scrolls away from the tail.
            if user_scrolled_away {
                self.follow_end = false;
            }
        } else if user_scrolled_toward_end && is_near_end(offset, max_offset) {
            // Resume follow mode once the user intentionally returns to the tail boundary.
            self.follow_end = true;
        }

        self.last_offset = offset;
        self.last_max_offset = max_offset;
    }

    /// Returns the offset to scroll to this frame, if the viewport should move.
    pub fn apply_pending_scroll(&mut self, max_offset: f32) -> Option<f32> {
        let should_scroll = self.follow_end || self.pending_scroll_to_end;
        self.pending_scroll_to_end = false;

        if should_scroll {
            Some(max_offset.max(0.0))
        } else {
            None
        }
    }

    fn was_near_end(&self) -> bool {
        is_near_end(self.last_offset, self.last_max_offset)
    }
}

impl Default for ViewportFollow {
    fn default() -> Self {
        Self::new()
    }
}

fn is_near_end(offset: f32, max_offset: f32) -> bool {
    if max_offset <= 0.0 {
        return true;
    }
    (max_offset - offset).abs() <= FOLLOW_RESUME_THRESHOLD
}
