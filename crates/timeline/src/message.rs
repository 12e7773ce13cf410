use crate::ids::{AssetId, MessageId, ReferenceId};

/// Timeline speaker role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Ai,
}

/// Closed set of job kinds driven through the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Generate,
    Upscale,
    Pedit,
    Video,
    Deconstruct,
    Suno,
    Youtube,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generate => "generate",
            Self::Upscale => "upscale",
            Self::Pedit => "pedit",
            Self::Video => "video",
            Self::Deconstruct => "deconstruct",
            Self::Suno => "suno",
            Self::Youtube => "youtube",
        }
    }
}

/// Kind-specific result payload.
///
/// Each variant's exclusive fields are only reachable after a kind check, so
/// render and completion logic cannot read another kind's result by accident.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Generate {
        grid_image_url: Option<String>,
    },
    Upscale {
        grid_index: u8,
        upscaled_image_url: Option<String>,
    },
    Pedit {
        image_urls: Vec<String>,
    },
    Video {
        video_url: Option<String>,
    },
    Deconstruct {
        description: Option<String>,
    },
    Suno {
        audio_url: Option<String>,
        lyrics: Option<String>,
    },
    Youtube {
        video_url: Option<String>,
        video_ref: Option<AssetId>,
        audio_ref: Option<AssetId>,
        subtitle_ref: Option<AssetId>,
    },
}

impl MessageBody {
    /// Creates the unresolved body for a kind, as carried by pending messages.
    pub fn empty(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Generate => Self::Generate {
                grid_image_url: None,
            },
            MessageKind::Upscale => Self::Upscale {
                grid_index: 0,
                upscaled_image_url: None,
            },
            MessageKind::Pedit => Self::Pedit {
                image_urls: Vec::new(),
            },
            MessageKind::Video => Self::Video { video_url: None },
            MessageKind::Deconstruct => Self::Deconstruct { description: None },
            MessageKind::Suno => Self::Suno {
                audio_url: None,
                lyrics: None,
            },
            MessageKind::Youtube => Self::Youtube {
                video_url: None,
                video_ref: None,
                audio_ref: None,
                subtitle_ref: None,
            },
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Generate { .. } => MessageKind::Generate,
            Self::Upscale { .. } => MessageKind::Upscale,
            Self::Pedit { .. } => MessageKind::Pedit,
            Self::Video { .. } => MessageKind::Video,
            Self::Deconstruct { .. } => MessageKind::Deconstruct,
            Self::Suno { .. } => MessageKind::Suno,
            Self::Youtube { .. } => MessageKind::Youtube,
        }
    }

    /// Returns true once the kind's primary result field is present.
    pub fn is_resolved(&self) -> bool {
        match self {
            Self::Generate { grid_image_url } => grid_image_url.is_some(),
            Self::Upscale {
                upscaled_image_url, ..
            } => upscaled_image_url.is_some(),
            Self::Pedit { image_urls } => !image_urls.is_empty(),
            Self::Video { video_url } => video_url.is_some(),
            Self::Deconstruct { description } => description.is_some(),
            Self::Suno { audio_url, .. } => audio_url.is_some(),
            Self::Youtube { video_url, .. } => video_url.is_some(),
        }
    }

    /// Resolved media URLs, in display order.
    pub fn media_urls(&self) -> Vec<&str> {
        match self {
            Self::Generate { grid_image_url } => option_url(grid_image_url),
            Self::Upscale {
                upscaled_image_url, ..
            } => option_url(upscaled_image_url),
            Self::Pedit { image_urls } => image_urls.iter().map(String::as_str).collect(),
            Self::Video { video_url } => option_url(video_url),
            Self::Deconstruct { .. } => Vec::new(),
            Self::Suno { audio_url, .. } => option_url(audio_url),
            Self::Youtube { video_url, .. } => option_url(video_url),
        }
    }
}

fn option_url(url: &Option<String>) -> Vec<&str> {
    url.as_deref().into_iter().collect()
}

/// Logical lifecycle state derived from the message fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageState {
    Pending,
    Completed,
    Errored,
}

/// One entry in the append-only timeline log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMessage {
    pub id: MessageId,
    pub created_at_unix_millis: u64,
    pub role: Role,
    pub provider: Option<String>,
    pub text: String,
    pub progress: u8,
    pub error: Option<String>,
    pub task_id: Option<String>,
    pub parent_message_id: Option<MessageId>,
    pub ref_ids: Vec<ReferenceId>,
    pub hidden: bool,
    pub body: MessageBody,
}

impl StreamMessage {
    /// Creates a user message for one action. The store stamps `created_at`.
    pub fn user(kind: MessageKind, text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new_v7(),
            created_at_unix_millis: 0,
            role: Role::User,
            provider: None,
            text: text.into(),
            progress: 0,
            error: None,
            task_id: None,
            parent_message_id: None,
            ref_ids: Vec::new(),
            hidden: false,
            body: MessageBody::empty(kind),
        }
    }

    /// Creates the pending ai counterpart that a poller will drive to a terminal state.
    pub fn ai_pending(kind: MessageKind, provider: Option<String>) -> Self {
        Self {
            id: MessageId::new_v7(),
            created_at_unix_millis: 0,
            role: Role::Ai,
            provider,
            text: String::new(),
            progress: 0,
            error: None,
            task_id: None,
            parent_message_id: None,
            ref_ids: Vec::new(),
            hidden: false,
            body: MessageBody::empty(kind),
        }
    }

    pub fn with_parent(mut self, parent: MessageId) -> Self {
        self.parent_message_id = Some(parent);
        self
    }

    pub fn with_refs(mut self, ref_ids: Vec<ReferenceId>) -> Self {
        self.ref_ids = ref_ids;
        self
    }

    pub fn with_body(mut self, body: MessageBody) -> Self {
        self.body = body;
        self
    }

    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    pub fn state(&self) -> MessageState {
        if self.error.is_some() {
            MessageState::Errored
        } else if self.body.is_resolved() {
            MessageState::Completed
        } else {
            MessageState::Pending
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state() != MessageState::Pending
    }

    /// Applies a poll progress value: clamped to [0, 100], non-decreasing,
    /// and frozen once the message is terminal.
    pub fn apply_progress(&mut self, raw: i64) {
        if self.is_terminal() {
            return;
        }

        let clamped = raw.clamp(0, 100) as u8;
        if clamped > self.progress {
            self.progress = clamped;
        }
    }

    /// Records the provider task id. The first write wins; a task id never changes
    /// once assigned because pollers are keyed by it.
    pub fn assign_task_id(&mut self, task_id: impl Into<String>) {
        let task_id = task_id.into();
        if let Some(existing) = &self.task_id {
            if *existing != task_id {
                tracing::warn!(
                    message_id = %self.id,
                    existing = %existing,
                    rejected = %task_id,
                    "ignoring attempt to reassign an immutable task id"
                );
            }
            return;
        }

        self.task_id = Some(task_id);
    }

    /// Marks the message failed. No-op once terminal, so a late poll response
    /// can never overwrite a finished result.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        if self.is_terminal() {
            return;
        }

        self.error = Some(error.into());
    }

    /// Writes the terminal result for a pending message and pins progress to 100.
    ///
    /// Returns false without touching the message when the body kind does not
    /// match or the message already reached a terminal state.
    pub fn record_result(&mut self, body: MessageBody) -> bool {
        if self.is_terminal() || body.kind() != self.kind() || !body.is_resolved() {
            return false;
        }

        self.body = body;
        self.progress = 100;
        true
    }

    /// Writes a result recovered by an operator "re-fetch" on an errored message.
    ///
    /// This is the one sanctioned exit from the errored state: no new job was
    /// started, the original poll result simply arrived on a second ask.
    pub fn record_refetch_result(&mut self, body: MessageBody) -> bool {
        if body.kind() != self.kind() || !body.is_resolved() || self.body.is_resolved() {
            return false;
        }

        self.error = None;
        self.body = body;
        self.progress = 100;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_generate() -> StreamMessage {
        StreamMessage::ai_pending(MessageKind::Generate, Some("midjourney".to_string()))
    }

    #[test]
    fn progress_is_clamped_and_non_decreasing() {
        let mut message = pending_generate();

        message.apply_progress(140);
        assert_eq!(message.progress, 100);

        let mut message = pending_generate();
        message.apply_progress(40);
        message.apply_progress(25);
        assert_eq!(message.progress, 40);

        message.apply_progress(-5);
        assert_eq!(message.progress, 40);
    }

    #[test]
    fn progress_freezes_once_error_is_set() {
        let mut message = pending_generate();
        message.apply_progress(40);
        message.record_failure("content policy violation");

        message.apply_progress(90);
        assert_eq!(message.progress, 40);
        assert_eq!(message.state(), MessageState::Errored);
    }

    #[test]
    fn task_id_is_immutable_once_assigned() {
        let mut message = pending_generate();
        message.assign_task_id("T1");
        message.assign_task_id("T2");
        assert_eq!(message.task_id.as_deref(), Some("T1"));
    }

    #[test]
    fn terminal_result_rejects_further_writes() {
        let mut message = pending_generate();
        assert!(message.record_result(MessageBody::Generate {
            grid_image_url: Some("https://x/grid.png".to_string()),
        }));
        assert_eq!(message.progress, 100);
        assert_eq!(message.state(), MessageState::Completed);

        assert!(!message.record_result(MessageBody::Generate {
            grid_image_url: Some("https://x/other.png".to_string()),
        }));
        message.record_failure("late failure");
        assert_eq!(message.error, None);
    }

    #[test]
    fn kind_mismatch_never_writes_a_result() {
        let mut message = pending_generate();
        assert!(!message.record_result(MessageBody::Video {
            video_url: Some("https://x/clip.mp4".to_string()),
        }));
        assert_eq!(message.state(), MessageState::Pending);
    }

    #[test]
    fn refetch_recovers_an_errored_message() {
        let mut message = pending_generate();
        message.assign_task_id("T1");
        message.record_failure("gateway timed out");

        assert!(message.record_refetch_result(MessageBody::Generate {
            grid_image_url: Some("https://x/grid.png".to_string()),
        }));
        assert_eq!(message.error, None);
        assert_eq!(message.progress, 100);
        assert_eq!(message.state(), MessageState::Completed);
    }
}
