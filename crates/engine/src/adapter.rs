use std::future::Future;
use std::pin::Pin;

use medley_timeline::MessageKind;

use crate::error::ProviderResult;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Upstream job state as reported by one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Processing,
    Succeeded,
    Failed,
}

/// Inputs recorded on the pending message, shaped per kind so adapters can
/// build their wire payloads without reaching back into the timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobParams {
    Generate {
        prompt: String,
        ref_urls: Vec<String>,
    },
    Upscale {
        parent_task_id: String,
        grid_index: u8,
    },
    Pedit {
        prompt: String,
        ref_urls: Vec<String>,
    },
    Video {
        model: String,
        prompt: String,
        image_url: Option<String>,
        duration_seconds: u32,
    },
    Deconstruct {
        image_url: String,
    },
    Suno {
        prompt: String,
    },
    Youtube {
        video_url: String,
        audio_url: String,
        subtitle_text: Option<String>,
    },
}

impl JobParams {
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
}

/// Successful submission: the provider-issued task id plus the raw response
/// kept for lineage and debugging.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub task_id: String,
    pub raw: serde_json::Value,
}

/// Kind-agnostic result payload; the engine projects it onto the owning
/// message's body after a kind check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderPayload {
    pub image_url: Option<String>,
    pub image_urls: Vec<String>,
    pub video_url: Option<String>,
    pub audio_url: Option<String>,
    pub text: Option<String>,
}

/// One poll observation.
#[derive(Debug, Clone)]
pub struct PollOutcome {
    pub status: JobStatus,
    pub progress: Option<i64>,
    pub result: Option<ProviderPayload>,
    pub error: Option<String>,
}

impl PollOutcome {
    pub fn pending(progress: Option<i64>) -> Self {
        Self {
            status: JobStatus::Pending,
            progress,
            result: None,
            error: None,
        }
    }

    pub fn processing(progress: impl Into<Option<i64>>) -> Self {
        Self {
            status: JobStatus::Processing,
            progress: progress.into(),
            result: None,
            error: None,
        }
    }

    pub fn succeeded(result: ProviderPayload) -> Self {
        Self {
            status: JobStatus::Succeeded,
            progress: Some(100),
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            progress: None,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// One external generation service, reduced to the submit/poll boundary.
pub trait ProviderAdapter: Send + Sync {
    fn id(&self) -> &str;
    fn submit<'a>(&'a self, params: &'a JobParams) -> BoxFuture<'a, ProviderResult<SubmitOutcome>>;
    fn poll<'a>(&'a self, task_id: &'a str) -> BoxFuture<'a, ProviderResult<PollOutcome>>;
}
