use serde::Deserialize;
use serde_json::json;
use snafu::ResultExt;

use crate::adapter::{
    BoxFuture, JobParams, PollOutcome, ProviderAdapter, ProviderPayload, SubmitOutcome,
};
use crate::error::{
    AmbiguousSubmitSnafu, GatewayStatusSnafu, HttpSnafu, MissingTaskIdSnafu, ProviderError,
    ProviderResult, SubmitRejectedSnafu, UnsupportedKindSnafu,
};

use super::{GatewayConfig, build_http_client, parse_percent};

pub const KLING_PROVIDER_ID: &str = "kling";

const KLING_IMAGE2VIDEO_PATH: &str = "/kling/v1/videos/image2video";
const SUBMIT_OK_CODE: i64 = 0;

/// Adapter for the image-to-video gateway family (kling, runway, sora share
/// the same `{code, message, data}` envelope behind the relay).
pub struct VideoGateway {
    provider_id: String,
    submit_path: String,
    config: GatewayConfig,
    http: reqwest::Client,
}

impl VideoGateway {
    /// Creates the default kling-backed gateway.
    pub fn new(config: GatewayConfig) -> ProviderResult<Self> {
        Self::with_provider(KLING_PROVIDER_ID, KLING_IMAGE2VIDEO_PATH, config)
    }

    /// Creates a gateway for another provider in the family; `submit_path` is
    /// also the base for status queries (`{submit_path}/{task_id}`).
    pub fn with_provider(
        provider_id: impl Into<String>,
        submit_path: impl Into<String>,
        config: GatewayConfig,
    ) -> ProviderResult<Self> {
        let http = build_http_client(&config)?;
        Ok(Self {
            provider_id: provider_id.into(),
            submit_path: submit_path.into(),
            config,
            http,
        })
    }

    async fn submit_video(
        &self,
        model: &str,
        prompt: &str,
        image_url: Option<&str>,
        duration_seconds: u32,
    ) -> ProviderResult<SubmitOutcome> {
        let payload = json!({
            "model_name": model,
            "image": image_url.unwrap_or_default(),
            "prompt": prompt,
            "duration": duration_seconds.to_string(),
            "mode": "std",
            "cfg_scale": 0.5,
        });

        let response = self
            .http
            .post(self.config.endpoint(&self.submit_path))
            .header(reqwest::header::AUTHORIZATION, self.config.bearer())
            .json(&payload)
            .send()
            .await
            .context(HttpSnafu {
                stage: "send-video-submit",
            })?;

        let status = response.status();
        let body = response.text().await.context(HttpSnafu {
            stage: "read-video-submit-body",
        })?;

        if !status.is_success() {
            return GatewayStatusSnafu {
                stage: "video-submit-http-status",
                status: status.as_u16(),
                body,
            }
            .fail();
        }

        let raw: serde_json::Value =
            serde_json::from_str(&body).map_err(|source| ProviderError::ParsePayload {
                stage: "parse-video-submit-envelope",
                details: source.to_string(),
            })?;
        map_submit_envelope(raw)
    }

    async fn query_video(&self, task_id: &str) -> ProviderResult<PollOutcome> {
        let path = format!("{}/{task_id}", self.submit_path);
        let response = self
            .http
            .get(self.config.endpoint(&path))
            .header(reqwest::header::AUTHORIZATION, self.config.bearer())
            .send()
            .await
            .context(HttpSnafu {
                stage: "send-video-query",
            })?;

        let status = response.status();
        let body = response.text().await.context(HttpSnafu {
            stage: "read-video-query-body",
        })?;

        if !status.is_success() {
            return GatewayStatusSnafu {
                stage: "video-query-http-status",
                status: status.as_u16(),
                body,
            }
            .fail();
        }

        let envelope: VideoEnvelope =
            serde_json::from_str(&body).map_err(|source| ProviderError::ParsePayload {
                stage: "parse-video-query-envelope",
                details: source.to_string(),
            })?;
        Ok(map_query_envelope(envelope))
    }
}

impl ProviderAdapter for VideoGateway {
    fn id(&self) -> &str {
        &self.provider_id
    }

    fn submit<'a>(&'a self, params: &'a JobParams) -> BoxFuture<'a, ProviderResult<SubmitOutcome>> {
        Box::pin(async move {
            match params {
                JobParams::Video {
                    model,
                    prompt,
                    image_url,
                    duration_seconds,
                } => {
                    self.submit_video(model, prompt, image_url.as_deref(), *duration_seconds)
                        .await
                }
                other => UnsupportedKindSnafu {
                    stage: "video-submit",
                    provider_id: self.provider_id.clone(),
                    kind: other.kind().as_str(),
                }
                .fail(),
            }
        })
    }

    fn poll<'a>(&'a self, task_id: &'a str) -> BoxFuture<'a, ProviderResult<PollOutcome>> {
        Box::pin(self.query_video(task_id))
    }
}

#[derive(Debug, Deserialize)]
struct VideoEnvelope {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<VideoData>,
}

#[derive(Debug, Default, Deserialize)]
struct VideoData {
    #[serde(default)]
    task_id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    progress: String,
    #[serde(default)]
    video_url: String,
    #[serde(default)]
    task_status_msg: String,
}

fn map_submit_envelope(raw: serde_json::Value) -> ProviderResult<SubmitOutcome> {
    let envelope: VideoEnvelope =
        serde_json::from_value(raw.clone()).map_err(|source| ProviderError::ParsePayload {
            stage: "decode-video-submit-envelope",
            details: source.to_string(),
        })?;

    if envelope.code != SUBMIT_OK_CODE {
        let message = envelope.message.trim();
        if message.is_empty() {
            return AmbiguousSubmitSnafu {
                stage: "video-submit-envelope",
            }
            .fail();
        }
        return SubmitRejectedSnafu {
            stage: "video-submit-envelope",
            description: message.to_string(),
        }
        .fail();
    }

    let task_id = envelope
        .data
        .map(|data| data.task_id)
        .unwrap_or_default();
    if task_id.trim().is_empty() {
        return MissingTaskIdSnafu {
            stage: "video-submit-envelope",
        }
        .fail();
    }

    Ok(SubmitOutcome {
        task_id: task_id.trim().to_string(),
        raw,
    })
}

fn map_query_envelope(envelope: VideoEnvelope) -> PollOutcome {
    let data = envelope.data.unwrap_or_default();
    let progress = parse_percent(&data.progress);

    match data.status.as_str() {
        "completed" | "succeed" => {
            let video_url = data.video_url.trim();
            if video_url.is_empty() {
                // Completed without a link means the asset is still being staged.
                PollOutcome::processing(progress)
            } else {
                PollOutcome::succeeded(ProviderPayload {
                    video_url: Some(video_url.to_string()),
                    ..ProviderPayload::default()
                })
            }
        }
        "failed" => {
            let reason = if data.task_status_msg.trim().is_empty() {
                envelope.message.trim().to_string()
            } else {
                data.task_status_msg.trim().to_string()
            };
            PollOutcome::failed(if reason.is_empty() {
                "video generation failed".to_string()
            } else {
                reason
            })
        }
        "" | "submitted" | "queued" => PollOutcome::pending(progress),
        _ => PollOutcome::processing(progress),
    }
}
