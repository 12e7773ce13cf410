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

pub const MIDJOURNEY_PROVIDER_ID: &str = "midjourney";

const IMAGINE_PATH: &str = "/mj/submit/imagine";
const ACTION_PATH: &str = "/mj/submit/action";
const SUBMIT_OK_CODE: i64 = 1;

/// Adapter for the Midjourney-compatible relay gateway.
///
/// Serves `generate` (imagine) and `upscale` (U1..U4 action) jobs. Both submit
/// endpoints answer the `{code, description, result}` envelope where `result`
/// carries the task id; progress is then fetched from `/mj/task/{id}/fetch`.
pub struct MidjourneyGateway {
    config: GatewayConfig,
    http: reqwest::Client,
}

impl MidjourneyGateway {
    pub fn new(config: GatewayConfig) -> ProviderResult<Self> {
        let http = build_http_client(&config)?;
        Ok(Self { config, http })
    }

    async fn post_submit(
        &self,
        path: &str,
        payload: serde_json::Value,
    ) -> ProviderResult<SubmitOutcome> {
        let response = self
            .http
            .post(self.config.endpoint(path))
            .header(reqwest::header::AUTHORIZATION, self.config.bearer())
            .json(&payload)
            .send()
            .await
            .context(HttpSnafu {
                stage: "send-submit",
            })?;

        let status = response.status();
        // The gateway labels submit bodies text/plain even though they carry
        // JSON, so read text and parse explicitly.
        let body = response.text().await.context(HttpSnafu {
            stage: "read-submit-body",
        })?;

        if !status.is_success() {
            return GatewayStatusSnafu {
                stage: "submit-http-status",
                status: status.as_u16(),
                body,
            }
            .fail();
        }

        let raw: serde_json::Value =
            serde_json::from_str(&body).map_err(|source| ProviderError::ParsePayload {
                stage: "parse-submit-envelope",
                details: source.to_string(),
            })?;
        map_submit_envelope(raw)
    }

    async fn fetch_task(&self, task_id: &str) -> ProviderResult<PollOutcome> {
        let path = format!("/mj/task/{task_id}/fetch");
        let response = self
            .http
            .get(self.config.endpoint(&path))
            .header(reqwest::header::AUTHORIZATION, self.config.bearer())
            .send()
            .await
            .context(HttpSnafu { stage: "send-fetch" })?;

        let status = response.status();
        let body = response.text().await.context(HttpSnafu {
            stage: "read-fetch-body",
        })?;

        if !status.is_success() {
            return GatewayStatusSnafu {
                stage: "fetch-http-status",
                status: status.as_u16(),
                body,
            }
            .fail();
        }

        let envelope: FetchEnvelope =
            serde_json::from_str(&body).map_err(|source| ProviderError::ParsePayload {
                stage: "parse-fetch-envelope",
                details: source.to_string(),
            })?;
        Ok(map_fetch_envelope(envelope))
    }
}

impl ProviderAdapter for MidjourneyGateway {
    fn id(&self) -> &str {
        MIDJOURNEY_PROVIDER_ID
    }

    fn submit<'a>(&'a self, params: &'a JobParams) -> BoxFuture<'a, ProviderResult<SubmitOutcome>> {
        Box::pin(async move {
            match params {
                JobParams::Generate { prompt, ref_urls } => {
                    let payload = json!({
                        "base64Array": [],
                        "notifyHook": "",
                        "prompt": imagine_prompt(prompt, ref_urls),
                        "state": "",
                        "botType": "MID_JOURNEY",
                    });
                    self.post_submit(IMAGINE_PATH, payload).await
                }
                JobParams::Upscale {
                    parent_task_id,
                    grid_index,
                } => {
                    let payload = json!({
                        "chooseSameChannel": true,
                        "customId": upsample_custom_id(*grid_index, parent_task_id),
                        "taskId": parent_task_id,
                        "notifyHook": "",
                        "state": "",
                    });
                    self.post_submit(ACTION_PATH, payload).await
                }
                other => UnsupportedKindSnafu {
                    stage: "midjourney-submit",
                    provider_id: MIDJOURNEY_PROVIDER_ID,
                    kind: other.kind().as_str(),
                }
                .fail(),
            }
        })
    }

    fn poll<'a>(&'a self, task_id: &'a str) -> BoxFuture<'a, ProviderResult<PollOutcome>> {
        Box::pin(self.fetch_task(task_id))
    }
}

#[derive(Debug, Deserialize)]
struct SubmitEnvelope {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    description: String,
    #[serde(default)]
    result: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FetchEnvelope {
    #[serde(default)]
    status: String,
    #[serde(default)]
    progress: String,
    #[serde(default)]
    image_url: String,
    #[serde(default)]
    fail_reason: String,
}

/// Reference URLs lead the prompt, comma-separated, the way the upstream bot
/// expects image-conditioned prompts.
fn imagine_prompt(prompt: &str, ref_urls: &[String]) -> String {
    if ref_urls.is_empty() {
        prompt.to_string()
    } else {
        format!("{}, {}", ref_urls.join(", "), prompt)
    }
}

fn upsample_custom_id(grid_index: u8, parent_task_id: &str) -> String {
    format!("MJ::JOB::upsample::{grid_index}::{parent_task_id}")
}

fn map_submit_envelope(raw: serde_json::Value) -> ProviderResult<SubmitOutcome> {
    let envelope: SubmitEnvelope =
        serde_json::from_value(raw.clone()).map_err(|source| ProviderError::ParsePayload {
            stage: "decode-submit-envelope",
            details: source.to_string(),
        })?;

    if envelope.code != SUBMIT_OK_CODE {
        let description = envelope.description.trim();
        if description.is_empty() {
            return AmbiguousSubmitSnafu {
                stage: "submit-envelope",
            }
            .fail();
        }
        return SubmitRejectedSnafu {
            stage: "submit-envelope",
            description: description.to_string(),
        }
        .fail();
    }

    let Some(task_id) = envelope.result.as_ref().and_then(task_id_from_result) else {
        return MissingTaskIdSnafu {
            stage: "submit-envelope",
        }
        .fail();
    };

    Ok(SubmitOutcome { task_id, raw })
}

fn task_id_from_result(result: &serde_json::Value) -> Option<String> {
    match result {
        serde_json::Value::String(raw) if !raw.trim().is_empty() => Some(raw.trim().to_string()),
        serde_json::Value::Number(raw) => Some(raw.to_string()),
        _ => None,
    }
}

fn map_fetch_envelope(envelope: FetchEnvelope) -> PollOutcome {
    let progress = parse_percent(&envelope.progress);

    match envelope.status.as_str() {
        "SUCCESS" => {
            let image_url = envelope.image_url.trim();
            if image_url.is_empty() {
                // The gateway can flip status before the image link lands; keep polling.
                PollOutcome::processing(progress)
            } else {
                PollOutcome::succeeded(ProviderPayload {
                    image_url: Some(image_url.to_string()),
                    ..ProviderPayload::default()
                })
            }
        }
        "FAILURE" => {
            let reason = envelope.fail_reason.trim();
            PollOutcome::failed(if reason.is_empty() {
                "image generation failed".to_string()
            } else {
                reason.to_string()
            })
        }
        // Status is the empty string while the relay has not picked the task up.
        "" | "NOT_START" | "SUBMITTED" => PollOutcome::pending(progress),
        _ => PollOutcome::processing(progress),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::adapter::JobStatus;

    use super::*;

    #[test]
    fn submit_envelope_with_code_one_carries_the_task_id() {
        let outcome = map_submit_envelope(json!({
            "code": 1,
            "description": "提交成功",
            "result": "1767652132905893",
        }))
        .expect("submission accepted");
        assert_eq!(outcome.task_id, "1767652132905893");

        let numeric = map_submit_envelope(json!({ "code": 1, "result": 42 }))
            .expect("numeric task ids are tolerated");
        assert_eq!(numeric.task_id, "42");
    }

    #[test]
    fn blank_description_error_maps_to_the_ambiguous_class() {
        let error = map_submit_envelope(json!({ "code": 0, "description": "" }))
            .expect_err("error envelope");
        assert!(error.is_ambiguous());
    }

    #[test]
    fn described_error_maps_to_a_final_rejection() {
        let error = map_submit_envelope(json!({ "code": 24, "description": "banned prompt" }))
            .expect_err("error envelope");
        assert!(!error.is_ambiguous());
        assert!(error.to_string().contains("banned prompt"));
    }

    #[test]
    fn accepted_envelope_without_a_result_is_an_error() {
        let error =
            map_submit_envelope(json!({ "code": 1, "description": "ok" })).expect_err("no task id");
        assert!(matches!(error, ProviderError::MissingTaskId { .. }));
    }

    #[test]
    fn empty_status_fetch_reads_as_pending_with_progress() {
        let outcome = map_fetch_envelope(FetchEnvelope {
            status: String::new(),
            progress: "0%".to_string(),
            image_url: String::new(),
            fail_reason: String::new(),
        });
        assert_eq!(outcome.status, JobStatus::Pending);
        assert_eq!(outcome.progress, Some(0));
    }

    #[test]
    fn success_without_an_image_url_keeps_polling() {
        let outcome = map_fetch_envelope(FetchEnvelope {
            status: "SUCCESS".to_string(),
            progress: "100%".to_string(),
            image_url: String::new(),
            fail_reason: String::new(),
        });
        assert_eq!(outcome.status, JobStatus::Processing);
    }

    #[test]
    fn success_with_an_image_url_is_terminal() {
        let outcome = map_fetch_envelope(FetchEnvelope {
            status: "SUCCESS".to_string(),
            progress: "100%".to_string(),
            image_url: "https://x/grid.png".to_string(),
            fail_reason: String::new(),
        });
        assert_eq!(outcome.status, JobStatus::Succeeded);
        assert_eq!(
            outcome.result.and_then(|payload| payload.image_url).as_deref(),
            Some("https://x/grid.png")
        );
    }

    #[test]
    fn failure_carries_the_fail_reason() {
        let outcome = map_fetch_envelope(FetchEnvelope {
            status: "FAILURE".to_string(),
            progress: "62%".to_string(),
            image_url: String::new(),
            fail_reason: "content policy violation".to_string(),
        });
        assert_eq!(outcome.status, JobStatus::Failed);
        assert_eq!(outcome.error.as_deref(), Some("content policy violation"));
    }

    #[test]
    fn reference_urls_lead_the_imagine_prompt() {
        assert_eq!(imagine_prompt("a cat", &[]), "a cat");
        assert_eq!(
            imagine_prompt("a cat", &["https://x/ref.png".to_string()]),
            "https://x/ref.png, a cat"
        );
    }

    #[test]
    fn upsample_custom_id_matches_the_bot_format() {
        assert_eq!(upsample_custom_id(2, "176765"), "MJ::JOB::upsample::2::176765");
    }
}
