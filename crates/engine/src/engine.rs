use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use medley_timeline::{MessageBody, MessageId, TimelineStore};

use crate::adapter::{JobParams, JobStatus, ProviderAdapter, ProviderPayload, SubmitOutcome};
use crate::error::{ProviderError, ProviderResult};
use crate::policy::EnginePolicy;

struct PollerHandle {
    stopped: Arc<AtomicBool>,
}

/// Owns the submit/poll lifecycle for every job driven through the timeline.
///
/// The poller map is this engine's exclusive state; `launch`, `cancel`, and the
/// loops themselves are its only mutators. Job failures of any class are
/// recovered into the owning message's `error` field and never surface as `Err`
/// to callers.
pub struct JobEngine {
    store: Arc<TimelineStore>,
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
    pollers: Arc<Mutex<HashMap<String, PollerHandle>>>,
    policy: EnginePolicy,
}

impl JobEngine {
    pub fn new(store: Arc<TimelineStore>, policy: EnginePolicy) -> Self {
        Self {
            store,
            adapters: HashMap::new(),
            pollers: Arc::new(Mutex::new(HashMap::new())),
            policy,
        }
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapters.insert(adapter.id().to_string(), adapter);
        self
    }

    pub fn adapter(&self, provider_id: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(provider_id).cloned()
    }

    /// Submits the job recorded on `message_id` and, on success, starts its
    /// poller. All failure classes end up written on the message.
    pub async fn launch(&self, message_id: MessageId, provider_id: &str, params: JobParams) {
        let Some(adapter) = self.adapter(provider_id) else {
            let error = ProviderError::UnknownProvider {
                stage: "launch",
                provider_id: provider_id.to_string(),
            };
            tracing::warn!(message_id = %message_id, provider_id, "job submission has no adapter");
            let _ = self
                .store
                .update(message_id, |message| message.record_failure(error.to_string()));
            return;
        };

        match self.submit_with_retry(adapter.as_ref(), &params).await {
            Ok(outcome) => {
                let task_id = outcome.task_id;
                let _ = self.store.update(message_id, |message| {
                    message.assign_task_id(task_id.clone());
                });
                self.register_poller(adapter, task_id, message_id);
            }
            Err(error) => {
                tracing::warn!(
                    message_id = %message_id,
                    provider_id,
                    error = %error,
                    "job submission failed"
                );
                let _ = self
                    .store
                    .update(message_id, |message| message.record_failure(error.to_string()));
            }
        }
    }

    /// Bounded submit loop with linearly increasing delay.
    ///
    /// Only the ambiguous shape (an error signal carrying no description) is
    /// retried; a described rejection is final on the first answer.
    async fn submit_with_retry(
        &self,
        adapter: &dyn ProviderAdapter,
        params: &JobParams,
    ) -> ProviderResult<SubmitOutcome> {
        let attempts = self.policy.submit_attempts.max(1);
        let mut attempt = 1;

        loop {
            match adapter.submit(params).await {
                Ok(outcome) => return Ok(outcome),
                Err(error) if error.is_ambiguous() && attempt < attempts => {
                    let delay = self.policy.submit_backoff * attempt;
                    tracing::debug!(
                        provider_id = adapter.id(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "ambiguous gateway response, retrying submission"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// Registers exactly one poller per task id; re-registration is a no-op.
    fn register_poller(
        &self,
        adapter: Arc<dyn ProviderAdapter>,
        task_id: String,
        message_id: MessageId,
    ) {
        let stopped = Arc::new(AtomicBool::new(false));
        {
            let mut pollers = lock_pollers(&self.pollers);
            if pollers.contains_key(&task_id) {
                tracing::debug!(task_id = %task_id, "poller already registered, ignoring");
                return;
            }
            pollers.insert(
                task_id.clone(),
                PollerHandle {
                    stopped: Arc::clone(&stopped),
                },
            );
        }

        tokio::spawn(Self::run_poll_loop(
            Arc::clone(&self.store),
            adapter,
            Arc::clone(&self.pollers),
            self.policy.clone(),
            task_id,
            message_id,
            stopped,
        ));
    }

    async fn run_poll_loop(
        store: Arc<TimelineStore>,
        adapter: Arc<dyn ProviderAdapter>,
        pollers: Arc<Mutex<HashMap<String, PollerHandle>>>,
        policy: EnginePolicy,
        task_id: String,
        message_id: MessageId,
        stopped: Arc<AtomicBool>,
    ) {
        let mut consecutive_failures = 0u32;

        loop {
            if stopped.load(Ordering::SeqCst) {
                break;
            }

            match adapter.poll(&task_id).await {
                // A result that lands after cancellation is discarded, never applied.
                Ok(_) | Err(_) if stopped.load(Ordering::SeqCst) => break,
                Ok(outcome) => {
                    consecutive_failures = 0;
                    match outcome.status {
                        JobStatus::Pending | JobStatus::Processing => {
                            if let Some(progress) = outcome.progress {
                                let _ = store.update(message_id, |message| {
                                    message.apply_progress(progress);
                                });
                            }
                        }
                        JobStatus::Succeeded => {
                            apply_terminal_success(&store, message_id, outcome.result.as_ref());
                            break;
                        }
                        JobStatus::Failed => {
                            let error = outcome
                                .error
                                .unwrap_or_else(|| "provider reported failure".to_string());
                            let _ = store
                                .update(message_id, |message| message.record_failure(&error));
                            break;
                        }
                    }
                }
                Err(error) => {
                    consecutive_failures += 1;
                    tracing::warn!(
                        task_id = %task_id,
                        consecutive_failures,
                        error = %error,
                        "transient poll failure"
                    );
                    if consecutive_failures >= policy.max_consecutive_poll_failures {
                        let _ = store.update(message_id, |message| {
                            message.record_failure(format!(
                                "job polling gave up after {consecutive_failures} consecutive failures: {error}"
                            ));
                        });
                        break;
                    }
                }
            }

            tokio::time::sleep(policy.poll_interval).await;
        }

        // Remove only this loop's registration; cancellation may have removed it
        // already, or a later loop may own the slot.
        let mut pollers = lock_pollers(&pollers);
        if let Some(handle) = pollers.get(&task_id) {
            if Arc::ptr_eq(&handle.stopped, &stopped) {
                pollers.remove(&task_id);
            }
        }
    }

    /// Stops the poller for a task id, if one is active. The in-flight poll, if
    /// any, sees the flag before applying its result.
    pub fn cancel(&self, task_id: &str) -> bool {
        let Some(handle) = lock_pollers(&self.pollers).remove(task_id) else {
            return false;
        };
        handle.stopped.store(true, Ordering::SeqCst);
        true
    }

    pub fn is_polling(&self, task_id: &str) -> bool {
        lock_pollers(&self.pollers).contains_key(task_id)
    }

    pub fn active_poller_count(&self) -> usize {
        lock_pollers(&self.pollers).len()
    }

    /// One extra poll for a message whose job errored after a task id was
    /// assigned: no re-submission, no new message, no new poller.
    pub async fn refetch(&self, message_id: MessageId) {
        let Some(message) = self.store.get(message_id) else {
            return;
        };
        let Some(task_id) = message.task_id else {
            tracing::debug!(message_id = %message_id, "refetch skipped: message has no task id");
            return;
        };
        let Some(adapter) = message.provider.as_deref().and_then(|id| self.adapter(id)) else {
            tracing::debug!(message_id = %message_id, "refetch skipped: no adapter for message provider");
            return;
        };

        match adapter.poll(&task_id).await {
            Ok(outcome) if outcome.status == JobStatus::Succeeded => {
                let _ = self.store.update(message_id, |message| {
                    let recovered = outcome
                        .result
                        .as_ref()
                        .and_then(|payload| resolved_body(&message.body, payload))
                        .is_some_and(|body| message.record_refetch_result(body));
                    if !recovered {
                        tracing::debug!(message_id = %message.id, "refetch returned success without a usable result");
                    }
                });
            }
            Ok(outcome) => {
                tracing::debug!(
                    message_id = %message_id,
                    status = ?outcome.status,
                    "refetch found job still unterminated or failed"
                );
            }
            Err(error) => {
                tracing::warn!(message_id = %message_id, error = %error, "refetch poll failed");
            }
        }
    }
}

fn lock_pollers(
    pollers: &Mutex<HashMap<String, PollerHandle>>,
) -> std::sync::MutexGuard<'_, HashMap<String, PollerHandle>> {
    pollers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn apply_terminal_success(
    store: &TimelineStore,
    message_id: MessageId,
    payload: Option<&ProviderPayload>,
) {
    let _ = store.update(message_id, |message| {
        match payload.and_then(|payload| resolved_body(&message.body, payload)) {
            Some(body) => {
                if !message.record_result(body) {
                    tracing::debug!(
                        message_id = %message.id,
                        "terminal result arrived for an already-terminal message, dropped"
                    );
                }
            }
            None => message.record_failure("provider reported success without a usable result"),
        }
    });
}

/// Projects a kind-agnostic provider payload onto the message's body, keeping
/// the fields the payload cannot know (grid index, subtitle pointer).
fn resolved_body(current: &MessageBody, payload: &ProviderPayload) -> Option<MessageBody> {
    match current {
        MessageBody::Generate { .. } => payload.image_url.clone().map(|url| MessageBody::Generate {
            grid_image_url: Some(url),
        }),
        MessageBody::Upscale { grid_index, .. } => {
            payload.image_url.clone().map(|url| MessageBody::Upscale {
                grid_index: *grid_index,
                upscaled_image_url: Some(url),
            })
        }
        MessageBody::Pedit { .. } => {
            let image_urls = if payload.image_urls.is_empty() {
                payload.image_url.clone().into_iter().collect()
            } else {
                payload.image_urls.clone()
            };
            if image_urls.is_empty() {
                None
            } else {
                Some(MessageBody::Pedit { image_urls })
            }
        }
        MessageBody::Video { .. } => payload
            .video_url
            .clone()
            .map(|url| MessageBody::Video { video_url: Some(url) }),
        MessageBody::Deconstruct { .. } => payload.text.clone().map(|text| MessageBody::Deconstruct {
            description: Some(text),
        }),
        MessageBody::Suno { .. } => payload.audio_url.clone().map(|url| MessageBody::Suno {
            audio_url: Some(url),
            lyrics: payload.text.clone(),
        }),
        MessageBody::Youtube {
            video_ref,
            audio_ref,
            subtitle_ref,
            ..
        } => payload.video_url.clone().map(|url| MessageBody::Youtube {
            video_url: Some(url),
            video_ref: *video_ref,
            audio_ref: *audio_ref,
            subtitle_ref: *subtitle_ref,
        }),
    }
}
