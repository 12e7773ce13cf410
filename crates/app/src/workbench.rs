use std::sync::Arc;

use medley_engine::{
    JobEngine, JobParams, MidjourneyGateway, ProviderResult, VideoGateway,
};
use medley_reconcile::{ReconcileStats, Reconciler, RenderSink, visible_messages};
use medley_registry::{
    IngestOutcome, MediaAssetRegistry, MediaKind, ReferenceRegistry, ResolvedLocations,
    UploadStore, derive_keep_set, run_sweep,
};
use medley_timeline::{
    AssetId, MessageBody, MessageId, MessageKind, MessageState, ReferenceId, StreamMessage,
    TimelineStore,
};

use crate::settings::Settings;

/// The one interactive surface over the orchestration core.
///
/// Owns the store, the engine, and the registries, and receives every external
/// collaborator through construction; nothing here is looked up ambiently.
/// Every action appends a `user` message plus a pending `ai` message and hands
/// the pair to the engine; all job failures surface on the ai message.
pub struct Workbench {
    store: Arc<TimelineStore>,
    engine: Arc<JobEngine>,
    references: Arc<ReferenceRegistry>,
    assets: Arc<MediaAssetRegistry>,
    uploads: Arc<dyn UploadStore>,
    settings: Arc<Settings>,
}

impl Workbench {
    pub fn new(
        store: Arc<TimelineStore>,
        engine: Arc<JobEngine>,
        references: Arc<ReferenceRegistry>,
        assets: Arc<MediaAssetRegistry>,
        uploads: Arc<dyn UploadStore>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            store,
            engine,
            references,
            assets,
            uploads,
            settings,
        }
    }

    /// Builds the full core from settings: store, registries, and the engine
    /// with the relay gateway adapters registered.
    pub fn from_settings(
        settings: Arc<Settings>,
        uploads: Arc<dyn UploadStore>,
    ) -> ProviderResult<Self> {
        let gateway_config = settings.gateway.to_gateway_config();
        let store = Arc::new(TimelineStore::new(settings.timeline.capacity));
        let engine = JobEngine::new(Arc::clone(&store), settings.engine.to_engine_policy())
            .with_adapter(Arc::new(MidjourneyGateway::new(gateway_config.clone())?))
            .with_adapter(Arc::new(VideoGateway::new(gateway_config)?));

        Ok(Self::new(
            store,
            Arc::new(engine),
            Arc::new(ReferenceRegistry::new()),
            Arc::new(MediaAssetRegistry::new()),
            uploads,
            settings,
        ))
    }

    pub fn store(&self) -> &Arc<TimelineStore> {
        &self.store
    }

    pub fn engine(&self) -> &Arc<JobEngine> {
        &self.engine
    }

    pub fn references(&self) -> &Arc<ReferenceRegistry> {
        &self.references
    }

    pub fn assets(&self) -> &Arc<MediaAssetRegistry> {
        &self.assets
    }

    /// Submits a grid generation job.
    pub async fn generate(&self, prompt: &str, ref_ids: Vec<ReferenceId>) -> MessageId {
        let provider = self.settings.providers.image.clone();
        let ref_urls = self.reference_urls(&ref_ids);

        let user = StreamMessage::user(MessageKind::Generate, prompt).with_refs(ref_ids.clone());
        let user_id = self.store.append(user);

        let mut ai = StreamMessage::ai_pending(MessageKind::Generate, Some(provider.clone()))
            .with_parent(user_id)
            .with_refs(ref_ids);
        ai.text = prompt.to_string();
        let ai_id = self.store.append(ai);

        self.engine
            .launch(
                ai_id,
                &provider,
                JobParams::Generate {
                    prompt: prompt.to_string(),
                    ref_urls,
                },
            )
            .await;
        ai_id
    }

    /// Submits an upscale of one tile from a finished grid message.
    pub async fn upscale(&self, grid_message_id: MessageId, grid_index: u8) -> Option<MessageId> {
        let grid = self.store.get(grid_message_id)?;
        let Some(parent_task_id) = grid.task_id.clone() else {
            tracing::warn!(
                grid_message_id = %grid_message_id,
                "upscale requested for a grid that never got a task id"
            );
            return None;
        };

        let provider = self.settings.providers.image.clone();
        let user = StreamMessage::user(MessageKind::Upscale, format!("U{grid_index}"))
            .with_parent(grid_message_id);
        self.store.append(user);

        let ai = StreamMessage::ai_pending(MessageKind::Upscale, Some(provider.clone()))
            .with_parent(grid_message_id)
            .with_body(MessageBody::Upscale {
                grid_index,
                upscaled_image_url: None,
            });
        let ai_id = self.store.append(ai);

        self.engine
            .launch(
                ai_id,
                &provider,
                JobParams::Upscale {
                    parent_task_id,
                    grid_index,
                },
            )
            .await;
        Some(ai_id)
    }

    /// Submits a prompt-driven image edit over reference images.
    pub async fn pedit(&self, prompt: &str, ref_ids: Vec<ReferenceId>) -> MessageId {
        let provider = self.settings.providers.pedit.clone();
        let ref_urls = self.reference_urls(&ref_ids);

        let user = StreamMessage::user(MessageKind::Pedit, prompt).with_refs(ref_ids.clone());
        let user_id = self.store.append(user);

        let mut ai = StreamMessage::ai_pending(MessageKind::Pedit, Some(provider.clone()))
            .with_parent(user_id)
            .with_refs(ref_ids);
        ai.text = prompt.to_string();
        let ai_id = self.store.append(ai);

        self.engine
            .launch(
                ai_id,
                &provider,
                JobParams::Pedit {
                    prompt: prompt.to_string(),
                    ref_urls,
                },
            )
            .await;
        ai_id
    }

    /// Submits a video synthesis job, optionally conditioned on a reference image.
    pub async fn video(&self, prompt: &str, ref_id: Option<ReferenceId>) -> MessageId {
        let provider = self.settings.providers.video.clone();
        let ref_ids: Vec<ReferenceId> = ref_id.into_iter().collect();
        let image_url = ref_ids.first().and_then(|id| self.reference_url(*id));

        let user = StreamMessage::user(MessageKind::Video, prompt).with_refs(ref_ids.clone());
        let user_id = self.store.append(user);

        let mut ai = StreamMessage::ai_pending(MessageKind::Video, Some(provider.clone()))
            .with_parent(user_id)
            .with_refs(ref_ids);
        ai.text = prompt.to_string();
        let ai_id = self.store.append(ai);

        self.engine
            .launch(
                ai_id,
                &provider,
                JobParams::Video {
                    model: self.settings.video.default_model.clone(),
                    prompt: prompt.to_string(),
                    image_url,
                    duration_seconds: self.settings.video.default_duration_seconds,
                },
            )
            .await;
        ai_id
    }

    /// Asks the vision collaborator to describe a reference image.
    pub async fn deconstruct(&self, ref_id: ReferenceId) -> MessageId {
        let provider = self.settings.providers.deconstruct.clone();

        let user =
            StreamMessage::user(MessageKind::Deconstruct, "describe this image").with_refs(vec![ref_id]);
        let user_id = self.store.append(user);

        let ai = StreamMessage::ai_pending(MessageKind::Deconstruct, Some(provider.clone()))
            .with_parent(user_id)
            .with_refs(vec![ref_id]);
        let ai_id = self.store.append(ai);

        match self.reference_url(ref_id) {
            Some(image_url) => {
                self.engine
                    .launch(ai_id, &provider, JobParams::Deconstruct { image_url })
                    .await;
            }
            None => {
                let _ = self.store.update(ai_id, |message| {
                    message.record_failure("reference image has no resolved remote url yet");
                });
            }
        }
        ai_id
    }

    /// Submits a music generation job.
    pub async fn suno(&self, prompt: &str) -> MessageId {
        let provider = self.settings.providers.suno.clone();

        let user_id = self.store.append(StreamMessage::user(MessageKind::Suno, prompt));
        let mut ai = StreamMessage::ai_pending(MessageKind::Suno, Some(provider.clone()))
            .with_parent(user_id);
        ai.text = prompt.to_string();
        let ai_id = self.store.append(ai);

        self.engine
            .launch(
                ai_id,
                &provider,
                JobParams::Suno {
                    prompt: prompt.to_string(),
                },
            )
            .await;
        ai_id
    }

    /// Submits an MV composition over previously imported media assets.
    pub async fn youtube(
        &self,
        video_ref: AssetId,
        audio_ref: AssetId,
        subtitle_ref: Option<AssetId>,
    ) -> MessageId {
        let provider = self.settings.providers.youtube.clone();

        let user_id = self
            .store
            .append(StreamMessage::user(MessageKind::Youtube, "compose mv"));
        let ai = StreamMessage::ai_pending(MessageKind::Youtube, Some(provider.clone()))
            .with_parent(user_id)
            .with_body(MessageBody::Youtube {
                video_url: None,
                video_ref: Some(video_ref),
                audio_ref: Some(audio_ref),
                subtitle_ref,
            });
        let ai_id = self.store.append(ai);

        match self.compose_params(video_ref, audio_ref, subtitle_ref) {
            Some(params) => self.engine.launch(ai_id, &provider, params).await,
            None => {
                let _ = self.store.update(ai_id, |message| {
                    message.record_failure("composition assets have no resolved urls yet");
                });
            }
        }
        ai_id
    }

    /// Registers image bytes; identical content resolves to the existing entry.
    /// Remote resolution runs in the background and patches the entry in place.
    pub fn ingest_reference(&self, bytes: Vec<u8>, name: &str) -> IngestOutcome {
        let outcome = self.references.ingest(&bytes, name);
        if !outcome.existing {
            let references = Arc::clone(&self.references);
            let uploads = Arc::clone(&self.uploads);
            let name = name.to_string();
            tokio::spawn(async move {
                references
                    .resolve_remote(uploads.as_ref(), outcome.id, &bytes, &name)
                    .await;
            });
        }
        outcome
    }

    /// Imports a media asset and uploads it in the background.
    pub fn import_media(
        &self,
        bytes: Vec<u8>,
        kind: MediaKind,
        name: &str,
        subtitle_text: Option<String>,
    ) -> AssetId {
        let id = self.assets.insert(kind, name, subtitle_text);
        let assets = Arc::clone(&self.assets);
        let uploads = Arc::clone(&self.uploads);
        let name = name.to_string();
        tokio::spawn(async move {
            match uploads.upload(&bytes, &name).await {
                Ok(outcome) => {
                    let locations = ResolvedLocations {
                        url: outcome.url,
                        cdn_url: outcome.cdn_url,
                        local_url: Some(outcome.local_url),
                        local_key: Some(outcome.local_key),
                    };
                    if let Err(error) = assets.patch_locations(id, locations) {
                        tracing::debug!(asset_id = %id, error = %error, "resolved an already-removed asset");
                    }
                }
                Err(error) => {
                    tracing::warn!(asset_id = %id, error = %error, "media upload failed; asset remains local-only");
                }
            }
        });
        id
    }

    /// Toggles a message out of (or back into) the rendered view.
    pub fn hide(&self, message_id: MessageId, hidden: bool) -> bool {
        self.store
            .update(message_id, |message| message.hidden = hidden)
            .is_ok()
    }

    /// Deletes one entry from history, stops its poller, and runs a GC pass.
    pub async fn delete(&self, message_id: MessageId) -> bool {
        let Some(message) = self.store.get(message_id) else {
            return false;
        };
        if let Some(task_id) = &message.task_id {
            self.engine.cancel(task_id);
        }

        let removed = self.store.remove(message_id);
        if removed {
            self.collect_garbage().await;
        }
        removed
    }

    /// Re-fetches the result of an errored message that carries a task id.
    pub async fn retry_fetch(&self, message_id: MessageId) {
        self.engine.refetch(message_id).await;
    }

    /// Re-submits a failed job as a new message; the errored original stays in
    /// history untouched.
    pub async fn retry_submit(&self, message_id: MessageId) -> Option<MessageId> {
        let message = self.store.get(message_id)?;
        if message.state() != MessageState::Errored {
            tracing::debug!(message_id = %message_id, "retry requested for a message that is not errored");
            return None;
        }
        let provider = message.provider.clone()?;
        let params = self.params_for(&message)?;

        let mut retry = StreamMessage::ai_pending(message.kind(), Some(provider.clone()))
            .with_parent(message_id)
            .with_refs(message.ref_ids.clone())
            .with_body(unresolved_body(&message.body));
        retry.text = message.text.clone();
        let retry_id = self.store.append(retry);

        self.engine.launch(retry_id, &provider, params).await;
        Some(retry_id)
    }

    /// Derives the keep-set from the full application state and runs one
    /// best-effort sweep over the upload store.
    pub async fn collect_garbage(&self) -> Vec<String> {
        let keep = derive_keep_set(
            &self.store.snapshot(),
            &self.references.entries(),
            &self.assets.entries(),
        );
        run_sweep(self.uploads.as_ref(), self.settings.gc.min_age(), &keep).await
    }

    /// Reconciles the visible timeline onto a caller-supplied view.
    pub fn reconcile_into<S: RenderSink>(&self, reconciler: &mut Reconciler<S>) -> ReconcileStats {
        reconciler.reconcile(&visible_messages(&self.store.snapshot()))
    }

    /// Rebuilds submit parameters from a message's recorded inputs.
    fn params_for(&self, message: &StreamMessage) -> Option<JobParams> {
        match &message.body {
            MessageBody::Generate { .. } => Some(JobParams::Generate {
                prompt: message.text.clone(),
                ref_urls: self.reference_urls(&message.ref_ids),
            }),
            MessageBody::Upscale { grid_index, .. } => {
                let grid = message
                    .parent_message_id
                    .and_then(|id| self.store.get(id))?;
                Some(JobParams::Upscale {
                    parent_task_id: grid.task_id?,
                    grid_index: *grid_index,
                })
            }
            MessageBody::Pedit { .. } => Some(JobParams::Pedit {
                prompt: message.text.clone(),
                ref_urls: self.reference_urls(&message.ref_ids),
            }),
            MessageBody::Video { .. } => Some(JobParams::Video {
                model: self.settings.video.default_model.clone(),
                prompt: message.text.clone(),
                image_url: message
                    .ref_ids
                    .first()
                    .and_then(|id| self.reference_url(*id)),
                duration_seconds: self.settings.video.default_duration_seconds,
            }),
            MessageBody::Deconstruct { .. } => {
                let image_url = message
                    .ref_ids
                    .first()
                    .and_then(|id| self.reference_url(*id))?;
                Some(JobParams::Deconstruct { image_url })
            }
            MessageBody::Suno { .. } => Some(JobParams::Suno {
                prompt: message.text.clone(),
            }),
            MessageBody::Youtube {
                video_ref,
                audio_ref,
                subtitle_ref,
                ..
            } => self.compose_params((*video_ref)?, (*audio_ref)?, *subtitle_ref),
        }
    }

    fn compose_params(
        &self,
        video_ref: AssetId,
        audio_ref: AssetId,
        subtitle_ref: Option<AssetId>,
    ) -> Option<JobParams> {
        let video_url = self.asset_url(video_ref)?;
        let audio_url = self.asset_url(audio_ref)?;
        let subtitle_text = subtitle_ref
            .and_then(|id| self.assets.get(id))
            .and_then(|asset| asset.subtitle_text);

        Some(JobParams::Youtube {
            video_url,
            audio_url,
            subtitle_text,
        })
    }

    fn reference_url(&self, id: ReferenceId) -> Option<String> {
        let entry = self.references.get(id)?;
        entry
            .locations
            .cdn_url
            .or(entry.locations.url)
            .or(entry.locations.local_url)
    }

    fn reference_urls(&self, ids: &[ReferenceId]) -> Vec<String> {
        ids.iter()
            .filter_map(|id| self.reference_url(*id))
            .collect()
    }

    fn asset_url(&self, id: AssetId) -> Option<String> {
        let asset = self.assets.get(id)?;
        asset
            .locations
            .cdn_url
            .or(asset.locations.url)
            .or(asset.locations.local_url)
    }
}

/// Clears the result fields of a body while keeping the recorded inputs.
fn unresolved_body(body: &MessageBody) -> MessageBody {
    match body {
        MessageBody::Upscale { grid_index, .. } => MessageBody::Upscale {
            grid_index: *grid_index,
            upscaled_image_url: None,
        },
        MessageBody::Youtube {
            video_ref,
            audio_ref,
            subtitle_ref,
            ..
        } => MessageBody::Youtube {
            video_url: None,
            video_ref: *video_ref,
            audio_ref: *audio_ref,
            subtitle_ref: *subtitle_ref,
        },
        other => MessageBody::empty(other.kind()),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use medley_engine::{
        BoxFuture, PollOutcome, ProviderAdapter, ProviderError, ProviderPayload, ProviderResult,
        SubmitOutcome,
    };
    use medley_registry::MemoryUploadStore;
    use medley_timeline::Role;

    use super::*;

    struct StubAdapter {
        provider_id: &'static str,
        submits: Mutex<VecDeque<ProviderResult<SubmitOutcome>>>,
        polls: Mutex<VecDeque<ProviderResult<PollOutcome>>>,
    }

    impl StubAdapter {
        fn new(provider_id: &'static str) -> Self {
            Self {
                provider_id,
                submits: Mutex::new(VecDeque::new()),
                polls: Mutex::new(VecDeque::new()),
            }
        }

        fn with_submit(self, outcome: ProviderResult<SubmitOutcome>) -> Self {
            self.submits.lock().expect("test lock").push_back(outcome);
            self
        }

        fn with_poll(self, outcome: ProviderResult<PollOutcome>) -> Self {
            self.polls.lock().expect("test lock").push_back(outcome);
            self
        }
    }

    impl ProviderAdapter for StubAdapter {
        fn id(&self) -> &str {
            self.provider_id
        }

        fn submit<'a>(
            &'a self,
            _params: &'a JobParams,
        ) -> BoxFuture<'a, ProviderResult<SubmitOutcome>> {
            Box::pin(async move {
                self.submits
                    .lock()
                    .expect("test lock")
                    .pop_front()
                    .unwrap_or_else(|| {
                        Err(ProviderError::SubmitRejected {
                            stage: "stub-submit",
                            description: "submit script exhausted".to_string(),
                        })
                    })
            })
        }

        fn poll<'a>(&'a self, _task_id: &'a str) -> BoxFuture<'a, ProviderResult<PollOutcome>> {
            Box::pin(async move {
                self.polls
                    .lock()
                    .expect("test lock")
                    .pop_front()
                    .unwrap_or_else(|| Ok(PollOutcome::processing(0)))
            })
        }
    }

    fn ok_submit(task_id: &str) -> ProviderResult<SubmitOutcome> {
        Ok(SubmitOutcome {
            task_id: task_id.to_string(),
            raw: serde_json::json!({ "code": 1, "result": task_id }),
        })
    }

    fn grid_success(url: &str) -> ProviderResult<PollOutcome> {
        Ok(PollOutcome::succeeded(ProviderPayload {
            image_url: Some(url.to_string()),
            ..ProviderPayload::default()
        }))
    }

    fn test_settings() -> Arc<Settings> {
        let mut settings = Settings::default();
        settings.engine.submit_backoff_ms = 1;
        settings.engine.poll_interval_ms = 100;
        settings.gc.min_age_seconds = 0;
        Arc::new(settings)
    }

    fn workbench_with(adapter: StubAdapter, uploads: Arc<MemoryUploadStore>) -> Workbench {
        let settings = test_settings();
        let store = Arc::new(TimelineStore::new(settings.timeline.capacity));
        let engine = Arc::new(
            JobEngine::new(Arc::clone(&store), settings.engine.to_engine_policy())
                .with_adapter(Arc::new(adapter)),
        );
        Workbench::new(
            store,
            engine,
            Arc::new(ReferenceRegistry::new()),
            Arc::new(MediaAssetRegistry::new()),
            uploads,
            settings,
        )
    }

    fn memory_uploads() -> Arc<MemoryUploadStore> {
        Arc::new(MemoryUploadStore::new(
            "https://local.example",
            "https://cdn.example",
        ))
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..1_000 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("timed out waiting for condition");
    }

    #[tokio::test(start_paused = true)]
    async fn generate_appends_a_pair_and_drives_it_to_completion() {
        let adapter = StubAdapter::new("midjourney")
            .with_submit(ok_submit("T1"))
            .with_poll(grid_success("https://x/grid.png"));
        let workbench = workbench_with(adapter, memory_uploads());

        let ai_id = workbench.generate("a cat", Vec::new()).await;

        let snapshot = workbench.store().snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].role, Role::User);
        assert_eq!(snapshot[0].text, "a cat");
        assert_eq!(snapshot[1].id, ai_id);
        assert_eq!(snapshot[1].task_id.as_deref(), Some("T1"));
        assert_eq!(snapshot[1].parent_message_id, Some(snapshot[0].id));

        wait_until(|| {
            workbench
                .store()
                .get(ai_id)
                .is_some_and(|message| message.state() == MessageState::Completed)
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn upscale_requires_a_grid_with_a_task_id() {
        let adapter = StubAdapter::new("midjourney").with_submit(Err(
            ProviderError::SubmitRejected {
                stage: "stub-submit",
                description: "invalid prompt".to_string(),
            },
        ));
        let workbench = workbench_with(adapter, memory_uploads());

        // The grid submission fails, so the grid message never gets a task id.
        let grid_id = workbench.generate("a cat", Vec::new()).await;
        assert_eq!(workbench.upscale(grid_id, 1).await, None);
        assert_eq!(workbench.store().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_cancels_the_poller_and_sweeps_orphans() {
        let adapter = StubAdapter::new("midjourney").with_submit(ok_submit("T1"));
        let uploads = memory_uploads();
        let workbench = workbench_with(adapter, Arc::clone(&uploads));

        let orphan = uploads.upload(b"orphan", "orphan.png").await.expect("upload");

        let ingest = workbench.ingest_reference(b"ref-bytes".to_vec(), "ref.png");
        wait_until(|| {
            workbench
                .references()
                .get(ingest.id)
                .is_some_and(|entry| entry.locations.local_key.is_some())
        })
        .await;
        let kept_key = workbench
            .references()
            .get(ingest.id)
            .and_then(|entry| entry.locations.local_key)
            .expect("resolved key");

        let ai_id = workbench.generate("a cat", vec![ingest.id]).await;
        wait_until(|| workbench.engine().active_poller_count() == 1).await;

        assert!(workbench.delete(ai_id).await);
        assert_eq!(workbench.engine().active_poller_count(), 0);
        assert_eq!(workbench.store().len(), 1);

        // min_age is zero in the test settings, so only referenced keys survive.
        assert!(!uploads.contains(&orphan.local_key));
        assert!(uploads.contains(&kept_key));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_submit_creates_a_new_message_and_keeps_the_audit_trail() {
        let adapter = StubAdapter::new("midjourney")
            .with_submit(Err(ProviderError::SubmitRejected {
                stage: "stub-submit",
                description: "relay hiccup".to_string(),
            }))
            .with_submit(ok_submit("T2"))
            .with_poll(grid_success("https://x/grid.png"));
        let workbench = workbench_with(adapter, memory_uploads());

        let failed_id = workbench.generate("a cat", Vec::new()).await;
        wait_until(|| {
            workbench
                .store()
                .get(failed_id)
                .is_some_and(|message| message.state() == MessageState::Errored)
        })
        .await;

        let retry_id = workbench.retry_submit(failed_id).await.expect("retry launched");
        assert_ne!(retry_id, failed_id);

        wait_until(|| {
            workbench
                .store()
                .get(retry_id)
                .is_some_and(|message| message.state() == MessageState::Completed)
        })
        .await;

        let original = workbench.store().get(failed_id).expect("original remains");
        assert_eq!(original.state(), MessageState::Errored);
        assert_eq!(original.task_id, None);

        let retried = workbench.store().get(retry_id).expect("retry exists");
        assert_eq!(retried.parent_message_id, Some(failed_id));
        assert_eq!(retried.task_id.as_deref(), Some("T2"));
        assert_eq!(retried.text, "a cat");
        assert_eq!(workbench.store().len(), 3);
    }

    struct CountingSink {
        mounted: usize,
        released: usize,
    }

    impl RenderSink for CountingSink {
        type Handle = MessageId;

        fn mount(&mut self, message: &StreamMessage) -> Self::Handle {
            self.mounted += 1;
            message.id
        }

        fn patch(&mut self, _handle: &mut Self::Handle, _message: &StreamMessage) {}

        fn release(&mut self, _handle: Self::Handle) {
            self.released += 1;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hidden_messages_drop_out_of_the_reconciled_view() {
        let adapter = StubAdapter::new("midjourney").with_submit(ok_submit("T1"));
        let workbench = workbench_with(adapter, memory_uploads());
        let ai_id = workbench.generate("a cat", Vec::new()).await;

        let mut reconciler = Reconciler::new(CountingSink {
            mounted: 0,
            released: 0,
        });
        workbench.reconcile_into(&mut reconciler);
        assert_eq!(reconciler.rendered_len(), 2);

        assert!(workbench.hide(ai_id, true));
        workbench.reconcile_into(&mut reconciler);
        assert_eq!(reconciler.rendered_len(), 1);

        assert!(workbench.hide(ai_id, false));
        workbench.reconcile_into(&mut reconciler);
        assert_eq!(reconciler.rendered_len(), 2);

        workbench.engine().cancel("T1");
    }
}
