use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use medley_timeline::{AssetId, ReferenceId};
use sha2::{Digest, Sha256};

use crate::error::{RegistryResult, UnknownAssetSnafu, UnknownReferenceSnafu};
use crate::types::{MediaAsset, MediaKind, ReferenceImage, ResolvedLocations};
use crate::upload::UploadStore;

/// Outcome of ingesting bytes: the entry id plus whether it already existed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
    pub id: ReferenceId,
    pub existing: bool,
}

struct ReferenceInner {
    by_origin_key: HashMap<String, ReferenceId>,
    entries: HashMap<ReferenceId, ReferenceImage>,
    order: Vec<ReferenceId>,
}

/// Content-hash-deduplicated registry of reference images.
///
/// Ingest is synchronous and always leaves a renderable entry behind; remote
/// resolution happens afterwards and patches the entry in place.
pub struct ReferenceRegistry {
    inner: Mutex<ReferenceInner>,
}

impl Default for ReferenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ReferenceInner {
                by_origin_key: HashMap::new(),
                entries: HashMap::new(),
                order: Vec::new(),
            }),
        }
    }

    /// Registers image bytes. Identical bytes resolve to the existing entry;
    /// the registry never grows a duplicate for re-uploaded content.
    pub fn ingest(&self, bytes: &[u8], name: impl Into<String>) -> IngestOutcome {
        let origin_key = origin_key_for(bytes);
        let mut inner = self.lock_inner();

        if let Some(id) = inner.by_origin_key.get(&origin_key) {
            return IngestOutcome {
                id: *id,
                existing: true,
            };
        }

        let id = ReferenceId::new_v7();
        let name = name.into();
        let entry = ReferenceImage {
            id,
            data_url: data_url_for(bytes, &name),
            name,
            created_at_unix_millis: current_unix_timestamp_millis(),
            origin_key: origin_key.clone(),
            locations: ResolvedLocations::default(),
        };

        inner.by_origin_key.insert(origin_key, id);
        inner.entries.insert(id, entry);
        inner.order.push(id);

        IngestOutcome {
            id,
            existing: false,
        }
    }

    /// Persists the bytes through the upload store and patches the entry with
    /// the resolved locations. Failure is non-fatal: the locally cached data
    /// URL keeps the entry usable.
    pub async fn resolve_remote(
        &self,
        uploads: &dyn UploadStore,
        id: ReferenceId,
        bytes: &[u8],
        name: &str,
    ) {
        match uploads.upload(bytes, name).await {
            Ok(outcome) => {
                let cdn_url = match outcome.cdn_url {
                    Some(url) => Some(url),
                    None => match uploads.promote(&outcome.local_key).await {
                        Ok(url) => Some(url),
                        Err(error) => {
                            tracing::debug!(
                                reference_id = %id,
                                error = %error,
                                "cdn promotion unavailable, serving the local url"
                            );
                            None
                        }
                    },
                };
                let locations = ResolvedLocations {
                    url: outcome.url,
                    cdn_url,
                    local_url: Some(outcome.local_url),
                    local_key: Some(outcome.local_key),
                };
                if let Err(error) = self.patch_locations(id, locations) {
                    tracing::debug!(reference_id = %id, error = %error, "resolved an already-removed reference");
                }
            }
            Err(error) => {
                tracing::warn!(
                    reference_id = %id,
                    error = %error,
                    "upload resolution failed; keeping the local representation"
                );
            }
        }
    }

    pub fn patch_locations(
        &self,
        id: ReferenceId,
        locations: ResolvedLocations,
    ) -> RegistryResult<()> {
        let mut inner = self.lock_inner();
        let Some(entry) = inner.entries.get_mut(&id) else {
            return UnknownReferenceSnafu {
                stage: "patch-reference-locations",
                id: id.to_string(),
            }
            .fail();
        };
        entry.locations = locations;
        Ok(())
    }

    pub fn get(&self, id: ReferenceId) -> Option<ReferenceImage> {
        self.lock_inner().entries.get(&id).cloned()
    }

    pub fn lookup_by_origin(&self, origin_key: &str) -> Option<ReferenceId> {
        self.lock_inner().by_origin_key.get(origin_key).copied()
    }

    /// All entries in ingest order.
    pub fn entries(&self) -> Vec<ReferenceImage> {
        let inner = self.lock_inner();
        inner
            .order
            .iter()
            .filter_map(|id| inner.entries.get(id).cloned())
            .collect()
    }

    pub fn remove(&self, id: ReferenceId) -> bool {
        let mut inner = self.lock_inner();
        let Some(entry) = inner.entries.remove(&id) else {
            return false;
        };
        inner.by_origin_key.remove(&entry.origin_key);
        inner.order.retain(|candidate| *candidate != id);
        true
    }

    pub fn len(&self) -> usize {
        self.lock_inner().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_inner().entries.is_empty()
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, ReferenceInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct AssetInner {
    entries: HashMap<AssetId, MediaAsset>,
    order: Vec<AssetId>,
}

/// Registry of video/audio/subtitle assets.
pub struct MediaAssetRegistry {
    inner: Mutex<AssetInner>,
}

impl Default for MediaAssetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaAssetRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(AssetInner {
                entries: HashMap::new(),
                order: Vec::new(),
            }),
        }
    }

    pub fn insert(
        &self,
        kind: MediaKind,
        name: impl Into<String>,
        subtitle_text: Option<String>,
    ) -> AssetId {
        let id = AssetId::new_v7();
        let asset = MediaAsset {
            id,
            kind,
            name: name.into(),
            created_at_unix_millis: current_unix_timestamp_millis(),
            locations: ResolvedLocations::default(),
            subtitle_text,
        };

        let mut inner = self.lock_inner();
        inner.entries.insert(id, asset);
        inner.order.push(id);
        id
    }

    pub fn patch_locations(&self, id: AssetId, locations: ResolvedLocations) -> RegistryResult<()> {
        let mut inner = self.lock_inner();
        let Some(asset) = inner.entries.get_mut(&id) else {
            return UnknownAssetSnafu {
                stage: "patch-asset-locations",
                id: id.to_string(),
            }
            .fail();
        };
        asset.locations = locations;
        Ok(())
    }

    pub fn get(&self, id: AssetId) -> Option<MediaAsset> {
        self.lock_inner().entries.get(&id).cloned()
    }

    pub fn entries(&self) -> Vec<MediaAsset> {
        let inner = self.lock_inner();
        inner
            .order
            .iter()
            .filter_map(|id| inner.entries.get(id).cloned())
            .collect()
    }

    pub fn remove(&self, id: AssetId) -> bool {
        let mut inner = self.lock_inner();
        if inner.entries.remove(&id).is_none() {
            return false;
        }
        inner.order.retain(|candidate| *candidate != id);
        true
    }

    pub fn len(&self) -> usize {
        self.lock_inner().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_inner().entries.is_empty()
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, AssetInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn origin_key_for(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn data_url_for(bytes: &[u8], name: &str) -> String {
    format!("data:{};base64,{}", mime_for(name), BASE64_STANDARD.encode(bytes))
}

fn mime_for(name: &str) -> &'static str {
    match name.rsplit('.').next().map(str::to_ascii_lowercase).as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/png",
    }
}

fn current_unix_timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use crate::error::{RegistryError, RegistryResult};
    use crate::upload::{BoxFuture, MemoryUploadStore, SweepReport, UploadOutcome};

    use super::*;

    #[test]
    fn identical_bytes_resolve_to_the_existing_entry() {
        let registry = ReferenceRegistry::new();

        let first = registry.ingest(b"image-bytes", "cat.png");
        let second = registry.ingest(b"image-bytes", "cat-again.png");

        assert!(!first.existing);
        assert!(second.existing);
        assert_eq!(first.id, second.id);
        assert_eq!(registry.len(), 1);

        let third = registry.ingest(b"other-bytes", "dog.png");
        assert_ne!(third.id, first.id);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn ingest_fills_a_renderable_local_representation() {
        let registry = ReferenceRegistry::new();
        let outcome = registry.ingest(b"image-bytes", "cat.jpg");

        let entry = registry.get(outcome.id).expect("entry exists");
        assert!(entry.data_url.starts_with("data:image/jpeg;base64,"));
        assert_eq!(entry.locations, ResolvedLocations::default());
        assert_eq!(registry.lookup_by_origin(&entry.origin_key), Some(outcome.id));
    }

    #[tokio::test]
    async fn remote_resolution_patches_the_entry_in_place() {
        let registry = ReferenceRegistry::new();
        let uploads = MemoryUploadStore::new("https://local.example", "https://cdn.example");

        let outcome = registry.ingest(b"image-bytes", "cat.png");
        registry
            .resolve_remote(&uploads, outcome.id, b"image-bytes", "cat.png")
            .await;

        let entry = registry.get(outcome.id).expect("entry exists");
        assert!(entry.locations.local_key.as_deref().is_some_and(|key| key.starts_with("uploads/")));
        assert!(entry.locations.local_url.is_some());
        // The memory store leaves cdn_url empty at upload, so resolution
        // promotes the key.
        assert!(
            entry
                .locations
                .cdn_url
                .as_deref()
                .is_some_and(|url| url.starts_with("https://cdn.example/uploads/"))
        );
    }

    struct FailingUploadStore;

    impl crate::upload::UploadStore for FailingUploadStore {
        fn upload<'a>(
            &'a self,
            _bytes: &'a [u8],
            name: &'a str,
        ) -> BoxFuture<'a, RegistryResult<UploadOutcome>> {
            Box::pin(async move {
                Err(RegistryError::UploadFailed {
                    stage: "failing-upload",
                    name: name.to_string(),
                    details: "storage offline".to_string(),
                })
            })
        }

        fn promote<'a>(&'a self, local_key: &'a str) -> BoxFuture<'a, RegistryResult<String>> {
            Box::pin(async move {
                Err(RegistryError::UnknownUploadKey {
                    stage: "failing-promote",
                    local_key: local_key.to_string(),
                })
            })
        }

        fn delete<'a>(&'a self, _local_key: &'a str) -> BoxFuture<'a, RegistryResult<()>> {
            Box::pin(async move { Ok(()) })
        }

        fn sweep<'a>(
            &'a self,
            _min_age: Duration,
            _keep: &'a HashSet<String>,
        ) -> BoxFuture<'a, RegistryResult<SweepReport>> {
            Box::pin(async move { Ok(SweepReport::default()) })
        }
    }

    #[tokio::test]
    async fn failed_resolution_keeps_the_entry_usable() {
        let registry = ReferenceRegistry::new();
        let outcome = registry.ingest(b"image-bytes", "cat.png");

        registry
            .resolve_remote(&FailingUploadStore, outcome.id, b"image-bytes", "cat.png")
            .await;

        let entry = registry.get(outcome.id).expect("entry still exists");
        assert!(entry.data_url.starts_with("data:"));
        assert_eq!(entry.locations, ResolvedLocations::default());
    }

    #[test]
    fn removal_also_clears_the_origin_index() {
        let registry = ReferenceRegistry::new();
        let outcome = registry.ingest(b"image-bytes", "cat.png");
        let entry = registry.get(outcome.id).expect("entry exists");

        assert!(registry.remove(outcome.id));
        assert_eq!(registry.lookup_by_origin(&entry.origin_key), None);

        // Re-ingesting the same bytes now creates a fresh entry.
        let replacement = registry.ingest(b"image-bytes", "cat.png");
        assert!(!replacement.existing);
        assert_ne!(replacement.id, outcome.id);
    }

    #[test]
    fn media_assets_round_trip_through_the_registry() {
        let assets = MediaAssetRegistry::new();
        let id = assets.insert(MediaKind::Subtitle, "lyrics.srt", Some("1\n00:00 --> 00:05\nhello".to_string()));

        let asset = assets.get(id).expect("asset exists");
        assert_eq!(asset.kind, MediaKind::Subtitle);
        assert!(asset.subtitle_text.is_some());

        assets
            .patch_locations(
                id,
                ResolvedLocations {
                    local_key: Some("uploads/abc-lyrics.srt".to_string()),
                    ..ResolvedLocations::default()
                },
            )
            .expect("asset exists");
        assert_eq!(assets.entries().len(), 1);

        assert!(assets.remove(id));
        assert!(assets.is_empty());
    }
}
