use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use uuid::Uuid;

use crate::error::{RegistryResult, UnknownUploadKeySnafu};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result of persisting one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub local_key: String,
    pub local_url: String,
    pub url: Option<String>,
    pub cdn_url: Option<String>,
}

/// Result of one GC pass over the upload store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted_keys: Vec<String>,
}

/// Binary storage collaborator behind the registry.
///
/// `delete` is idempotent. `sweep` must only delete keys that are both absent
/// from `keep` and older than `min_age`; the age gate protects uploads whose
/// referencing state has not been observed yet.
pub trait UploadStore: Send + Sync {
    fn upload<'a>(
        &'a self,
        bytes: &'a [u8],
        name: &'a str,
    ) -> BoxFuture<'a, RegistryResult<UploadOutcome>>;
    fn promote<'a>(&'a self, local_key: &'a str) -> BoxFuture<'a, RegistryResult<String>>;
    fn delete<'a>(&'a self, local_key: &'a str) -> BoxFuture<'a, RegistryResult<()>>;
    fn sweep<'a>(
        &'a self,
        min_age: Duration,
        keep: &'a HashSet<String>,
    ) -> BoxFuture<'a, RegistryResult<SweepReport>>;
}

struct StoredUpload {
    stored_at: SystemTime,
}

/// In-process upload store used by tests and local development.
pub struct MemoryUploadStore {
    base_url: String,
    cdn_base_url: String,
    inner: Mutex<HashMap<String, StoredUpload>>,
}

impl MemoryUploadStore {
    pub fn new(base_url: impl Into<String>, cdn_base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cdn_base_url: cdn_base_url.into().trim_end_matches('/').to_string(),
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub fn key_count(&self) -> usize {
        self.lock_inner().len()
    }

    pub fn contains(&self, local_key: &str) -> bool {
        self.lock_inner().contains_key(local_key)
    }

    /// Rewrites a key's stored-at time, for grace-period tests.
    pub(crate) fn backdate(&self, local_key: &str, age: Duration) {
        if let Some(entry) = self.lock_inner().get_mut(local_key) {
            entry.stored_at = SystemTime::now() - age;
        }
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, HashMap<String, StoredUpload>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl UploadStore for MemoryUploadStore {
    fn upload<'a>(
        &'a self,
        bytes: &'a [u8],
        name: &'a str,
    ) -> BoxFuture<'a, RegistryResult<UploadOutcome>> {
        Box::pin(async move {
            let local_key = format!("uploads/{}-{}", Uuid::now_v7(), sanitize_key_segment(name));
            tracing::debug!(local_key = %local_key, size_bytes = bytes.len(), "stored upload");
            self.lock_inner().insert(
                local_key.clone(),
                StoredUpload {
                    stored_at: SystemTime::now(),
                },
            );

            Ok(UploadOutcome {
                local_url: format!("{}/{local_key}", self.base_url),
                url: Some(format!("{}/{local_key}", self.base_url)),
                cdn_url: None,
                local_key,
            })
        })
    }

    fn promote<'a>(&'a self, local_key: &'a str) -> BoxFuture<'a, RegistryResult<String>> {
        Box::pin(async move {
            if !self.contains(local_key) {
                return UnknownUploadKeySnafu {
                    stage: "promote",
                    local_key: local_key.to_string(),
                }
                .fail();
            }
            Ok(format!("{}/{local_key}", self.cdn_base_url))
        })
    }

    fn delete<'a>(&'a self, local_key: &'a str) -> BoxFuture<'a, RegistryResult<()>> {
        Box::pin(async move {
            // Deleting an absent key is not an error.
            self.lock_inner().remove(local_key);
            Ok(())
        })
    }

    fn sweep<'a>(
        &'a self,
        min_age: Duration,
        keep: &'a HashSet<String>,
    ) -> BoxFuture<'a, RegistryResult<SweepReport>> {
        Box::pin(async move {
            let now = SystemTime::now();
            let mut inner = self.lock_inner();
            let mut deleted_keys = Vec::new();

            inner.retain(|key, entry| {
                if keep.contains(key) {
                    return true;
                }
                let old_enough = now
                    .duration_since(entry.stored_at)
                    .is_ok_and(|age| age >= min_age);
                if old_enough {
                    deleted_keys.push(key.clone());
                    false
                } else {
                    true
                }
            });

            deleted_keys.sort();
            Ok(SweepReport { deleted_keys })
        })
    }
}

/// Keys stay within `[A-Za-z0-9._-]` so embedded keys can be recovered from
/// free text by the keep-set scanner.
fn sanitize_key_segment(name: &str) -> String {
    let mut sanitized = String::with_capacity(name.len());
    for character in name.chars() {
        if character.is_ascii_alphanumeric() || matches!(character, '.' | '_' | '-') {
            sanitized.push(character);
        } else {
            sanitized.push('-');
        }
    }
    if sanitized.is_empty() {
        sanitized.push_str("upload");
    }
    sanitized
}
