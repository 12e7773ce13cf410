use std::collections::HashSet;
use std::time::Duration;

use medley_timeline::{MessageBody, StreamMessage};

use crate::types::{MediaAsset, ReferenceImage};
use crate::upload::UploadStore;

/// Upload keys share this prefix, which is what the free-text scanner anchors on.
pub const UPLOAD_KEY_PREFIX: &str = "uploads/";

/// Default deletion grace period: one day.
pub const DEFAULT_GC_MIN_AGE: Duration = Duration::from_secs(86_400);

/// Derives the set of asset keys still reachable from application state.
///
/// The set is deliberately a superset of what is provably live: ids count as
/// keys, and any `uploads/...` token found in text or URLs is kept. A false
/// positive costs storage; a false negative loses user data.
pub fn derive_keep_set(
    messages: &[StreamMessage],
    references: &[ReferenceImage],
    assets: &[MediaAsset],
) -> HashSet<String> {
    let mut keep = HashSet::new();

    for message in messages {
        collect_upload_keys(&message.text, &mut keep);
        if let Some(error) = &message.error {
            collect_upload_keys(error, &mut keep);
        }
        for url in message.body.media_urls() {
            collect_upload_keys(url, &mut keep);
        }
        for ref_id in &message.ref_ids {
            keep.insert(ref_id.to_string());
        }
        if let MessageBody::Youtube {
            video_ref,
            audio_ref,
            subtitle_ref,
            ..
        } = &message.body
        {
            for asset_id in [video_ref, audio_ref, subtitle_ref].into_iter().flatten() {
                keep.insert(asset_id.to_string());
            }
        }
    }

    for reference in references {
        keep.insert(reference.id.to_string());
        if let Some(local_key) = &reference.locations.local_key {
            keep.insert(local_key.clone());
        }
        for url in reference.locations.urls() {
            collect_upload_keys(url, &mut keep);
        }
    }

    for asset in assets {
        keep.insert(asset.id.to_string());
        if let Some(local_key) = &asset.locations.local_key {
            keep.insert(local_key.clone());
        }
        for url in asset.locations.urls() {
            collect_upload_keys(url, &mut keep);
        }
        if let Some(subtitle_text) = &asset.subtitle_text {
            collect_upload_keys(subtitle_text, &mut keep);
        }
    }

    keep
}

/// Scans free text for embedded `uploads/...` keys.
pub fn collect_upload_keys(text: &str, keep: &mut HashSet<String>) {
    let mut cursor = text;

    while let Some(start) = cursor.find(UPLOAD_KEY_PREFIX) {
        let tail = &cursor[start + UPLOAD_KEY_PREFIX.len()..];
        let end = tail
            .find(|character: char| {
                !(character.is_ascii_alphanumeric() || matches!(character, '.' | '_' | '-'))
            })
            .unwrap_or(tail.len());

        if end > 0 {
            keep.insert(format!("{UPLOAD_KEY_PREFIX}{}", &tail[..end]));
        }
        cursor = &tail[end..];
    }
}

/// Runs one best-effort GC pass. Sweep failures are logged and swallowed:
/// a surviving orphan is storage overhead, never a user-facing fault.
pub async fn run_sweep(
    uploads: &dyn UploadStore,
    min_age: Duration,
    keep: &HashSet<String>,
) -> Vec<String> {
    match uploads.sweep(min_age, keep).await {
        Ok(report) => {
            if !report.deleted_keys.is_empty() {
                tracing::info!(deleted = report.deleted_keys.len(), "gc sweep deleted orphaned uploads");
            }
            report.deleted_keys
        }
        Err(error) => {
            tracing::warn!(error = %error, "gc sweep failed; orphans remain until the next pass");
            Vec::new()
        }
    }
}
