use std::sync::Arc;

use medley::settings::SettingsStore;
use medley::workbench::Workbench;
use medley_registry::MemoryUploadStore;

/// Application entry point.
///
/// Bootstraps tracing, loads settings, and wires the orchestration core with
/// the relay gateway adapters. The interactive surface and the HTTP routing
/// layer live outside this crate; embedders drive the workbench directly.
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let settings_store = SettingsStore::load();
    let settings = settings_store.settings();

    if !settings.gateway.is_configured() {
        tracing::warn!("no gateway api token configured; submissions will be rejected upstream");
    }

    let uploads = Arc::new(MemoryUploadStore::new(
        &settings.storage.local_base_url,
        &settings.storage.cdn_base_url,
    ));

    let workbench = match Workbench::from_settings(Arc::clone(&settings), uploads) {
        Ok(workbench) => workbench,
        Err(error) => {
            tracing::error!(error = %error, "failed to build the orchestration core");
            std::process::exit(1);
        }
    };

    // Startup GC pass, mirroring the cleanup the original service ran on boot.
    let deleted = workbench.collect_garbage().await;

    tracing::info!(
        image_provider = %settings.providers.image,
        video_provider = %settings.providers.video,
        timeline_capacity = settings.timeline.capacity,
        gc_deleted = deleted.len(),
        "medley core ready"
    );
}
