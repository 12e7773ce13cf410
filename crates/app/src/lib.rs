/// Application settings loaded through figment and held behind arc-swap.
pub mod settings;
/// User actions wired onto the orchestration core.
pub mod workbench;

pub use settings::{Settings, SettingsError, SettingsStore};
pub use workbench::Workbench;
