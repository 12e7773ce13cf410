use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Format, Json, Serialized},
};
use medley_engine::{EnginePolicy, GatewayConfig, KLING_PROVIDER_ID, MIDJOURNEY_PROVIDER_ID};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub const SETTINGS_DIRECTORY_NAME: &str = "medley";
pub const SETTINGS_FILE_NAME: &str = "settings.json";

pub const DEFAULT_GATEWAY_BASE_URL: &str = "https://yunwu.ai";
pub const DEFAULT_VIDEO_MODEL: &str = "kling-v2-6";

/// Relay gateway connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewaySettings {
    #[serde(default = "default_gateway_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_token: String,
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            base_url: default_gateway_base_url(),
            api_token: String::new(),
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }
}

impl GatewaySettings {
    pub fn to_gateway_config(&self) -> GatewayConfig {
        GatewayConfig::new(&self.base_url, &self.api_token)
            .with_timeout(Duration::from_secs(self.request_timeout_seconds.max(1)))
    }

    pub fn is_configured(&self) -> bool {
        !self.api_token.trim().is_empty()
    }
}

/// Submission/polling pacing and retry bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_submit_attempts")]
    pub submit_attempts: u32,
    #[serde(default = "default_submit_backoff_ms")]
    pub submit_backoff_ms: u64,
    #[serde(default = "default_max_consecutive_poll_failures")]
    pub max_consecutive_poll_failures: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            submit_attempts: default_submit_attempts(),
            submit_backoff_ms: default_submit_backoff_ms(),
            max_consecutive_poll_failures: default_max_consecutive_poll_failures(),
        }
    }
}

impl EngineSettings {
    pub fn to_engine_policy(&self) -> EnginePolicy {
        EnginePolicy {
            submit_attempts: self.submit_attempts.max(1),
            submit_backoff: Duration::from_millis(self.submit_backoff_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(100)),
            max_consecutive_poll_failures: self.max_consecutive_poll_failures.max(1),
        }
    }
}

/// Which provider id serves each job kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRouting {
    #[serde(default = "default_image_provider")]
    pub image: String,
    #[serde(default = "default_pedit_provider")]
    pub pedit: String,
    #[serde(default = "default_video_provider")]
    pub video: String,
    #[serde(default = "default_deconstruct_provider")]
    pub deconstruct: String,
    #[serde(default = "default_suno_provider")]
    pub suno: String,
    #[serde(default = "default_youtube_provider")]
    pub youtube: String,
}

impl Default for ProviderRouting {
    fn default() -> Self {
        Self {
            image: default_image_provider(),
            pedit: default_pedit_provider(),
            video: default_video_provider(),
            deconstruct: default_deconstruct_provider(),
            suno: default_suno_provider(),
            youtube: default_youtube_provider(),
        }
    }
}

/// Defaults for video synthesis jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSettings {
    #[serde(default = "default_video_model")]
    pub default_model: String,
    #[serde(default = "default_video_duration_seconds")]
    pub default_duration_seconds: u32,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            default_model: default_video_model(),
            default_duration_seconds: default_video_duration_seconds(),
        }
    }
}

/// Orphaned-upload deletion policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcSettings {
    #[serde(default = "default_gc_min_age_seconds")]
    pub min_age_seconds: u64,
}

impl Default for GcSettings {
    fn default() -> Self {
        Self {
            min_age_seconds: default_gc_min_age_seconds(),
        }
    }
}

impl GcSettings {
    pub fn min_age(&self) -> Duration {
        Duration::from_secs(self.min_age_seconds)
    }
}

/// Local/CDN bases the upload store resolves keys against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_storage_local_base_url")]
    pub local_base_url: String,
    #[serde(default = "default_storage_cdn_base_url")]
    pub cdn_base_url: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            local_base_url: default_storage_local_base_url(),
            cdn_base_url: default_storage_cdn_base_url(),
        }
    }
}

/// Timeline log bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineSettings {
    #[serde(default = "default_timeline_capacity")]
    pub capacity: usize,
}

impl Default for TimelineSettings {
    fn default() -> Self {
        Self {
            capacity: default_timeline_capacity(),
        }
    }
}

/// Root application settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub gateway: GatewaySettings,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub providers: ProviderRouting,
    #[serde(default)]
    pub video: VideoSettings,
    #[serde(default)]
    pub gc: GcSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub timeline: TimelineSettings,
}

/// Hot-swappable settings holder; readers never block a reload.
pub struct SettingsStore {
    settings: Arc<ArcSwap<Settings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".medley"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_from_disk(&config_path);
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn settings(&self) -> Arc<Settings> {
        self.settings.load_full()
    }

    pub fn update(&self, settings: Settings) -> Result<(), SettingsError> {
        self.persist(&settings)?;
        self.settings.store(Arc::new(settings));
        Ok(())
    }

    fn load_from_disk(path: &PathBuf) -> Settings {
        if !path.exists() {
            tracing::info!("settings file not found at {:?}, using defaults", path);
            return Settings::default();
        }

        let figment = Figment::from(Serialized::defaults(Settings::default())).merge(Json::file(path));

        match figment.extract::<Settings>() {
            Ok(settings) => settings,
            Err(error) => {
                tracing::warn!(
                    "failed to parse settings from {:?}: {}. using defaults",
                    path,
                    error
                );
                Settings::default()
            }
        }
    }

    fn persist(&self, settings: &Settings) -> Result<(), SettingsError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-settings-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(settings).context(SerializeConfigSnafu {
            stage: "serialize-settings-json",
        })?;

        let temp_path = self.config_path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-settings-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.config_path).context(RenameTempFileSnafu {
            stage: "rename-temporary-settings-file",
            from: temp_path,
            to: self.config_path.clone(),
        })?;

        tracing::info!("saved settings to {:?}", self.config_path);
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to create settings directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings on `{stage}`: {source}"))]
    SerializeConfig {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write settings file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace settings file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

fn default_gateway_base_url() -> String {
    DEFAULT_GATEWAY_BASE_URL.to_string()
}

fn default_request_timeout_seconds() -> u64 {
    30
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_submit_attempts() -> u32 {
    3
}

fn default_submit_backoff_ms() -> u64 {
    1_000
}

fn default_max_consecutive_poll_failures() -> u32 {
    5
}

fn default_image_provider() -> String {
    MIDJOURNEY_PROVIDER_ID.to_string()
}

fn default_video_provider() -> String {
    KLING_PROVIDER_ID.to_string()
}

fn default_pedit_provider() -> String {
    "pedit".to_string()
}

fn default_deconstruct_provider() -> String {
    "vision".to_string()
}

fn default_suno_provider() -> String {
    "suno".to_string()
}

fn default_youtube_provider() -> String {
    "compose".to_string()
}

fn default_video_model() -> String {
    DEFAULT_VIDEO_MODEL.to_string()
}

fn default_video_duration_seconds() -> u32 {
    5
}

fn default_gc_min_age_seconds() -> u64 {
    86_400
}

fn default_storage_local_base_url() -> String {
    "http://127.0.0.1:8787".to_string()
}

fn default_storage_cdn_base_url() -> String {
    "http://127.0.0.1:8787/cdn".to_string()
}

fn default_timeline_capacity() -> usize {
    400
}
