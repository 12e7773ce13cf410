/// Midjourney-compatible relay adapter (grids and upscales).
pub mod midjourney;
/// Image-to-video gateway adapter (kling/runway/sora family).
pub mod video;

pub use midjourney::{MIDJOURNEY_PROVIDER_ID, MidjourneyGateway};
pub use video::{KLING_PROVIDER_ID, VideoGateway};

use std::time::Duration;

use snafu::ResultExt;

use crate::error::{HttpSnafu, ProviderResult};

/// Connection settings shared by the relay-gateway adapters.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub api_token: String,
    pub request_timeout: Duration,
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token: api_token.into().trim().to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub(crate) fn bearer(&self) -> String {
        format!("Bearer {}", self.api_token)
    }
}

pub(crate) fn build_http_client(config: &GatewayConfig) -> ProviderResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
        .context(HttpSnafu {
            stage: "build-http-client",
        })
}

/// Parses the gateway's percent-string progress (`"62%"`, occasionally a bare
/// `"62"`). Anything unparseable reads as no progress information.
pub(crate) fn parse_percent(raw: &str) -> Option<i64> {
    let trimmed = raw.trim().trim_end_matches('%').trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse().ok()
}
