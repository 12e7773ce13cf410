use medley_timeline::{AssetId, ReferenceId};

/// Remote locations an upload resolves to as persistence catches up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedLocations {
    pub url: Option<String>,
    pub cdn_url: Option<String>,
    pub local_url: Option<String>,
    pub local_key: Option<String>,
}

impl ResolvedLocations {
    /// Every URL-bearing field, for keep-set scans.
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        [&self.url, &self.cdn_url, &self.local_url]
            .into_iter()
            .flatten()
            .map(String::as_str)
    }
}

/// A user-supplied or generated image, deduplicated by content hash.
///
/// The data URL is filled from local bytes at creation so the entry is
/// renderable before any network round trip completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceImage {
    pub id: ReferenceId,
    pub name: String,
    pub created_at_unix_millis: u64,
    pub origin_key: String,
    pub data_url: String,
    pub locations: ResolvedLocations,
}

/// Media asset class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Audio,
    Subtitle,
}

/// A video, audio, or subtitle asset attached to the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAsset {
    pub id: AssetId,
    pub kind: MediaKind,
    pub name: String,
    pub created_at_unix_millis: u64,
    pub locations: ResolvedLocations,
    pub subtitle_text: Option<String>,
}
