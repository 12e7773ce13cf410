use std::fmt;

use snafu::ResultExt;
use uuid::Uuid;

use super::error::{InvalidIdSnafu, TimelineResult};

// One macro so every id shares the uuid-v7 representation and the same
// string round trip at the boundary (Display out, parse back in).
macro_rules! timeline_id {
    ($(#[$doc:meta])* $name:ident, $id_type:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(Uuid);

        impl $name {
            /// Mints a fresh time-ordered id.
            pub fn new_v7() -> Self {
                Self(Uuid::now_v7())
            }

            /// Parses an id previously rendered with `Display`.
            pub fn parse(raw: &str) -> TimelineResult<Self> {
                let parsed = Uuid::parse_str(raw).context(InvalidIdSnafu {
                    stage: "parse-timeline-id",
                    id_type: $id_type,
                    raw: raw.to_string(),
                })?;
                Ok(Self(parsed))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(formatter, "{}", self.0)
            }
        }
    };
}

timeline_id!(
    /// Identifies one timeline entry.
    MessageId,
    "message-id"
);
timeline_id!(
    /// Identifies one reference image in the registry.
    ReferenceId,
    "reference-id"
);
timeline_id!(
    /// Identifies one video/audio/subtitle asset.
    AssetId,
    "asset-id"
);
