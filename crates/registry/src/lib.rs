pub mod error;
/// Keep-set derivation and the best-effort sweep entry point.
pub mod gc;
pub mod registry;
pub mod types;
pub mod upload;

pub use error::{RegistryError, RegistryResult};
pub use gc::{DEFAULT_GC_MIN_AGE, UPLOAD_KEY_PREFIX, collect_upload_keys, derive_keep_set, run_sweep};
pub use registry::{IngestOutcome, MediaAssetRegistry, ReferenceRegistry};
pub use types::{MediaAsset, MediaKind, ReferenceImage, ResolvedLocations};
pub use upload::{MemoryUploadStore, SweepReport, UploadOutcome, UploadStore};
