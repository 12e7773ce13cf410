/// Provider adapter contract and wire-agnostic job types.
pub mod adapter;
pub mod engine;
pub mod error;
pub mod policy;
pub mod providers;

pub use adapter::{
    BoxFuture, JobParams, JobStatus, PollOutcome, ProviderAdapter, ProviderPayload, SubmitOutcome,
};
pub use engine::JobEngine;
pub use error::{ProviderError, ProviderResult};
pub use policy::EnginePolicy;
pub use providers::{
    GatewayConfig, KLING_PROVIDER_ID, MIDJOURNEY_PROVIDER_ID, MidjourneyGateway, VideoGateway,
};
