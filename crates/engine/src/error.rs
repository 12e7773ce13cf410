use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProviderError {
    #[snafu(display("no adapter is registered for provider '{provider_id}'"))]
    UnknownProvider {
        stage: &'static str,
        provider_id: String,
    },
    #[snafu(display("provider '{provider_id}' does not serve {kind} jobs"))]
    UnsupportedKind {
        stage: &'static str,
        provider_id: String,
        kind: &'static str,
    },
    #[snafu(display("http request failed on `{stage}`: {source}"))]
    Http {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("gateway returned status {status}: {body}"))]
    GatewayStatus {
        stage: &'static str,
        status: u16,
        body: String,
    },
    #[snafu(display("failed to parse gateway payload: {details}"))]
    ParsePayload {
        stage: &'static str,
        details: String,
    },
    #[snafu(display("submission rejected: {description}"))]
    SubmitRejected {
        stage: &'static str,
        description: String,
    },
    #[snafu(display("gateway signaled an error without a description"))]
    AmbiguousSubmit { stage: &'static str },
    #[snafu(display("gateway accepted the job but returned no task id"))]
    MissingTaskId { stage: &'static str },
}

impl ProviderError {
    /// True for the blank-description error shape some gateways return for
    /// actions that actually went through. Only this shape is retried.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::AmbiguousSubmit { .. })
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;
