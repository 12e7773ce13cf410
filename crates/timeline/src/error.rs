use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TimelineError {
    #[snafu(display("timeline id '{raw}' is invalid for {id_type}"))]
    InvalidId {
        stage: &'static str,
        id_type: &'static str,
        raw: String,
        source: uuid::Error,
    },
    #[snafu(display("timeline message '{id}' was not found"))]
    UnknownMessage { stage: &'static str, id: String },
}

pub type TimelineResult<T> = Result<T, TimelineError>;
