use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RegistryError {
    #[snafu(display("reference '{id}' was not found"))]
    UnknownReference { stage: &'static str, id: String },
    #[snafu(display("media asset '{id}' was not found"))]
    UnknownAsset { stage: &'static str, id: String },
    #[snafu(display("upload key '{local_key}' was not found"))]
    UnknownUploadKey {
        stage: &'static str,
        local_key: String,
    },
    #[snafu(display("upload of '{name}' failed: {details}"))]
    UploadFailed {
        stage: &'static str,
        name: String,
        details: String,
    },
}

pub type RegistryResult<T> = Result<T, RegistryError>;
