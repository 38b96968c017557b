use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

/// Which stage of a command failed. The cause tree holds the details.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("configuration error")]
    Config,
    #[display("scan failed")]
    Scan,
    #[display("upload failed")]
    Upload,
    #[display("could not read {_0}")]
    Input(#[error(not(source))] String),
    #[display("background task failed")]
    Task,
}
