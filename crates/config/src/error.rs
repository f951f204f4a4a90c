use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A source could not be read or didn't deserialize into [`Config`](crate::Config)
    #[display("could not load configuration: {_0}")]
    Load(figment::Error),
    /// Loaded fine, but the values don't make sense
    #[display("invalid configuration: {_0}")]
    Invalid(#[error(not(source))] String),
    /// No base path configured and no platform data directory to fall back to
    #[display("could not determine a default storage directory")]
    NoHomeDirectory,
}
impl From<figment::Error> for ErrorKind {
    fn from(err: figment::Error) -> Self {
        Self::Load(err)
    }
}
