use std::sync::Arc;

use thiserror::Error;

use crate::schema::SchemaError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone)]
pub enum Error {
    /// The event does not match the DHIS2 event schema. This usually means a value source in the
    /// form configuration is broken and an administrator needs to fix it.
    #[error("event does not match DHIS2 event schema")]
    Configuration(#[source] SchemaError),
    #[error("error parsing form configuration")]
    ConfigParse(#[source] Arc<serde_json::Error>),
    #[error("invalid server_url configuration")]
    InvalidBaseUrl(#[source] url::ParseError),
    #[error("unauthorized, username or password is likely invalid")]
    Unauthorized,
    #[error("DHIS2 server responded with {status}")]
    Http { status: u16, body: String },
    #[error(transparent)]
    Network(Arc<reqwest::Error>),
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    #[error(transparent)]
    Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Network(Arc::new(value.without_url()))
    }
}

impl From<SchemaError> for Error {
    fn from(value: SchemaError) -> Self {
        Error::Configuration(value)
    }
}
