use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the batch processor, retrieval engine, and
/// suggestion engine.
#[derive(Debug)]
pub enum Error {
    Index(oak_index::Error),
    Vector(oak_vector::Error),
    Llm(oak_providers::Error),
    Json(serde_json::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Index(err) => write!(f, "relational store error: {err}"),
            Error::Vector(err) => write!(f, "vector store error: {err}"),
            Error::Llm(err) => write!(f, "llm error: {err}"),
            Error::Json(err) => write!(f, "json error: {err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Index(err) => Some(err),
            Error::Vector(err) => Some(err),
            Error::Llm(err) => Some(err),
            Error::Json(err) => Some(err),
        }
    }
}

impl From<oak_index::Error> for Error {
    fn from(err: oak_index::Error) -> Self {
        Error::Index(err)
    }
}

impl From<oak_vector::Error> for Error {
    fn from(err: oak_vector::Error) -> Self {
        Error::Vector(err)
    }
}

impl From<oak_providers::Error> for Error {
    fn from(err: oak_providers::Error) -> Self {
        Error::Llm(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}
