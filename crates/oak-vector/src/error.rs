use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors from the vector store layer.
#[derive(Debug)]
pub enum Error {
    /// The underlying HNSW index rejected an operation.
    Index(String),

    /// Reading or writing a collection's on-disk files failed.
    Io(std::io::Error),

    /// The sidecar metadata file couldn't be parsed.
    Metadata(serde_json::Error),

    /// No embedding provider was able to produce a vector.
    Embedding(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Index(msg) => write!(f, "vector index error: {msg}"),
            Error::Io(err) => write!(f, "IO error: {err}"),
            Error::Metadata(err) => write!(f, "metadata error: {err}"),
            Error::Embedding(msg) => write!(f, "embedding error: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Metadata(err) => Some(err),
            Error::Index(_) | Error::Embedding(_) => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Metadata(err)
    }
}

impl From<oak_providers::Error> for Error {
    fn from(err: oak_providers::Error) -> Self {
        Error::Embedding(err.to_string())
    }
}
