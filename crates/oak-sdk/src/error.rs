use std::fmt;

/// Result type alias for tool-call operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the tool-call surface.
#[derive(Debug)]
pub enum Error {
    /// The requested id (observation, session) doesn't exist.
    NotFound(String),
    /// Arguments failed validation beyond what the MCP schema already caught.
    InvalidInput(String),
    Index(oak_index::Error),
    Vector(oak_vector::Error),
    Engine(oak_engine::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound(msg) => write!(f, "not found: {msg}"),
            Error::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Error::Index(err) => write!(f, "{err}"),
            Error::Vector(err) => write!(f, "{err}"),
            Error::Engine(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Index(err) => Some(err),
            Error::Vector(err) => Some(err),
            Error::Engine(err) => Some(err),
            _ => None,
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

impl From<oak_engine::Error> for Error {
    fn from(err: oak_engine::Error) -> Self {
        Error::Engine(err)
    }
}
