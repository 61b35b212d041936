use std::fmt;

/// Result type for oak-runtime operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the daemon runtime: ingestor, scheduler,
/// sync orchestrator, and hook surface.
#[derive(Debug)]
pub enum Error {
    /// Relational store error
    Index(oak_index::Error),

    /// Vector store error
    Vector(oak_vector::Error),

    /// LLM/embedding provider error
    Provider(oak_providers::Error),

    /// Batch processor / retrieval / suggestion engine error
    Engine(oak_engine::Error),

    /// Filesystem/identity layer error
    Core(oak_core::Error),

    /// IO operation failed
    Io(std::io::Error),

    /// Configuration error
    Config(String),

    /// `set_session_parent` would have introduced a cycle in the parent
    /// chain; the mutation was rejected before touching the store.
    Cycle(String),

    /// Invalid operation or state
    InvalidOperation(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Index(err) => write!(f, "relational store error: {err}"),
            Error::Vector(err) => write!(f, "vector store error: {err}"),
            Error::Provider(err) => write!(f, "provider error: {err}"),
            Error::Engine(err) => write!(f, "engine error: {err}"),
            Error::Core(err) => write!(f, "core error: {err}"),
            Error::Io(err) => write!(f, "IO error: {err}"),
            Error::Config(msg) => write!(f, "configuration error: {msg}"),
            Error::Cycle(msg) => write!(f, "would create a session-parent cycle: {msg}"),
            Error::InvalidOperation(msg) => write!(f, "invalid operation: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Index(err) => Some(err),
            Error::Vector(err) => Some(err),
            Error::Provider(err) => Some(err),
            Error::Engine(err) => Some(err),
            Error::Core(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::Config(_) | Error::Cycle(_) | Error::InvalidOperation(_) => None,
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
        Error::Provider(err)
    }
}

impl From<oak_engine::Error> for Error {
    fn from(err: oak_engine::Error) -> Self {
        Error::Engine(err)
    }
}

impl From<oak_core::Error> for Error {
    fn from(err: oak_core::Error) -> Self {
        Error::Core(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Config(err.to_string())
    }
}
