//! Hashing, identity, and filesystem conventions shared by every oak-ci
//! crate: where the daemon keeps its state on disk, and how it derives the
//! privacy-preserving machine id stamped on every row it writes.

mod identity;
mod path;

pub use identity::machine_id;
pub use path::{
    backup_dir, discover_project_root, expand_tilde, resolve_workspace_path, vector_store_dir,
};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Config(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::Config(msg) => write!(f, "Config error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Config(_) => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}
