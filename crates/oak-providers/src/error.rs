use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// All providers in the chain failed; carries the last one's message.
    ChainExhausted(String),
    /// A single provider call failed (network, 4xx/5xx, timeout).
    Request(String),
    /// The provider returned a response that couldn't be parsed into the
    /// expected shape, even after fallback extraction.
    Malformed(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ChainExhausted(msg) => write!(f, "all providers failed: {msg}"),
            Error::Request(msg) => write!(f, "provider request failed: {msg}"),
            Error::Malformed(msg) => write!(f, "provider response malformed: {msg}"),
        }
    }
}

impl std::error::Error for Error {}
