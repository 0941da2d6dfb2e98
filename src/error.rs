use std::fmt;

/// Failures at the crate boundary: notation parsing, JSON decoding and
/// worker-pool setup. Search outcomes ("no play", "timed out") are values,
/// never errors.
#[derive(Debug)]
pub enum Error {
    InvalidTile(String),
    InvalidMeld(String),
    InvalidConfig(String),
    Json(serde_json::Error),
    ThreadPool(rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidTile(msg) => write!(f, "invalid tile: {msg}"),
            Error::InvalidMeld(msg) => write!(f, "invalid meld: {msg}"),
            Error::InvalidConfig(msg) => write!(f, "invalid solver config: {msg}"),
            Error::Json(e) => write!(f, "json error: {e}"),
            Error::ThreadPool(e) => write!(f, "failed to build worker pool: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Json(e) => Some(e),
            Error::ThreadPool(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

impl From<rayon::ThreadPoolBuildError> for Error {
    fn from(e: rayon::ThreadPoolBuildError) -> Self {
        Error::ThreadPool(e)
    }
}
