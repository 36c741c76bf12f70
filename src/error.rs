use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by explicit operations. Transient sync failures are
/// never reported through this type; they only flip the connected flag.
#[derive(Debug, Error)]
pub enum Error {
    /// A backup document could not be decoded at all.
    #[error("backup decode failed: {0}")]
    Codec(String),

    /// Local persistence could not be opened.
    #[error("storage error: {0}")]
    Storage(String),

    /// An explicit remote operation failed.
    #[error("remote store error: {0}")]
    Remote(String),

    /// A mutation was given input its preconditions reject.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}
