use thiserror::Error;

/// The fixed numeric code set carried by the optional last-error channel
/// of the external interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidArg,
    Exists,
    NotFound,
    OutOfMemory,
    Io,
    Overflow,
    WrongState,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    #[error("{0} already exists")]
    Exists(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("out of memory: {0}")]
    OutOfMemory(String),

    #[error("file not found or could not be read: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration JSON: {0}")]
    Deserialization(#[from] serde_json::Error),

    #[error("{0} overflow")]
    Overflow(&'static str),

    #[error("wrong state: {0}")]
    WrongState(String),
}

impl Error {
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::InvalidArg(_) => ErrorCode::InvalidArg,
            Error::Exists(_) => ErrorCode::Exists,
            Error::NotFound(_) => ErrorCode::NotFound,
            Error::OutOfMemory(_) => ErrorCode::OutOfMemory,
            Error::Io(_) | Error::Deserialization(_) => ErrorCode::Io,
            Error::Overflow(_) => ErrorCode::Overflow,
            Error::WrongState(_) => ErrorCode::WrongState,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
