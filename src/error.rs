use thiserror::Error;

/// Every failure mode the core surfaces, matching the kind codes a caller
/// maps back onto host OS conventions at the boundary.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("database file already exists")]
    AlreadyExists,

    #[error("key already exists")]
    Duplicate,

    #[error("key not found")]
    NotFound,

    #[error("value does not fit in a single block")]
    TooBig,

    #[error("destination buffer too small: need {needed}, have {available}")]
    DestinationTooSmall { needed: usize, available: usize },

    #[error("out of space")]
    OutOfSpace,

    #[error("database file is corrupted: {0}")]
    Corruption(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = core::result::Result<T, Error>;
