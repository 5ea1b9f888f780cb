use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    IoError(io::Error),
    Decode(&'static str, io::Error),
    Encode(&'static str, io::Error),
    ChecksumMismatch { stored: u32, computed: u32 },
    AllocationFailure,
    // Bad user input; raised before any record is touched.
    Validation(String),
    // The backend could not produce a requested record.
    Retrieval(String),
    // A single journal action could not be applied.
    Apply { key: String, reason: String },
    Persist(String, io::Error),
    UserVarOverflow { key: String, needed: usize, available: usize },
    CorruptedUserVars(String),
    LockError(io::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn retrieval(msg: impl Into<String>) -> Self {
        Error::Retrieval(msg.into())
    }

    pub fn apply(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Apply {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::IoError(err)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::IoError(err) => write!(f, "I/O error: {}", err),
            Error::Decode(field, err) => write!(f, "Failed to decode {}: {}", field, err),
            Error::Encode(field, err) => write!(f, "Failed to encode {}: {}", field, err),
            Error::ChecksumMismatch { stored, computed } => write!(
                f,
                "Checksum mismatch: stored {:#010x}, computed {:#010x}",
                stored, computed
            ),
            Error::AllocationFailure => write!(f, "Out of memory"),
            Error::Validation(msg) => write!(f, "Invalid argument: {}", msg),
            Error::Retrieval(msg) => write!(f, "Failed to retrieve environment: {}", msg),
            Error::Apply { key, reason } => write!(f, "Cannot apply {}: {}", key, reason),
            Error::Persist(context, err) => {
                write!(f, "Error storing environment {}: {}", context, err)
            }
            Error::UserVarOverflow {
                key,
                needed,
                available,
            } => write!(
                f,
                "No space left for user variable {}: needs {} bytes, {} available",
                key, needed, available
            ),
            Error::CorruptedUserVars(msg) => write!(f, "Corrupted user variables: {}", msg),
            Error::LockError(err) => write!(f, "Lock error: {}", err),
        }
    }
}

impl std::error::Error for Error {}
