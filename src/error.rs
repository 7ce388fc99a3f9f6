use std::{error::Error, fmt, io};

use crate::{Key, array::Context};

/// The crate's result type.
pub type Result<T> = std::result::Result<T, KvError>;

/// Failures surfaced by the store, either synchronously from the call that
/// detected them or deferred until the caller waits on the affected array.
#[derive(Debug, Clone, PartialEq)]
pub enum KvError {
    /// The store has no devices bound yet.
    NotInitialized,
    /// Duplicate `init` of a key or duplicate device bind.
    AlreadyInitialized,
    UnknownKey {
        key: Key,
    },
    /// The updater can't change once any key holds data.
    UpdaterLocked,
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    UnboundDevice {
        context: Context,
    },
    /// The operation was dropped by `stop` before it could complete.
    Aborted {
        key: Key,
    },
    GroupFull {
        group_size: usize,
    },
    InvalidConfig(String),
    Engine(String),
}

impl KvError {
    /// Builds a `ShapeMismatch` for flat buffers of different lengths.
    pub fn length_mismatch(expected: usize, got: usize) -> Self {
        Self::ShapeMismatch {
            expected: vec![expected],
            got: vec![got],
        }
    }
}

impl fmt::Display for KvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KvError::NotInitialized => f.write_str("store not initialized, bind devices first"),
            KvError::AlreadyInitialized => f.write_str("already initialized"),
            KvError::UnknownKey { key } => write!(f, "unknown key {key}"),
            KvError::UpdaterLocked => {
                f.write_str("updater is locked, it must be set before any key is initialized")
            }
            KvError::ShapeMismatch { expected, got } => {
                write!(f, "shape mismatch: expected {expected:?}, got {got:?}")
            }
            KvError::UnboundDevice { context } => write!(f, "device {context} is not bound"),
            KvError::Aborted { key } => write!(f, "operation on key {key} aborted by stop"),
            KvError::GroupFull { group_size } => {
                write!(f, "group is full, all {group_size} ranks are taken")
            }
            KvError::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            KvError::Engine(msg) => write!(f, "engine error: {msg}"),
        }
    }
}

impl Error for KvError {}

/// Boundary conversion for binaries / I/O APIs.
impl From<KvError> for io::Error {
    fn from(value: KvError) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, value)
    }
}
