use thiserror::Error;

use crate::channel::{FrameError, HandshakeError};
use crate::fmi2::Fmi2BackendError;
use crate::fmi3::Fmi3BackendError;
use crate::snapshot::SnapshotError;

/// Crate-level convenience error.
///
/// A thin wrapper over the capability errors; each variant keeps its own
/// taxonomy and display.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Fmi2Backend(#[from] Fmi2BackendError),

    #[error(transparent)]
    Fmi3Backend(#[from] Fmi3BackendError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this failure corrupts the whole process (no reply may be
    /// sent, the backend must exit non-zero).
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Frame(_) | Error::Handshake(_) | Error::Io(_) => true,
            Error::Fmi2Backend(e) => e.is_fatal(),
            Error::Fmi3Backend(e) => e.is_fatal(),
            Error::Snapshot(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatality_per_variant() {
        let frame: Error = FrameError::Closed.into();
        assert!(frame.is_fatal());
        let io: Error = std::io::Error::from(std::io::ErrorKind::BrokenPipe).into();
        assert!(io.is_fatal());
        let snapshot: Error = SnapshotError::TrailingBytes(3).into();
        assert!(!snapshot.is_fatal());
        let backend: Error = Fmi2BackendError::AlreadyInstantiated.into();
        assert!(backend.is_fatal());
    }
}
