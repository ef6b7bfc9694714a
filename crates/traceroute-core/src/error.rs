//! Error types for traceroute operations.

use thiserror::Error;

/// Main error type for traceroute operations.
#[derive(Error, Debug)]
pub enum TracerouteError {
    // Socket/IO errors
    #[error("Failed to create socket: {0}")]
    SocketCreation(#[source] std::io::Error),

    #[error("Failed to set read deadline: {0}")]
    SetDeadline(#[source] std::io::Error),

    #[error("Read timeout exceeded")]
    ReadTimeout,

    #[error("Read failed: {0}")]
    ReadFailed(#[source] std::io::Error),

    #[error("Write failed: {0}")]
    WriteFailed(#[source] std::io::Error),

    // Configuration errors
    #[error("Invalid TTL range: begin={begin_hop}, max={max_hops}")]
    InvalidTtlRange { begin_hop: u16, max_hops: u16 },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl TracerouteError {
    /// Returns true if this error is retryable.
    ///
    /// The listener hits a read deadline on every idle poll, so timeouts are
    /// routine rather than fatal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ReadTimeout)
    }
}

/// Maps a socket read failure; timeouts become [`TracerouteError::ReadTimeout`].
impl From<std::io::Error> for TracerouteError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                TracerouteError::ReadTimeout
            }
            _ => TracerouteError::ReadFailed(err),
        }
    }
}

/// Result type alias for traceroute operations.
pub type TracerouteResult<T> = Result<T, TracerouteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(TracerouteError::ReadTimeout.is_retryable());
        assert!(!TracerouteError::InvalidConfig("test".into()).is_retryable());
        assert!(!TracerouteError::ReadFailed(std::io::Error::other("boom")).is_retryable());
    }

    #[test]
    fn test_io_timeouts_map_to_read_timeout() {
        let err: TracerouteError = std::io::Error::from(std::io::ErrorKind::TimedOut).into();
        assert!(matches!(err, TracerouteError::ReadTimeout));

        let err: TracerouteError = std::io::Error::from(std::io::ErrorKind::WouldBlock).into();
        assert!(matches!(err, TracerouteError::ReadTimeout));

        let err: TracerouteError = std::io::Error::other("x").into();
        assert!(matches!(err, TracerouteError::ReadFailed(_)));
    }
}
