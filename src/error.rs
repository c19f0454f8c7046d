use std::sync::Arc;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DnsError>;

/// Unified error type for the resolver library
#[derive(Debug, Clone, Error)]
pub enum DnsError {
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("operation timed out")]
    Timeout,

    #[error("message encoding error: {0}")]
    Proto(String),

    #[error("invalid upstream server address: {0}")]
    InvalidServerAddress(String),

    #[error("invalid TSIG key: {0}")]
    InvalidTsigKey(String),

    #[error("invalid configuration value for {0}: {1}")]
    InvalidConfig(&'static str, String),

    #[error("no upstream servers configured")]
    NoServersConfigured,

    #[error("no response from any upstream server")]
    NoResponse,
}

impl DnsError {
    /// Whether the failure is of the interrupted-I/O kind. A transient
    /// failure loses the attempt but leaves the server eligible for
    /// further dispatch; anything else takes the server out of the
    /// current call.
    pub fn is_transient(&self) -> bool {
        match self {
            DnsError::Timeout => true,
            DnsError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

impl From<std::io::Error> for DnsError {
    fn from(err: std::io::Error) -> Self {
        DnsError::Io(Arc::new(err))
    }
}

impl From<hickory_proto::ProtoError> for DnsError {
    fn from(err: hickory_proto::ProtoError) -> Self {
        DnsError::Proto(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn timeouts_are_transient() {
        assert!(DnsError::Timeout.is_transient());
        assert!(DnsError::from(Error::new(ErrorKind::TimedOut, "recv timed out")).is_transient());
        assert!(DnsError::from(Error::new(ErrorKind::Interrupted, "signal")).is_transient());
    }

    #[test]
    fn hard_failures_are_not_transient() {
        assert!(!DnsError::from(Error::new(ErrorKind::ConnectionRefused, "refused")).is_transient());
        assert!(!DnsError::Proto("garbage".to_string()).is_transient());
        assert!(!DnsError::NoResponse.is_transient());
    }
}
