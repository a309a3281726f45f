use std::fmt;

use thiserror::Error;

use crate::token::TokenError;
use crate::transport::TransportKind;

/// Errors raised while connecting to or talking with the IoT Hub
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IoTHubError {
    /// Socket level failure
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    /// TLS handshake or configuration failure
    #[error("TLS error: {0}")]
    TlsError(#[from] native_tls::Error),
    /// HTTP client failure
    #[cfg(feature = "http-transport")]
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),
    /// Unable to produce credentials for the connection
    #[error("Token error: {0}")]
    Token(#[from] TokenError),
    /// The transport cannot be used in this environment or build
    #[error("{kind} transport is not supported: {reason}")]
    TransportUnsupported {
        /// Transport that was rejected
        kind: TransportKind,
        /// Why it was rejected
        reason: String,
    },
    /// The hub rejected the connection
    #[error("Connection refused by hub: {0}")]
    ConnectionRefused(String),
    /// Unexpected or malformed protocol traffic
    #[error("Protocol error: {0}")]
    Protocol(String),
    /// The hub answered an HTTP request with a non-success status
    #[error("Request failed with HTTP status {0}")]
    HttpStatus(u16),
    /// Connection attempt did not complete in time
    #[error("Operation timed out")]
    Timeout,
    /// Caller requested cancellation
    #[error("Operation was cancelled")]
    Cancelled,
    /// Router was given an empty transport list
    #[error("No transport candidates were configured")]
    NoCandidates,
    /// The handle has not been opened or has already been disposed
    #[error("Transport is not connected")]
    NotConnected,
    /// Every candidate rejected the connection
    #[error(transparent)]
    Exhausted(#[from] ExhaustedError),
}

impl IoTHubError {
    /// Returns true for the cancellation outcome, which callers often don't treat as a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, IoTHubError::Cancelled)
    }
}

/// A rejection recorded against a single transport candidate
#[derive(Debug)]
pub struct CandidateError {
    /// Transport that was attempted
    pub kind: TransportKind,
    /// Error it failed with
    pub error: IoTHubError,
}

/// All transport candidates were rejected as unsupported.
///
/// Displays as the error of the last candidate attempted; earlier rejections are kept
/// so the root cause on the first candidate isn't lost.
#[derive(Debug)]
pub struct ExhaustedError {
    earlier: Vec<CandidateError>,
    last: Box<CandidateError>,
}

impl ExhaustedError {
    pub(crate) fn new(earlier: Vec<CandidateError>, last: CandidateError) -> Self {
        Self {
            earlier,
            last: Box::new(last),
        }
    }

    /// Rejection from the last candidate attempted
    pub fn last(&self) -> &CandidateError {
        &self.last
    }

    /// Rejections from the candidates attempted before the last, in attempt order
    pub fn earlier(&self) -> &[CandidateError] {
        &self.earlier
    }

    /// Number of candidates attempted
    pub fn attempts(&self) -> usize {
        self.earlier.len() + 1
    }
}

impl fmt::Display for ExhaustedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "All {} transport candidates were rejected, last error ({}): {}",
            self.attempts(),
            self.last.kind,
            self.last.error
        )
    }
}

impl std::error::Error for ExhaustedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.last.error)
    }
}
