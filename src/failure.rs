//! Classification of failed connection attempts.
//!
//! Only an explicit "transport unsupported" signal lets the router move on to the next
//! candidate. Timeouts, refusals and I/O failures on a supported transport end the whole
//! attempt so the real cause isn't hidden behind a different protocol succeeding.

use crate::error::IoTHubError;

/// What the router does after a candidate fails to open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Try the next candidate
    Retriable,
    /// Abort and surface the error
    Fatal,
    /// Abort with a cancellation outcome
    Cancelled,
}

/// Map a failed open to the router's next step
pub fn classify(error: &IoTHubError) -> FailureClass {
    match error {
        IoTHubError::TransportUnsupported { .. } => FailureClass::Retriable,
        IoTHubError::Cancelled => FailureClass::Cancelled,
        _ => FailureClass::Fatal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportKind;

    #[test]
    fn unsupported_transport_is_retriable() {
        let err = IoTHubError::TransportUnsupported {
            kind: TransportKind::AmqpTcp,
            reason: "no amqp".to_owned(),
        };
        assert_eq!(classify(&err), FailureClass::Retriable);
    }

    #[test]
    fn cancellation_is_distinct() {
        assert_eq!(classify(&IoTHubError::Cancelled), FailureClass::Cancelled);
    }

    #[test]
    fn ambiguous_failures_are_fatal() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert_eq!(classify(&IoTHubError::IoError(io)), FailureClass::Fatal);
        assert_eq!(classify(&IoTHubError::Timeout), FailureClass::Fatal);
        assert_eq!(
            classify(&IoTHubError::ConnectionRefused("NotAuthorized".to_owned())),
            FailureClass::Fatal
        );
        assert_eq!(classify(&IoTHubError::HttpStatus(500)), FailureClass::Fatal);
    }
}
