use serde::Serialize;
use strum::Display;

use crate::weather::DecodeError;
use crate::weather::FetchError;
use crate::weather::Observation;

/// Failure category carried by `PollFailed` notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorKind {
    Network,
    Timeout,
    HttpStatus,
    Malformed,
    MissingField,
    UpstreamStatus,
}

impl From<&FetchError> for ErrorKind {
    fn from(error: &FetchError) -> Self {
        match error {
            FetchError::Network { .. } => ErrorKind::Network,
            FetchError::Timeout { .. } => ErrorKind::Timeout,
            FetchError::HttpStatus { .. } => ErrorKind::HttpStatus,
        }
    }
}

impl From<&DecodeError> for ErrorKind {
    fn from(error: &DecodeError) -> Self {
        match error {
            DecodeError::Malformed { .. } => ErrorKind::Malformed,
            DecodeError::MissingField { .. } => ErrorKind::MissingField,
            DecodeError::UpstreamStatus { .. } => ErrorKind::UpstreamStatus,
        }
    }
}

/// Result of one poll.
///
/// Errors from fetch and decode stop here: `on_heartbeat` only ever sees
/// an outcome, never an `Err`.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Success(Observation),
    Failure { kind: ErrorKind, detail: String },
}

impl From<FetchError> for PollOutcome {
    fn from(error: FetchError) -> Self {
        PollOutcome::Failure {
            kind: ErrorKind::from(&error),
            detail: error.to_string(),
        }
    }
}

impl From<DecodeError> for PollOutcome {
    fn from(error: DecodeError) -> Self {
        PollOutcome::Failure {
            kind: ErrorKind::from(&error),
            detail: error.to_string(),
        }
    }
}
