//! Call error kinds and status types.
//!
//! This module provides the error types shared by both ends of a call:
//! - [`ErrorKind`]: Tagged failure kinds raised by handlers and channels
//! - [`Status`]: A kind plus a human-readable detail
//! - [`Code`]: Numeric transport status codes, used only at the transport boundary

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

/// Failure kinds a call can end with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A precondition on the input was violated.
    InvalidArgument,
    /// The call deadline was observed as expired at a check point.
    DeadlineExceeded,
    /// The call was cancelled before the operation completed.
    Cancelled,
    /// The underlying channel failed or closed unexpectedly.
    Transport,
    /// An illegal terminal condition, such as finalizing an empty aggregation.
    InvalidState,
    /// The requested method is not registered.
    Unimplemented,
}

impl ErrorKind {
    /// Get the string representation of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::DeadlineExceeded => "deadline_exceeded",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Transport => "transport",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::Unimplemented => "unimplemented",
        }
    }

    /// Returns whether this kind is raised by handler logic rather than by
    /// the call machinery.
    ///
    /// Handler failures are reported to the peer as a failed result and never
    /// tear down the channel.
    ///
    /// # Example
    ///
    /// ```
    /// use duplex_rpc_core::ErrorKind;
    ///
    /// assert!(ErrorKind::InvalidArgument.is_handler_failure());
    /// assert!(ErrorKind::InvalidState.is_handler_failure());
    /// assert!(!ErrorKind::Transport.is_handler_failure());
    /// ```
    pub fn is_handler_failure(&self) -> bool {
        matches!(self, ErrorKind::InvalidArgument | ErrorKind::InvalidState)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an [`ErrorKind`] from a string fails.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseErrorKindError(());

impl fmt::Display for ParseErrorKindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown error kind")
    }
}

impl std::error::Error for ParseErrorKindError {}

impl FromStr for ErrorKind {
    type Err = ParseErrorKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invalid_argument" => Ok(ErrorKind::InvalidArgument),
            "deadline_exceeded" => Ok(ErrorKind::DeadlineExceeded),
            "cancelled" | "canceled" => Ok(ErrorKind::Cancelled),
            "transport" => Ok(ErrorKind::Transport),
            "invalid_state" => Ok(ErrorKind::InvalidState),
            "unimplemented" => Ok(ErrorKind::Unimplemented),
            _ => Err(ParseErrorKindError(())),
        }
    }
}

/// Transport status codes.
///
/// Numbering follows the gRPC status codes so a wire transport can forward
/// them unchanged. Handlers never construct these directly; a transport maps
/// an [`ErrorKind`] with [`Code::from`] when it writes a failure to the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Code {
    Ok = 0,
    Canceled = 1,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    FailedPrecondition = 9,
    Unimplemented = 12,
    Unavailable = 14,
}

impl Code {
    /// Numeric value of this code.
    pub fn value(self) -> i32 {
        self as i32
    }
}

impl From<ErrorKind> for Code {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::InvalidArgument => Code::InvalidArgument,
            ErrorKind::DeadlineExceeded => Code::DeadlineExceeded,
            ErrorKind::Cancelled => Code::Canceled,
            ErrorKind::Transport => Code::Unavailable,
            ErrorKind::InvalidState => Code::FailedPrecondition,
            ErrorKind::Unimplemented => Code::Unimplemented,
        }
    }
}

// ============================================================================
// Status - structured failure shared between client and server
// ============================================================================

/// A failed call outcome: an [`ErrorKind`] plus a human-readable detail.
///
/// # Example
///
/// ```
/// use duplex_rpc_core::{ErrorKind, Status};
///
/// let status = Status::invalid_argument("received the negative number -4");
/// assert_eq!(status.kind(), ErrorKind::InvalidArgument);
/// assert_eq!(status.message(), "received the negative number -4");
/// assert_eq!(status.to_string(), "invalid_argument: received the negative number -4");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Status {
    kind: ErrorKind,
    message: String,
}

impl Status {
    /// Create a new status with a kind and message.
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Get the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Transport status code for this failure.
    pub fn code(&self) -> Code {
        Code::from(self.kind)
    }

    /// Returns whether the underlying channel failed.
    pub fn is_transport(&self) -> bool {
        self.kind == ErrorKind::Transport
    }

    /// Returns whether the call was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }

    /// Create an invalid argument status.
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    /// Create a deadline exceeded status.
    pub fn deadline_exceeded<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::DeadlineExceeded, message)
    }

    /// Create a cancelled status.
    pub fn cancelled<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }

    /// Create a transport status.
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::Transport, message)
    }

    /// Create an invalid state status.
    pub fn invalid_state<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::InvalidState, message)
    }

    /// Create an unimplemented status.
    pub fn unimplemented<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::Unimplemented, message)
    }
}

/// Body written by a wire transport for a failed call.
#[derive(Serialize)]
struct ErrorBody<'a> {
    kind: ErrorKind,
    code: i32,
    message: &'a str,
}

impl Serialize for Status {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        ErrorBody {
            kind: self.kind,
            code: self.code().value(),
            message: &self.message,
        }
        .serialize(serializer)
    }
}
