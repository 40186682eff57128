//! Frames carried by one direction of a call, and the per-direction state machine.

use crate::error::Status;

/// One unit delivered over a direction of a [`MessageChannel`](crate::MessageChannel).
///
/// `End` is the stream termination signal: no more frames follow in that
/// direction. `Error` is a structured failure and also ends the direction.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame<T> {
    /// An application message.
    Message(T),
    /// End of stream for this direction.
    End,
    /// The direction failed; this is its last event.
    Error(Status),
}

impl<T> Frame<T> {
    /// Returns whether this frame ends its direction.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Frame::Message(_))
    }
}

/// Lifecycle of one direction of a call.
///
/// Transitions are one-shot: `Open` moves to either `Terminated` or
/// `Errored` and never moves again.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum DirectionState {
    #[default]
    Open,
    /// The direction ended with its termination signal.
    Terminated,
    /// The direction ended with a failure.
    Errored(Status),
}

impl DirectionState {
    pub fn is_open(&self) -> bool {
        matches!(self, DirectionState::Open)
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, DirectionState::Terminated)
    }

    /// The failure this direction ended with, if any.
    pub fn error(&self) -> Option<&Status> {
        match self {
            DirectionState::Errored(status) => Some(status),
            _ => None,
        }
    }

    /// Move to `Terminated`. Returns `false` if the direction already finished.
    pub fn terminate(&mut self) -> bool {
        self.finish(DirectionState::Terminated)
    }

    /// Move to `Errored`. Returns `false` if the direction already finished.
    pub fn fail(&mut self, status: Status) -> bool {
        self.finish(DirectionState::Errored(status))
    }

    fn finish(&mut self, next: DirectionState) -> bool {
        if !self.is_open() {
            return false;
        }
        *self = next;
        true
    }
}
