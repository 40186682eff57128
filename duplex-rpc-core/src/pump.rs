//! Bidirectional pump.
//!
//! A [`Pump`] drives both directions of one call at once: an inbound loop
//! that consumes peer messages and an outbound loop that drains a local
//! source. The loops run as separate tasks and share nothing but the channel
//! and its call context, so a slow producer never starves the consumer and a
//! quiet peer never blocks production. [`Pump::run`] returns once both loops
//! have finished.
//!
//! The outbound source is any [`Stream`]. It can be paced on its own, or it
//! can be *reactive*: fed from a queue that the inbound handler fills. In the
//! reactive case the source ends when the inbound loop finishes and drops its
//! handler, and the pump half-closes the outbound direction after the last
//! queued message.
//!
//! # Example
//!
//! ```
//! use duplex_rpc_core::{CallContext, Pump, duplex};
//! use tokio::sync::mpsc;
//! use tokio_stream::wrappers::UnboundedReceiverStream;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let ctx = CallContext::new();
//! let (mut peer, local) = duplex::<u32, u32>(&ctx, 8);
//!
//! // Echo every inbound number back, doubled.
//! let (events, queue) = mpsc::unbounded_channel();
//! let pump = tokio::spawn(async move {
//!     Pump::new()
//!         .run(
//!             local,
//!             move |n: u32| {
//!                 let _ = events.send(Ok::<u32, _>(n * 2));
//!                 Ok(())
//!             },
//!             UnboundedReceiverStream::new(queue),
//!         )
//!         .await
//! });
//!
//! peer.send(1u32).await.unwrap();
//! peer.send(2u32).await.unwrap();
//! peer.close().await.unwrap();
//!
//! assert_eq!(peer.recv().await.unwrap(), Some(2));
//! assert_eq!(peer.recv().await.unwrap(), Some(4));
//! assert_eq!(peer.recv().await.unwrap(), None);
//! assert!(pump.await.unwrap().is_clean());
//! # }
//! ```

use std::pin::pin;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::task::{JoinError, JoinHandle};

use crate::channel::{FrameReceiver, FrameSender, MessageChannel};
use crate::error::Status;
use crate::frame::DirectionState;

/// Final state of both directions after a [`Pump`] run.
#[derive(Clone, Debug, PartialEq)]
pub struct PumpReport {
    pub inbound: DirectionState,
    pub outbound: DirectionState,
}

impl PumpReport {
    /// Returns whether both directions ended with their termination signal.
    pub fn is_clean(&self) -> bool {
        self.inbound.is_terminated() && self.outbound.is_terminated()
    }

    /// The first failure, inbound before outbound.
    pub fn error(&self) -> Option<&Status> {
        self.inbound.error().or_else(|| self.outbound.error())
    }
}

/// Runs an inbound consume loop and an outbound produce loop concurrently.
#[derive(Clone, Copy, Debug, Default)]
pub struct Pump {
    pace: Option<Duration>,
}

impl Pump {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait `pace` between consecutive outbound messages.
    pub fn pace(mut self, pace: Duration) -> Self {
        self.pace = Some(pace);
        self
    }

    /// Drive both directions of `channel` until each has finished.
    ///
    /// - `inbound` is called once per peer message, in arrival order. An
    ///   error stops the inbound loop only.
    /// - `outbound` is drained into the channel. When it ends the outbound
    ///   direction is half-closed; an `Err` item is sent as the direction's
    ///   final failure.
    ///
    /// Cancelling the call context stops both loops before their next step.
    pub async fn run<In, Out, M, R, I, S>(
        &self,
        channel: MessageChannel<Out, In>,
        inbound: I,
        outbound: S,
    ) -> PumpReport
    where
        In: Send + 'static,
        Out: Send + 'static,
        M: TryFrom<In> + Send + 'static,
        I: FnMut(M) -> Result<(), Status> + Send + 'static,
        R: Into<Out> + Send + 'static,
        S: Stream<Item = Result<R, Status>> + Send + 'static,
    {
        let (sender, receiver) = channel.split();
        let mut inbound_task = AbortOnDrop(tokio::spawn(consume(receiver, inbound)));
        let mut outbound_task = AbortOnDrop(tokio::spawn(produce(sender, outbound, self.pace)));

        let (inbound, outbound) = tokio::join!(&mut inbound_task.0, &mut outbound_task.0);
        PumpReport {
            inbound: settle(inbound),
            outbound: settle(outbound),
        }
    }
}

/// Aborts the task when dropped, so dropping [`Pump::run`] early does not
/// leave either direction running.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn consume<In, M, I>(mut receiver: FrameReceiver<In>, mut on_message: I) -> DirectionState
where
    M: TryFrom<In>,
    I: FnMut(M) -> Result<(), Status>,
{
    loop {
        match receiver.recv_as::<M>().await {
            Ok(Some(message)) => {
                if let Err(status) = on_message(message) {
                    return DirectionState::Errored(status);
                }
            }
            Ok(None) => return DirectionState::Terminated,
            Err(status) => return DirectionState::Errored(status),
        }
    }
}

async fn produce<Out, R, S>(
    mut sender: FrameSender<Out>,
    source: S,
    pace: Option<Duration>,
) -> DirectionState
where
    R: Into<Out>,
    S: Stream<Item = Result<R, Status>>,
{
    let ctx = sender.context().clone();
    let mut source = pin!(source);
    let mut sent = 0usize;

    loop {
        let next = tokio::select! {
            biased;
            _ = ctx.cancelled() => return cancelled(),
            next = source.next() => next,
        };

        match next {
            Some(Ok(message)) => {
                if let (Some(pace), true) = (pace, sent > 0) {
                    tokio::select! {
                        biased;
                        _ = ctx.cancelled() => return cancelled(),
                        _ = tokio::time::sleep(pace) => {}
                    }
                }
                if let Err(status) = sender.send(message).await {
                    return DirectionState::Errored(status);
                }
                sent += 1;
            }
            Some(Err(status)) => {
                return match sender.fail(status.clone()).await {
                    Ok(()) => DirectionState::Errored(status),
                    Err(send_error) => DirectionState::Errored(send_error),
                };
            }
            None => {
                return match sender.close().await {
                    Ok(()) => DirectionState::Terminated,
                    Err(status) => DirectionState::Errored(status),
                };
            }
        }
    }
}

fn cancelled() -> DirectionState {
    DirectionState::Errored(Status::cancelled("call was cancelled"))
}

fn settle(joined: Result<DirectionState, JoinError>) -> DirectionState {
    match joined {
        Ok(state) => state,
        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
        Err(_) => DirectionState::Errored(Status::cancelled("pump task was aborted")),
    }
}
