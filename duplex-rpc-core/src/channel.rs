//! The per-call message channel.
//!
//! A [`MessageChannel`] is one endpoint of an ordered, reliable, duplex
//! conduit. It splits into a [`FrameSender`] and a [`FrameReceiver`] that can
//! be driven from different tasks: each direction is a separate ordered
//! queue, so concurrent send and receive never interleave partial messages.
//!
//! Every suspension point re-checks the shared [`CallContext`]:
//! - sends refuse to start once the call is cancelled or past its deadline
//! - a send waiting for capacity gives up when the deadline passes
//! - a receive gives up when the call is cancelled or the deadline passes

use futures::Stream;
use tokio::sync::mpsc;

use crate::context::CallContext;
use crate::error::Status;
use crate::frame::{DirectionState, Frame};

/// Default number of frames buffered per direction.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// Create a connected pair of channel endpoints sharing one call context.
///
/// The first endpoint sends `A` and receives `B`; the second sends `B` and
/// receives `A`. `capacity` bounds the frames buffered in each direction
/// (minimum 1).
///
/// # Example
///
/// ```
/// use duplex_rpc_core::{CallContext, duplex};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let ctx = CallContext::new();
/// let (mut client, mut server) = duplex::<u32, String>(&ctx, 4);
///
/// client.send(7u32).await.unwrap();
/// client.close().await.unwrap();
///
/// assert_eq!(server.recv().await.unwrap(), Some(7));
/// assert_eq!(server.recv().await.unwrap(), None);
/// # }
/// ```
pub fn duplex<A, B>(
    ctx: &CallContext,
    capacity: usize,
) -> (MessageChannel<A, B>, MessageChannel<B, A>) {
    let capacity = capacity.max(1);
    let (a_tx, a_rx) = mpsc::channel(capacity);
    let (b_tx, b_rx) = mpsc::channel(capacity);

    let left = MessageChannel::new(
        FrameSender::new(a_tx, ctx.clone()),
        FrameReceiver::new(b_rx, ctx.clone()),
    );
    let right = MessageChannel::new(
        FrameSender::new(b_tx, ctx.clone()),
        FrameReceiver::new(a_rx, ctx.clone()),
    );
    (left, right)
}

// ============================================================================
// FrameSender - outbound half
// ============================================================================

/// Outbound half of a channel endpoint.
#[derive(Debug)]
pub struct FrameSender<T> {
    tx: mpsc::Sender<Frame<T>>,
    ctx: CallContext,
    state: DirectionState,
}

impl<T> FrameSender<T> {
    /// Wrap a raw frame queue.
    pub fn new(tx: mpsc::Sender<Frame<T>>, ctx: CallContext) -> Self {
        Self {
            tx,
            ctx,
            state: DirectionState::Open,
        }
    }

    /// The call context this sender checks before every send.
    pub fn context(&self) -> &CallContext {
        &self.ctx
    }

    /// Current state of the outbound direction.
    pub fn state(&self) -> &DirectionState {
        &self.state
    }

    /// Send one message.
    ///
    /// Fails with:
    /// - `InvalidState` if this direction was already closed
    /// - `Cancelled` / `DeadlineExceeded` if the call context forbids new work,
    ///   including while waiting for buffer space
    /// - `Transport` if the peer dropped its receiver
    pub async fn send<M: Into<T>>(&mut self, message: M) -> Result<(), Status> {
        if !self.state.is_open() {
            return Err(Status::invalid_state("outbound direction is already closed"));
        }
        self.ctx.check()?;
        self.push(Frame::Message(message.into())).await
    }

    /// Half-close: send the termination signal for this direction.
    ///
    /// Closing a terminated direction again is a no-op; closing an errored
    /// direction returns its failure.
    pub async fn close(&mut self) -> Result<(), Status> {
        match &self.state {
            DirectionState::Terminated => return Ok(()),
            DirectionState::Errored(status) => return Err(status.clone()),
            DirectionState::Open => {}
        }
        self.push(Frame::End).await?;
        self.state.terminate();
        Ok(())
    }

    /// End this direction with a structured failure as its last event.
    ///
    /// Unlike [`send`](Self::send) this does not consult the call context, so
    /// a deadline failure can still be reported to the peer.
    pub async fn fail(&mut self, status: Status) -> Result<(), Status> {
        if !self.state.is_open() {
            return Err(Status::invalid_state("outbound direction is already closed"));
        }
        self.push(Frame::Error(status.clone())).await?;
        self.state.fail(status);
        Ok(())
    }

    async fn push(&mut self, frame: Frame<T>) -> Result<(), Status> {
        let ctx = self.ctx.clone();
        let delivered = tokio::select! {
            biased;
            result = self.tx.send(frame) => result.is_ok(),
            _ = ctx.cancelled() => {
                return Err(Status::cancelled("call was cancelled while waiting to send"));
            }
            _ = ctx.expired() => {
                return Err(Status::deadline_exceeded("deadline exceeded waiting to send"));
            }
        };
        if !delivered {
            let status = Status::transport("peer closed the channel");
            self.state.fail(status.clone());
            return Err(status);
        }
        Ok(())
    }
}

// ============================================================================
// FrameReceiver - inbound half
// ============================================================================

/// Inbound half of a channel endpoint.
#[derive(Debug)]
pub struct FrameReceiver<T> {
    rx: mpsc::Receiver<Frame<T>>,
    ctx: CallContext,
    state: DirectionState,
}

impl<T> FrameReceiver<T> {
    /// Wrap a raw frame queue.
    pub fn new(rx: mpsc::Receiver<Frame<T>>, ctx: CallContext) -> Self {
        Self {
            rx,
            ctx,
            state: DirectionState::Open,
        }
    }

    /// The call context this receiver watches while waiting.
    pub fn context(&self) -> &CallContext {
        &self.ctx
    }

    /// Current state of the inbound direction.
    pub fn state(&self) -> &DirectionState {
        &self.state
    }

    /// Receive the next message.
    ///
    /// Returns `Ok(None)` once the peer's termination signal arrives. A
    /// failure ends the direction: every later call returns the same error.
    pub async fn recv(&mut self) -> Result<Option<T>, Status> {
        match &self.state {
            DirectionState::Terminated => return Ok(None),
            DirectionState::Errored(status) => return Err(status.clone()),
            DirectionState::Open => {}
        }

        let ctx = self.ctx.clone();
        let frame = tokio::select! {
            biased;
            _ = ctx.cancelled() => {
                return Err(self.abort(Status::cancelled("call was cancelled")));
            }
            _ = ctx.expired() => {
                return Err(self.abort(Status::deadline_exceeded(
                    "deadline exceeded waiting for a message",
                )));
            }
            frame = self.rx.recv() => frame,
        };

        match frame {
            Some(Frame::Message(message)) => Ok(Some(message)),
            Some(Frame::End) => {
                self.state.terminate();
                Ok(None)
            }
            Some(Frame::Error(status)) => Err(self.abort(status)),
            None => Err(self.abort(Status::transport(
                "channel closed before end of stream",
            ))),
        }
    }

    /// Receive the next message as a specific variant of `T`.
    ///
    /// A message of any other variant fails the direction with `InvalidArgument`.
    pub async fn recv_as<M: TryFrom<T>>(&mut self) -> Result<Option<M>, Status> {
        match self.recv().await? {
            Some(message) => match M::try_from(message) {
                Ok(message) => Ok(Some(message)),
                Err(_) => Err(self.abort(Status::invalid_argument(
                    "unexpected message variant",
                ))),
            },
            None => Ok(None),
        }
    }

    /// Convert into a stream that yields messages until the termination
    /// signal, or a single error as its last item.
    pub fn into_stream(self) -> impl Stream<Item = Result<T, Status>> + Send
    where
        T: Send + 'static,
    {
        futures::stream::unfold(Some(self), |receiver| async move {
            let mut receiver = receiver?;
            match receiver.recv().await {
                Ok(Some(message)) => Some((Ok(message), Some(receiver))),
                Ok(None) => None,
                Err(status) => Some((Err(status), None)),
            }
        })
    }

    fn abort(&mut self, status: Status) -> Status {
        self.state.fail(status.clone());
        status
    }
}

// ============================================================================
// MessageChannel - one endpoint
// ============================================================================

/// One endpoint of a call: sends `Out`, receives `In`.
#[derive(Debug)]
pub struct MessageChannel<Out, In> {
    sender: FrameSender<Out>,
    receiver: FrameReceiver<In>,
}

impl<Out, In> MessageChannel<Out, In> {
    pub fn new(sender: FrameSender<Out>, receiver: FrameReceiver<In>) -> Self {
        Self { sender, receiver }
    }

    /// The call context shared by both halves.
    pub fn context(&self) -> &CallContext {
        self.sender.context()
    }

    /// Split into independently driven halves.
    pub fn split(self) -> (FrameSender<Out>, FrameReceiver<In>) {
        (self.sender, self.receiver)
    }

    pub fn sender(&mut self) -> &mut FrameSender<Out> {
        &mut self.sender
    }

    pub fn receiver(&mut self) -> &mut FrameReceiver<In> {
        &mut self.receiver
    }

    /// See [`FrameSender::send`].
    pub async fn send<M: Into<Out>>(&mut self, message: M) -> Result<(), Status> {
        self.sender.send(message).await
    }

    /// See [`FrameSender::close`].
    pub async fn close(&mut self) -> Result<(), Status> {
        self.sender.close().await
    }

    /// See [`FrameSender::fail`].
    pub async fn fail(&mut self, status: Status) -> Result<(), Status> {
        self.sender.fail(status).await
    }

    /// See [`FrameReceiver::recv`].
    pub async fn recv(&mut self) -> Result<Option<In>, Status> {
        self.receiver.recv().await
    }

    /// See [`FrameReceiver::recv_as`].
    pub async fn recv_as<M: TryFrom<In>>(&mut self) -> Result<Option<M>, Status> {
        self.receiver.recv_as().await
    }
}
