//! Inbound message sequence for streaming calls.
//!
//! # Cancellation
//!
//! Dropping a [`Streaming`] before it finished cancels the call. The server
//! observes the cancellation at its next check and stops producing.
//!
//! Cancellation is never reported as an error to the party that cancelled:
//! after [`Streaming::cancel`] the sequence simply ends.

use std::pin::Pin;
use std::task::{Context, Poll, ready};

use duplex_rpc_core::{CallContext, FrameReceiver, Status};
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};

/// Lazy, finite sequence of response messages.
///
/// Yields messages in the order the server sent them, then ends on the
/// server's termination signal. A failure is yielded once as the last item.
/// The sequence is not restartable.
///
/// # Example
///
/// ```ignore
/// let mut stream = client.call_server_stream::<_, _, _, Factor>("Primes", Number(28)).await?;
///
/// while let Some(factor) = stream.next().await {
///     println!("factor: {:?}", factor?);
/// }
/// ```
pub struct Streaming<T> {
    inner: BoxStream<'static, Result<T, Status>>,
    ctx: CallContext,
    finished: bool,
}

impl<T> Streaming<T> {
    /// Wrap the inbound half of a call, converting every message to `T`.
    pub fn new<In>(receiver: FrameReceiver<In>) -> Self
    where
        In: Send + 'static,
        T: TryFrom<In> + Send + 'static,
    {
        let ctx = receiver.context().clone();
        let mut receiver = receiver;
        let inner = async_stream::stream! {
            loop {
                match receiver.recv_as::<T>().await {
                    Ok(Some(message)) => yield Ok(message),
                    Ok(None) => break,
                    Err(status) => {
                        yield Err(status);
                        break;
                    }
                }
            }
        };
        Self {
            inner: inner.boxed(),
            ctx,
            finished: false,
        }
    }

    /// The call context shared with the server.
    pub fn context(&self) -> &CallContext {
        &self.ctx
    }

    /// Cancel the call. The sequence ends without an error.
    pub fn cancel(&self) {
        self.ctx.cancel();
    }

    /// Check if the sequence has finished.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Receive the next message, `Ok(None)` once the sequence has ended.
    pub async fn message(&mut self) -> Result<Option<T>, Status> {
        self.next().await.transpose()
    }

    /// Gracefully drain all remaining messages from the stream.
    ///
    /// Returns the number of messages that were drained (not including errors).
    pub async fn drain(&mut self) -> usize {
        let mut count = 0;
        while let Some(result) = self.next().await {
            if result.is_ok() {
                count += 1;
            }
        }
        count
    }

    /// Gracefully drain remaining messages with a timeout.
    ///
    /// Returns `Ok(count)` if the stream was fully drained, or `Err(count)`
    /// if the timeout expired (where `count` is the number of messages drained
    /// before the timeout).
    pub async fn drain_timeout(&mut self, timeout: std::time::Duration) -> Result<usize, usize> {
        let mut count = 0;
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            tokio::select! {
                biased;

                _ = tokio::time::sleep_until(deadline) => {
                    return Err(count);
                }

                item = self.next() => {
                    match item {
                        Some(Ok(_)) => count += 1,
                        Some(Err(_)) => {}
                        None => return Ok(count),
                    }
                }
            }
        }
    }
}

impl<T> Stream for Streaming<T> {
    type Item = Result<T, Status>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        let item = ready!(self.inner.poll_next_unpin(cx));
        match item {
            Some(Ok(message)) => Poll::Ready(Some(Ok(message))),
            // The context is only ever cancelled by this side of the call.
            Some(Err(status)) if status.is_cancelled() && self.ctx.is_cancelled() => {
                self.finished = true;
                Poll::Ready(None)
            }
            Some(Err(status)) => {
                self.finished = true;
                Poll::Ready(Some(Err(status)))
            }
            None => {
                self.finished = true;
                Poll::Ready(None)
            }
        }
    }
}

impl<T> Drop for Streaming<T> {
    fn drop(&mut self) {
        if !self.finished {
            self.ctx.cancel();
        }
    }
}

impl<T> std::fmt::Debug for Streaming<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Streaming")
            .field("ctx", &self.ctx)
            .field("finished", &self.finished)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duplex_rpc_core::duplex;
    use std::time::Duration;

    #[tokio::test]
    async fn test_yields_until_end() {
        let ctx = CallContext::new();
        let (mut server, client) = duplex::<u32, ()>(&ctx, 8);
        let (_tx, rx) = client.split();
        let mut streaming = Streaming::<u32>::new(rx);

        server.send(1u32).await.unwrap();
        server.send(2u32).await.unwrap();
        server.close().await.unwrap();

        assert_eq!(streaming.message().await.unwrap(), Some(1));
        assert_eq!(streaming.message().await.unwrap(), Some(2));
        assert_eq!(streaming.message().await.unwrap(), None);
        assert!(streaming.is_finished());
        drop(streaming);
        assert!(!ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_ends_without_error() {
        let ctx = CallContext::new();
        let (mut server, client) = duplex::<u32, ()>(&ctx, 8);
        let (_tx, rx) = client.split();
        let mut streaming = Streaming::<u32>::new(rx);

        server.send(1u32).await.unwrap();
        server.send(2u32).await.unwrap();

        assert_eq!(streaming.next().await.unwrap().unwrap(), 1);
        streaming.cancel();
        assert!(streaming.next().await.is_none());
        assert!(streaming.next().await.is_none());
    }

    #[tokio::test]
    async fn test_failure_is_last_item() {
        let ctx = CallContext::new();
        let (mut server, client) = duplex::<u32, ()>(&ctx, 8);
        let (_tx, rx) = client.split();
        let mut streaming = Streaming::<u32>::new(rx);

        server.send(1u32).await.unwrap();
        server.fail(Status::invalid_argument("bad")).await.unwrap();

        assert_eq!(streaming.next().await.unwrap().unwrap(), 1);
        assert_eq!(
            streaming.next().await.unwrap().unwrap_err(),
            Status::invalid_argument("bad")
        );
        assert!(streaming.next().await.is_none());
    }

    #[tokio::test]
    async fn test_drop_unfinished_cancels_call() {
        let ctx = CallContext::new();
        let (_server, client) = duplex::<u32, ()>(&ctx, 8);
        let (_tx, rx) = client.split();
        let streaming = Streaming::<u32>::new(rx);

        drop(streaming);
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_streaming_drain() {
        let ctx = CallContext::new();
        let (mut server, client) = duplex::<u32, ()>(&ctx, 8);
        let (_tx, rx) = client.split();
        let mut streaming = Streaming::<u32>::new(rx);

        for n in 0..4u32 {
            server.send(n).await.unwrap();
        }
        server.close().await.unwrap();

        assert_eq!(streaming.next().await.unwrap().unwrap(), 0);
        assert_eq!(streaming.drain().await, 3);
        assert!(streaming.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_streaming_drain_timeout() {
        let ctx = CallContext::new();
        let (mut server, client) = duplex::<u32, ()>(&ctx, 8);
        let (_tx, rx) = client.split();
        let mut streaming = Streaming::<u32>::new(rx);

        server.send(7u32).await.unwrap();

        // The server never closes.
        let result = streaming.drain_timeout(Duration::from_secs(5)).await;
        assert_eq!(result, Err(1));
    }
}
