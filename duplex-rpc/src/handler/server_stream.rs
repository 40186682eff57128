//! Server-streaming production.
//!
//! A [`ServerStreamDriver`] pulls responses from a producer stream and sends
//! them one at a time. The call context is consulted before every emission:
//! - cancelled: production stops quietly, nothing more is sent
//! - past the deadline: the stream ends with a `DeadlineExceeded` error
//!
//! The producer decides what comes next; the driver only decides whether and
//! when it is sent.

use std::pin::pin;
use std::time::Duration;

use duplex_rpc_core::{CallContext, FrameSender, MessageChannel, Status};
use futures::{Stream, StreamExt};

use super::report;

/// How a driven stream ended.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamOutcome {
    /// The producer was exhausted and the termination signal was sent.
    Completed,
    /// The call was cancelled; production stopped without a terminal event.
    Cancelled,
    /// The stream ended with this error as its last event.
    Failed(Status),
}

/// Result of driving one server stream.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamSummary {
    /// Messages delivered before the stream ended.
    pub sent: usize,
    pub outcome: StreamOutcome,
}

/// Drives a producer stream over the outbound half of a call.
#[derive(Clone, Copy, Debug, Default)]
pub struct ServerStreamDriver {
    pace: Option<Duration>,
}

impl ServerStreamDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait `pace` between consecutive messages.
    pub fn pace(mut self, pace: Duration) -> Self {
        self.pace = Some(pace);
        self
    }

    /// Serve one server-streaming call.
    ///
    /// Reads the request and builds the producer with `handler`. A handler
    /// error ends the stream before anything is produced.
    pub async fn serve<Req, Resp, M, R, S, F>(
        &self,
        mut channel: MessageChannel<Resp, Req>,
        handler: F,
    ) -> Result<StreamSummary, Status>
    where
        M: TryFrom<Req>,
        R: Into<Resp>,
        S: Stream<Item = Result<R, Status>>,
        F: FnOnce(CallContext, M) -> Result<S, Status>,
    {
        let request = match channel.recv_as::<M>().await {
            Ok(Some(request)) => request,
            Ok(None) => {
                let status = Status::invalid_argument("stream call closed without a request");
                return Err(report(channel.sender(), status).await);
            }
            Err(status) => return Err(report(channel.sender(), status).await),
        };

        let ctx = channel.context().clone();
        let (mut sender, _receiver) = channel.split();
        match handler(ctx, request) {
            Ok(stream) => self.drive(&mut sender, stream).await,
            Err(status) => Err(report(&mut sender, status).await),
        }
    }

    /// Send every item of `stream` over `sender`.
    ///
    /// Returns `Err` only when the channel itself failed; every other ending
    /// is described by the returned [`StreamSummary`].
    pub async fn drive<Out, R, S>(
        &self,
        sender: &mut FrameSender<Out>,
        stream: S,
    ) -> Result<StreamSummary, Status>
    where
        R: Into<Out>,
        S: Stream<Item = Result<R, Status>>,
    {
        let ctx = sender.context().clone();
        let mut stream = pin!(stream);
        let mut sent = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = ctx.cancelled() => return Ok(cancelled(sent)),
                next = stream.next() => next,
            };
            let message = match next {
                Some(Ok(message)) => message,
                Some(Err(status)) => return fail(sender, sent, status).await,
                None => {
                    sender.close().await?;
                    return Ok(StreamSummary {
                        sent,
                        outcome: StreamOutcome::Completed,
                    });
                }
            };

            if let (Some(pace), true) = (self.pace, sent > 0) {
                tokio::select! {
                    biased;
                    _ = ctx.cancelled() => return Ok(cancelled(sent)),
                    _ = tokio::time::sleep(pace) => {}
                }
            }

            if ctx.is_cancelled() {
                return Ok(cancelled(sent));
            }
            if ctx.is_expired() {
                let status = Status::deadline_exceeded("deadline exceeded while streaming");
                return fail(sender, sent, status).await;
            }

            match sender.send(message).await {
                Ok(()) => sent += 1,
                Err(status) if status.is_cancelled() => return Ok(cancelled(sent)),
                Err(status) if status.is_transport() => return Err(status),
                Err(status) => return fail(sender, sent, status).await,
            }
        }
    }
}

fn cancelled(sent: usize) -> StreamSummary {
    StreamSummary {
        sent,
        outcome: StreamOutcome::Cancelled,
    }
}

async fn fail<Out>(
    sender: &mut FrameSender<Out>,
    sent: usize,
    status: Status,
) -> Result<StreamSummary, Status> {
    let status = report(sender, status).await;
    if status.is_transport() {
        return Err(status);
    }
    Ok(StreamSummary {
        sent,
        outcome: StreamOutcome::Failed(status),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use duplex_rpc_core::{ErrorKind, duplex};
    use futures::stream;
    use tokio::time::Instant;

    fn count_to(n: u32) -> impl Stream<Item = Result<u32, Status>> {
        stream::iter((1..=n).map(Ok))
    }

    #[tokio::test]
    async fn test_completed_stream_ends_with_signal() {
        let ctx = CallContext::new();
        let (mut client, server) = duplex::<u32, u32>(&ctx, 8);
        let (mut sender, _receiver) = server.split();

        let summary = ServerStreamDriver::new()
            .drive(&mut sender, count_to(3))
            .await
            .unwrap();
        assert_eq!(summary.sent, 3);
        assert_eq!(summary.outcome, StreamOutcome::Completed);

        let mut received = Vec::new();
        while let Some(n) = client.recv().await.unwrap() {
            received.push(n);
        }
        assert_eq!(received, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_empty_stream_sends_only_the_signal() {
        let ctx = CallContext::new();
        let (mut client, server) = duplex::<u32, u32>(&ctx, 8);
        let (mut sender, _receiver) = server.split();

        let summary = ServerStreamDriver::new()
            .drive(&mut sender, count_to(0))
            .await
            .unwrap();
        assert_eq!(summary.sent, 0);
        assert_eq!(client.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_producer_error_is_last_event() {
        let ctx = CallContext::new();
        let (mut client, server) = duplex::<u32, u32>(&ctx, 8);
        let (mut sender, _receiver) = server.split();

        let producer = stream::iter(vec![
            Ok(1u32),
            Err(Status::invalid_argument("bad step")),
            Ok(3),
        ]);
        let summary = ServerStreamDriver::new()
            .drive(&mut sender, producer)
            .await
            .unwrap();
        assert_eq!(summary.sent, 1);
        assert_eq!(
            summary.outcome,
            StreamOutcome::Failed(Status::invalid_argument("bad step"))
        );

        assert_eq!(client.recv().await.unwrap(), Some(1));
        assert_eq!(
            client.recv().await.unwrap_err(),
            Status::invalid_argument("bad step")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_releases_driver_blocked_on_full_channel() {
        let ctx = CallContext::new();
        let (client, server) = duplex::<u32, u32>(&ctx, 1);
        let (_client_tx, mut client_rx) = client.split();
        let (mut sender, _receiver) = server.split();

        let task = tokio::spawn(async move {
            ServerStreamDriver::new()
                .drive(&mut sender, count_to(100))
                .await
        });

        // Read one message, then stop reading while still holding the endpoint.
        assert_eq!(client_rx.recv().await.unwrap(), Some(1));
        ctx.cancel();

        let summary = tokio::time::timeout(Duration::from_secs(60), task)
            .await
            .expect("driver should stop once the call is cancelled")
            .unwrap()
            .unwrap();
        assert_eq!(summary.outcome, StreamOutcome::Cancelled);
        assert!(summary.sent < 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_without_terminal_event() {
        let ctx = CallContext::new();
        let (client, server) = duplex::<u32, u32>(&ctx, 8);
        let (mut client_tx, mut client_rx) = client.split();
        let (mut sender, _receiver) = server.split();

        let task = tokio::spawn(async move {
            ServerStreamDriver::new()
                .pace(Duration::from_millis(100))
                .drive(&mut sender, count_to(10))
                .await
        });

        for expected in 1..=3 {
            assert_eq!(client_rx.recv().await.unwrap(), Some(expected));
        }
        client_tx.context().cancel();

        let summary = task.await.unwrap().unwrap();
        assert_eq!(summary.outcome, StreamOutcome::Cancelled);
        assert_eq!(summary.sent, 3);
        client_tx.close().await.ok();
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_spaces_messages() {
        let ctx = CallContext::new();
        let (mut client, server) = duplex::<u32, u32>(&ctx, 8);
        let (mut sender, _receiver) = server.split();

        let started = Instant::now();
        let summary = ServerStreamDriver::new()
            .pace(Duration::from_millis(250))
            .drive(&mut sender, count_to(5))
            .await
            .unwrap();

        assert_eq!(summary.sent, 5);
        assert!(started.elapsed() >= Duration::from_secs(1));
        assert!(started.elapsed() < Duration::from_millis(1250));
        for expected in 1..=5 {
            assert_eq!(client.recv().await.unwrap(), Some(expected));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_ends_stream_with_error() {
        let ctx = CallContext::with_timeout(Duration::from_millis(250));
        let (_client, server) = duplex::<u32, u32>(&ctx, 8);
        let (mut sender, _receiver) = server.split();

        let summary = ServerStreamDriver::new()
            .pace(Duration::from_millis(100))
            .drive(&mut sender, count_to(10))
            .await
            .unwrap();
        assert_eq!(summary.sent, 3);
        assert!(matches!(
            summary.outcome,
            StreamOutcome::Failed(ref status) if status.kind() == ErrorKind::DeadlineExceeded
        ));
    }

    #[tokio::test]
    async fn test_dropped_peer_surfaces_transport_error() {
        let ctx = CallContext::new();
        let (client, server) = duplex::<u32, u32>(&ctx, 8);
        let (mut sender, _receiver) = server.split();
        drop(client);

        let err = ServerStreamDriver::new()
            .drive(&mut sender, count_to(3))
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_serve_reports_handler_rejection() {
        let ctx = CallContext::new();
        let (mut client, server) = duplex::<u32, u32>(&ctx, 8);

        client.send(0u32).await.unwrap();
        let result = ServerStreamDriver::new()
            .serve(server, |_ctx, n: u32| {
                if n == 0 {
                    return Err(Status::invalid_argument("n must be positive"));
                }
                Ok(count_to(n))
            })
            .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidArgument);
        assert_eq!(
            client.recv().await.unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }
}
