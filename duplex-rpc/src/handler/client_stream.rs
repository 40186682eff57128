//! Client-streaming aggregation.

use duplex_rpc_core::{MessageChannel, Status};

use super::report;

/// Accumulated state of one client-streaming call.
///
/// The aggregator owns the state exclusively: it is folded once per inbound
/// message, in order, and finalized exactly once after the peer's
/// termination signal.
///
/// # Example
///
/// ```
/// use duplex_rpc::handler::Aggregate;
/// use duplex_rpc::Status;
///
/// #[derive(Default)]
/// struct Count(u64);
///
/// impl Aggregate for Count {
///     type Item = u64;
///     type Output = u64;
///
///     fn fold(&mut self, _item: u64) -> Result<(), Status> {
///         self.0 += 1;
///         Ok(())
///     }
///
///     fn finalize(self) -> Result<u64, Status> {
///         Ok(self.0)
///     }
/// }
/// ```
pub trait Aggregate {
    /// One inbound message.
    type Item;
    /// The single terminal result.
    type Output;

    /// Fold one message into the state. An error ends the call.
    fn fold(&mut self, item: Self::Item) -> Result<(), Status>;

    /// Compute the terminal result once input has ended.
    fn finalize(self) -> Result<Self::Output, Status>;
}

/// Serve one client-streaming call by folding every inbound message into
/// `state`.
///
/// On the termination signal the state is finalized and its result is sent,
/// followed by the termination signal. A transport failure before that point
/// aborts the call: nothing partial is ever sent.
pub async fn aggregate<Req, Resp, A>(
    mut channel: MessageChannel<Resp, Req>,
    mut state: A,
) -> Result<(), Status>
where
    A: Aggregate,
    A::Item: TryFrom<Req>,
    A::Output: Into<Resp>,
{
    loop {
        match channel.recv_as::<A::Item>().await {
            Ok(Some(item)) => {
                if let Err(status) = state.fold(item) {
                    return Err(report(channel.sender(), status).await);
                }
            }
            Ok(None) => break,
            Err(status) => return Err(report(channel.sender(), status).await),
        }
    }

    match state.finalize() {
        Ok(output) => {
            if let Err(status) = channel.send(output).await {
                return Err(report(channel.sender(), status).await);
            }
            channel.close().await
        }
        Err(status) => Err(report(channel.sender(), status).await),
    }
}
