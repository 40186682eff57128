use std::future::Future;

use duplex_rpc_core::{CallContext, MessageChannel, Status};

use super::report;

/// Serve one unary call.
///
/// Reads the request, checks the call context once, then runs `handler`.
/// The result is sent followed by the termination signal; a handler failure
/// is sent as the direction's final error instead.
///
/// Returns the failure the call ended with, if any.
pub async fn serve_unary<Req, Resp, M, R, F, Fut>(
    mut channel: MessageChannel<Resp, Req>,
    handler: F,
) -> Result<(), Status>
where
    M: TryFrom<Req>,
    R: Into<Resp>,
    F: FnOnce(CallContext, M) -> Fut,
    Fut: Future<Output = Result<R, Status>>,
{
    let request = match channel.recv_as::<M>().await {
        Ok(Some(request)) => request,
        Ok(None) => {
            let status = Status::invalid_argument("unary call closed without a request");
            return Err(report(channel.sender(), status).await);
        }
        Err(status) => return Err(report(channel.sender(), status).await),
    };

    let ctx = channel.context().clone();
    let result = match ctx.check() {
        Ok(()) => handler(ctx, request).await,
        Err(status) => Err(status),
    };

    match result {
        Ok(response) => {
            channel.send(response).await?;
            channel.close().await
        }
        Err(status) => Err(report(channel.sender(), status).await),
    }
}
