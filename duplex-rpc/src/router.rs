//! Method registration and dispatch.
//!
//! A [`Router`] maps method names to one of the four call shapes. Each entry
//! is tagged with its [`MethodKind`] and stored type-erased, so one router
//! serves every method of a service over the same request/response enums.
//!
//! ```
//! use duplex_rpc::{CallContext, Router, Status, handler::ServerStreamDriver};
//! use futures::stream;
//!
//! let router: Router<u64, u64> = Router::new()
//!     .unary("Double", |_ctx: CallContext, n: u64| async move { Ok::<_, Status>(n * 2) })
//!     .server_stream("Count", ServerStreamDriver::new(), |_ctx, n: u64| {
//!         Ok(stream::iter((0..n).map(Ok::<_, Status>)))
//!     });
//!
//! assert_eq!(router.methods().count(), 2);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use duplex_rpc_core::{CallContext, MessageChannel, PumpReport, Status};
use futures::Stream;
use futures::FutureExt;
use futures::future::BoxFuture;

use crate::handler::{Aggregate, ServerStreamDriver, StreamOutcome, aggregate, serve_unary};

/// The interaction shape of a registered method.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MethodKind {
    Unary,
    ServerStream,
    ClientStream,
    BidiStream,
}

impl MethodKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MethodKind::Unary => "unary",
            MethodKind::ServerStream => "server_stream",
            MethodKind::ClientStream => "client_stream",
            MethodKind::BidiStream => "bidi_stream",
        }
    }
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type BoxedHandler<Req, Resp> =
    Arc<dyn Fn(MessageChannel<Resp, Req>) -> BoxFuture<'static, Result<(), Status>> + Send + Sync>;

struct Route<Req, Resp> {
    kind: MethodKind,
    handler: BoxedHandler<Req, Resp>,
}

/// Method table for one service.
///
/// `Req` and `Resp` are the service's request and response enums; handlers
/// receive and return concrete variants through `TryFrom` / `Into`.
pub struct Router<Req, Resp> {
    routes: HashMap<String, Route<Req, Resp>>,
}

impl<Req, Resp> Default for Router<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<Req, Resp> Router<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    /// Register a unary method.
    pub fn unary<M, R, F, Fut>(self, name: impl Into<String>, handler: F) -> Self
    where
        M: TryFrom<Req> + Send + 'static,
        R: Into<Resp> + Send + 'static,
        F: Fn(CallContext, M) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Status>> + Send + 'static,
    {
        let handler: BoxedHandler<Req, Resp> = Arc::new(move |channel: MessageChannel<Resp, Req>| {
            serve_unary(channel, handler.clone()).boxed()
        });
        self.route(name, MethodKind::Unary, handler)
    }

    /// Register a server-streaming method.
    ///
    /// `handler` validates the request and returns the producer stream; the
    /// driver sends it.
    pub fn server_stream<M, R, S, F>(
        self,
        name: impl Into<String>,
        driver: ServerStreamDriver,
        handler: F,
    ) -> Self
    where
        M: TryFrom<Req> + Send + 'static,
        R: Into<Resp> + Send + 'static,
        S: Stream<Item = Result<R, Status>> + Send + 'static,
        F: Fn(CallContext, M) -> Result<S, Status> + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        let boxed: BoxedHandler<Req, Resp> = Arc::new(move |channel: MessageChannel<Resp, Req>| {
            let handler = handler.clone();
            async move {
                let summary = driver
                    .serve(channel, |ctx, request| handler(ctx, request))
                    .await?;
                tracing::debug!(
                    target: "duplex_rpc",
                    sent = summary.sent,
                    outcome = ?summary.outcome,
                    "server stream finished"
                );
                match summary.outcome {
                    StreamOutcome::Failed(status) => Err(status),
                    StreamOutcome::Completed | StreamOutcome::Cancelled => Ok(()),
                }
            }
            .boxed()
        });
        self.route(name, MethodKind::ServerStream, boxed)
    }

    /// Register a client-streaming method. `init` creates fresh aggregation
    /// state for every call.
    pub fn client_stream<A, F>(self, name: impl Into<String>, init: F) -> Self
    where
        A: Aggregate + Send + 'static,
        A::Item: TryFrom<Req> + Send + 'static,
        A::Output: Into<Resp> + Send + 'static,
        F: Fn() -> A + Send + Sync + 'static,
    {
        let handler: BoxedHandler<Req, Resp> = Arc::new(move |channel: MessageChannel<Resp, Req>| {
            aggregate(channel, init()).boxed()
        });
        self.route(name, MethodKind::ClientStream, handler)
    }

    /// Register a bidirectional method.
    ///
    /// `handler` owns the server end of the channel, usually handing it to a
    /// [`Pump`](duplex_rpc_core::Pump), and reports how both directions ended.
    pub fn bidi<F, Fut>(self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(MessageChannel<Resp, Req>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PumpReport> + Send + 'static,
    {
        let boxed: BoxedHandler<Req, Resp> = Arc::new(move |channel: MessageChannel<Resp, Req>| {
            let report = handler(channel);
            async move {
                match report.await.error() {
                    Some(status) => Err(status.clone()),
                    None => Ok(()),
                }
            }
            .boxed()
        });
        self.route(name, MethodKind::BidiStream, boxed)
    }

    fn route(
        mut self,
        name: impl Into<String>,
        kind: MethodKind,
        handler: BoxedHandler<Req, Resp>,
    ) -> Self {
        let name = name.into();
        if self.routes.contains_key(&name) {
            tracing::warn!(
                target: "duplex_rpc",
                method = %name,
                "method registered twice, replacing"
            );
        }
        self.routes.insert(name, Route { kind, handler });
        self
    }

    /// The shape of `method`, or `None` if it is not registered.
    pub fn kind(&self, method: &str) -> Option<MethodKind> {
        self.routes.get(method).map(|route| route.kind)
    }

    /// Registered methods and their shapes, in no particular order.
    pub fn methods(&self) -> impl Iterator<Item = (&str, MethodKind)> {
        self.routes
            .iter()
            .map(|(name, route)| (name.as_str(), route.kind))
    }

    /// Serve one call of `method` over the server end of its channel.
    ///
    /// Unknown methods fail with `Unimplemented`. Returns the failure the
    /// call ended with, if any.
    pub async fn serve(
        &self,
        method: &str,
        mut channel: MessageChannel<Resp, Req>,
    ) -> Result<(), Status> {
        let Some(route) = self.routes.get(method) else {
            tracing::warn!(target: "duplex_rpc", method, "call to unknown method");
            let status = Status::unimplemented(format!("method `{method}` is not registered"));
            return Err(crate::handler::report(channel.sender(), status).await);
        };

        tracing::debug!(target: "duplex_rpc", method, kind = %route.kind, "call started");
        let result = (route.handler)(channel).await;
        match &result {
            Ok(()) => tracing::debug!(target: "duplex_rpc", method, "call completed"),
            Err(status) if status.kind().is_handler_failure() => {
                tracing::debug!(target: "duplex_rpc", method, error = %status, "call failed")
            }
            Err(status) => {
                tracing::info!(target: "duplex_rpc", method, error = %status, "call ended early")
            }
        }
        result
    }
}

impl<Req, Resp> fmt::Debug for Router<Req, Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.routes.iter().map(|(name, route)| (name, route.kind)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duplex_rpc_core::{ErrorKind, Pump, duplex};
    use futures::stream;

    fn echo_router() -> Router<i64, i64> {
        Router::new()
            .unary("Negate", |_ctx: CallContext, n: i64| async move { Ok::<_, Status>(-n) })
            .server_stream("Repeat", ServerStreamDriver::new(), |_ctx, n: i64| {
                Ok(stream::iter((0..n).map(move |_| Ok::<_, Status>(n))))
            })
            .bidi("Echo", |channel: MessageChannel<i64, i64>| async move {
                let (events, queue) = tokio::sync::mpsc::unbounded_channel();
                Pump::new()
                    .run(
                        channel,
                        move |n: i64| {
                            let _ = events.send(Ok::<i64, Status>(n));
                            Ok(())
                        },
                        tokio_stream::wrappers::UnboundedReceiverStream::new(queue),
                    )
                    .await
            })
    }

    #[test]
    fn test_kinds_are_tagged() {
        let router = echo_router();
        assert_eq!(router.kind("Negate"), Some(MethodKind::Unary));
        assert_eq!(router.kind("Repeat"), Some(MethodKind::ServerStream));
        assert_eq!(router.kind("Echo"), Some(MethodKind::BidiStream));
        assert_eq!(router.kind("Missing"), None);
        assert_eq!(router.methods().count(), 3);
    }

    #[tokio::test]
    async fn test_dispatch_unary() {
        let router = echo_router();
        let ctx = CallContext::new();
        let (mut client, server) = duplex::<i64, i64>(&ctx, 4);

        client.send(9i64).await.unwrap();
        client.close().await.unwrap();
        router.serve("Negate", server).await.unwrap();

        assert_eq!(client.recv().await.unwrap(), Some(-9));
        assert_eq!(client.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_dispatch_bidi() {
        let router = Arc::new(echo_router());
        let ctx = CallContext::new();
        let (mut client, server) = duplex::<i64, i64>(&ctx, 4);
        let task = tokio::spawn({
            let router = router.clone();
            async move { router.serve("Echo", server).await }
        });

        client.send(1i64).await.unwrap();
        assert_eq!(client.recv().await.unwrap(), Some(1));
        client.send(2i64).await.unwrap();
        assert_eq!(client.recv().await.unwrap(), Some(2));
        client.close().await.unwrap();
        assert_eq!(client.recv().await.unwrap(), None);

        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_unknown_method_is_unimplemented() {
        let router = echo_router();
        let ctx = CallContext::new();
        let (mut client, server) = duplex::<i64, i64>(&ctx, 4);

        let err = router.serve("Missing", server).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unimplemented);
        assert_eq!(client.recv().await.unwrap_err(), err);
    }

    #[test]
    fn test_method_kind_display() {
        assert_eq!(MethodKind::ClientStream.to_string(), "client_stream");
    }
}
