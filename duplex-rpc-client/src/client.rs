//! The caller-facing client.

use std::future::Future;
use std::time::Duration;

use duplex_rpc_core::{MessageChannel, Status, Transport};

use crate::builder::ClientBuilder;
use crate::call::{BidiCall, ClientStreamCall, surface};
use crate::options::CallOptions;
use crate::streaming::Streaming;

/// Client for a duplex-rpc service.
///
/// Every call opens a fresh channel on the transport and owns one call
/// context. `Req` and `Resp` are the service's message enums; each method
/// takes a concrete request payload and yields concrete response payloads.
///
/// # Example
///
/// ```ignore
/// use duplex_rpc_client::Client;
///
/// let client = Client::builder(transport)
///     .timeout(Duration::from_secs(5))
///     .build();
///
/// let sum: SumResponse = client.call_unary("Sum", SumRequest { a: 3, b: 10 }).await?;
/// ```
#[derive(Debug, Clone)]
pub struct Client<T> {
    transport: T,
    default_timeout: Option<Duration>,
}

impl<T> Client<T> {
    /// Create a client with no default timeout.
    pub fn new(transport: T) -> Self {
        Self::from_parts(transport, None)
    }

    pub fn builder(transport: T) -> ClientBuilder<T> {
        ClientBuilder::new(transport)
    }

    pub(crate) fn from_parts(transport: T, default_timeout: Option<Duration>) -> Self {
        Self {
            transport,
            default_timeout,
        }
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn open<Req, Resp>(
        &self,
        method: &str,
        options: CallOptions,
    ) -> Result<MessageChannel<Req, Resp>, Status>
    where
        T: Transport<Req, Resp>,
    {
        let ctx = options.into_context(self.default_timeout);
        self.transport.open(method, ctx)
    }

    /// Make a unary call: one request, one result.
    pub async fn call_unary<Req, Resp, M, R>(&self, method: &str, request: M) -> Result<R, Status>
    where
        T: Transport<Req, Resp>,
        M: Into<Req>,
        R: TryFrom<Resp>,
    {
        self.call_unary_with_options::<Req, Resp, M, R>(method, request, CallOptions::new())
            .await
    }

    /// Make a unary call with per-call options.
    pub async fn call_unary_with_options<Req, Resp, M, R>(
        &self,
        method: &str,
        request: M,
        options: CallOptions,
    ) -> Result<R, Status>
    where
        T: Transport<Req, Resp>,
        M: Into<Req>,
        R: TryFrom<Resp>,
    {
        let call = self.unary::<Req, Resp, M, R>(method, request, options);
        instrument(call, method, "unary").await
    }

    async fn unary<Req, Resp, M, R>(
        &self,
        method: &str,
        request: M,
        options: CallOptions,
    ) -> Result<R, Status>
    where
        T: Transport<Req, Resp>,
        M: Into<Req>,
        R: TryFrom<Resp>,
    {
        let mut channel = self.open::<Req, Resp>(method, options)?;
        send_request(&mut channel, request).await?;
        match channel.recv_as::<R>().await? {
            Some(response) => Ok(response),
            None => Err(Status::invalid_state("call ended without a result")),
        }
    }

    /// Make a server-streaming call: one request, a lazy sequence of
    /// responses.
    pub async fn call_server_stream<Req, Resp, M, R>(
        &self,
        method: &str,
        request: M,
    ) -> Result<Streaming<R>, Status>
    where
        T: Transport<Req, Resp>,
        Resp: Send + 'static,
        M: Into<Req>,
        R: TryFrom<Resp> + Send + 'static,
    {
        self.call_server_stream_with_options::<Req, Resp, M, R>(method, request, CallOptions::new())
            .await
    }

    /// Make a server-streaming call with per-call options.
    pub async fn call_server_stream_with_options<Req, Resp, M, R>(
        &self,
        method: &str,
        request: M,
        options: CallOptions,
    ) -> Result<Streaming<R>, Status>
    where
        T: Transport<Req, Resp>,
        Resp: Send + 'static,
        M: Into<Req>,
        R: TryFrom<Resp> + Send + 'static,
    {
        let call = self.server_stream::<Req, Resp, M, R>(method, request, options);
        instrument(call, method, "server_stream").await
    }

    async fn server_stream<Req, Resp, M, R>(
        &self,
        method: &str,
        request: M,
        options: CallOptions,
    ) -> Result<Streaming<R>, Status>
    where
        T: Transport<Req, Resp>,
        Resp: Send + 'static,
        M: Into<Req>,
        R: TryFrom<Resp> + Send + 'static,
    {
        let mut channel = self.open::<Req, Resp>(method, options)?;
        send_request(&mut channel, request).await?;
        let (_sender, receiver) = channel.split();
        Ok(Streaming::new(receiver))
    }

    /// Start a client-streaming call. Send requests on the returned handle,
    /// then close it to receive the result.
    pub fn call_client_stream<Req, Resp, R>(
        &self,
        method: &str,
    ) -> Result<ClientStreamCall<Req, Resp, R>, Status>
    where
        T: Transport<Req, Resp>,
        R: TryFrom<Resp>,
    {
        self.call_client_stream_with_options::<Req, Resp, R>(method, CallOptions::new())
    }

    /// Start a client-streaming call with per-call options.
    pub fn call_client_stream_with_options<Req, Resp, R>(
        &self,
        method: &str,
        options: CallOptions,
    ) -> Result<ClientStreamCall<Req, Resp, R>, Status>
    where
        T: Transport<Req, Resp>,
        R: TryFrom<Resp>,
    {
        #[cfg(feature = "tracing")]
        let _span = call_span(method, "client_stream").entered();

        let channel = self.open::<Req, Resp>(method, options)?;
        Ok(ClientStreamCall::new(channel))
    }

    /// Start a bidirectional call.
    pub fn call_bidi_stream<Req, Resp, R>(&self, method: &str) -> Result<BidiCall<Req, R>, Status>
    where
        T: Transport<Req, Resp>,
        Resp: Send + 'static,
        R: TryFrom<Resp> + Send + 'static,
    {
        self.call_bidi_stream_with_options::<Req, Resp, R>(method, CallOptions::new())
    }

    /// Start a bidirectional call with per-call options.
    pub fn call_bidi_stream_with_options<Req, Resp, R>(
        &self,
        method: &str,
        options: CallOptions,
    ) -> Result<BidiCall<Req, R>, Status>
    where
        T: Transport<Req, Resp>,
        Resp: Send + 'static,
        R: TryFrom<Resp> + Send + 'static,
    {
        #[cfg(feature = "tracing")]
        let _span = call_span(method, "bidi_stream").entered();

        let channel = self.open::<Req, Resp>(method, options)?;
        Ok(BidiCall::new(channel))
    }
}

/// Send the single request of a call and half-close.
async fn send_request<Req, Resp, M: Into<Req>>(
    channel: &mut MessageChannel<Req, Resp>,
    request: M,
) -> Result<(), Status> {
    let sent = match channel.send(request).await {
        Ok(()) => channel.close().await,
        Err(status) => Err(status),
    };
    match sent {
        Ok(()) => Ok(()),
        Err(status) => Err(surface(channel.receiver(), status).await),
    }
}

#[cfg(feature = "tracing")]
fn call_span(method: &str, kind: &'static str) -> tracing::Span {
    tracing::info_span!(
        "rpc.call",
        rpc.method = %method,
        rpc.type = kind,
        otel.kind = "client",
    )
}

#[cfg(feature = "tracing")]
async fn instrument<F: Future>(call: F, method: &str, kind: &'static str) -> F::Output {
    use tracing::Instrument;
    call.instrument(call_span(method, kind)).await
}

#[cfg(not(feature = "tracing"))]
async fn instrument<F: Future>(call: F, _method: &str, _kind: &'static str) -> F::Output {
    call.await
}
