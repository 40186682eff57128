//! Handles for calls whose requests are sent after the call starts.

use std::marker::PhantomData;

use duplex_rpc_core::{CallContext, FrameReceiver, FrameSender, MessageChannel, Status};

use crate::streaming::Streaming;

/// Read what the server reported after a send failed on a broken channel.
///
/// The server closes its end right after sending a failure, so a local send
/// can fail with a transport error while the real reason is already queued
/// inbound.
pub(crate) async fn surface<In>(receiver: &mut FrameReceiver<In>, status: Status) -> Status {
    if !status.is_transport() {
        return status;
    }
    loop {
        match receiver.recv().await {
            Ok(Some(_)) => continue,
            Ok(None) => return status,
            Err(reported) => return reported,
        }
    }
}

/// An open client-streaming call.
///
/// Send any number of requests, then [`close`](Self::close) to receive the
/// single result. Dropping the call before closing it cancels the call.
pub struct ClientStreamCall<Req, Resp, R> {
    channel: MessageChannel<Req, Resp>,
    finished: bool,
    _response: PhantomData<fn() -> R>,
}

impl<Req, Resp, R> ClientStreamCall<Req, Resp, R>
where
    R: TryFrom<Resp>,
{
    pub(crate) fn new(channel: MessageChannel<Req, Resp>) -> Self {
        Self {
            channel,
            finished: false,
            _response: PhantomData,
        }
    }

    pub fn context(&self) -> &CallContext {
        self.channel.context()
    }

    /// Send one request.
    ///
    /// If the server already ended the call, the error it reported is
    /// returned instead of a transport error.
    pub async fn send<M: Into<Req>>(&mut self, request: M) -> Result<(), Status> {
        match self.channel.send(request).await {
            Ok(()) => Ok(()),
            Err(status) => {
                self.finished = true;
                Err(surface(self.channel.receiver(), status).await)
            }
        }
    }

    /// Signal end of input and wait for the result.
    pub async fn close(mut self) -> Result<R, Status> {
        self.finished = true;
        if let Err(status) = self.channel.close().await {
            return Err(surface(self.channel.receiver(), status).await);
        }
        match self.channel.recv_as::<R>().await? {
            Some(response) => Ok(response),
            None => Err(Status::invalid_state("call ended without a result")),
        }
    }

    /// Cancel the call.
    pub fn cancel(mut self) {
        self.finished = true;
        self.channel.context().cancel();
    }
}

impl<Req, Resp, R> Drop for ClientStreamCall<Req, Resp, R> {
    fn drop(&mut self) {
        if !self.finished {
            self.channel.context().cancel();
        }
    }
}

/// Outbound half of a bidirectional call.
#[derive(Debug)]
pub struct RequestSink<Req> {
    sender: FrameSender<Req>,
}

impl<Req> RequestSink<Req> {
    pub fn context(&self) -> &CallContext {
        self.sender.context()
    }

    /// Send one request. Fails once the call is cancelled, past its deadline,
    /// or after [`close`](Self::close).
    pub async fn send<M: Into<Req>>(&mut self, request: M) -> Result<(), Status> {
        self.sender.send(request).await
    }

    /// Half-close: no more requests follow. Responses keep arriving.
    pub async fn close(&mut self) -> Result<(), Status> {
        self.sender.close().await
    }
}

/// An open bidirectional call.
///
/// Requests and responses flow independently; either side may half-close
/// while the other keeps going. [`split`](Self::split) hands the two halves to
/// different tasks.
pub struct BidiCall<Req, R> {
    requests: RequestSink<Req>,
    responses: Streaming<R>,
}

impl<Req, R> BidiCall<Req, R> {
    pub(crate) fn new<Resp>(channel: MessageChannel<Req, Resp>) -> Self
    where
        Resp: Send + 'static,
        R: TryFrom<Resp> + Send + 'static,
    {
        let (sender, receiver) = channel.split();
        Self {
            requests: RequestSink { sender },
            responses: Streaming::new(receiver),
        }
    }

    pub fn context(&self) -> &CallContext {
        self.requests.context()
    }

    /// See [`RequestSink::send`].
    pub async fn send<M: Into<Req>>(&mut self, request: M) -> Result<(), Status> {
        self.requests.send(request).await
    }

    /// See [`RequestSink::close`].
    pub async fn close_send(&mut self) -> Result<(), Status> {
        self.requests.close().await
    }

    pub fn requests(&mut self) -> &mut RequestSink<Req> {
        &mut self.requests
    }

    pub fn responses(&mut self) -> &mut Streaming<R> {
        &mut self.responses
    }

    /// Split into independently driven halves.
    pub fn split(self) -> (RequestSink<Req>, Streaming<R>) {
        (self.requests, self.responses)
    }
}
