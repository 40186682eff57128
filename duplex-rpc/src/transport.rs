//! In-process transport.

use std::fmt;
use std::sync::Arc;

use duplex_rpc_core::{
    CallContext, DEFAULT_CHANNEL_CAPACITY, MessageChannel, Status, Transport, duplex,
};
use tokio::runtime::Handle;

use crate::router::Router;

/// A [`Transport`] that serves every call from a [`Router`] in the same
/// process.
///
/// Each `open` creates a fresh duplex channel and spawns the router on the
/// server end. Calls run on the ambient tokio runtime.
pub struct LocalTransport<Req, Resp> {
    router: Arc<Router<Req, Resp>>,
    capacity: usize,
}

impl<Req, Resp> LocalTransport<Req, Resp> {
    pub fn new(router: Router<Req, Resp>) -> Self {
        Self::from_shared(Arc::new(router))
    }

    /// Share a router that is also used elsewhere.
    pub fn from_shared(router: Arc<Router<Req, Resp>>) -> Self {
        Self {
            router,
            capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Set how many frames each direction buffers before a send waits.
    ///
    /// Default is 16.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn router(&self) -> &Router<Req, Resp> {
        &self.router
    }
}

impl<Req, Resp> Clone for LocalTransport<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            router: self.router.clone(),
            capacity: self.capacity,
        }
    }
}

impl<Req, Resp> fmt::Debug for LocalTransport<Req, Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTransport")
            .field("router", &self.router)
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl<Req, Resp> Transport<Req, Resp> for LocalTransport<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    fn open(&self, method: &str, ctx: CallContext) -> Result<MessageChannel<Req, Resp>, Status> {
        if self.router.kind(method).is_none() {
            tracing::warn!(target: "duplex_rpc", method, "call to unknown method");
            return Err(Status::unimplemented(format!(
                "method `{method}` is not registered"
            )));
        }
        let runtime = Handle::try_current()
            .map_err(|e| Status::transport(format!("no runtime to serve the call: {e}")))?;

        let (client, server) = duplex(&ctx, self.capacity);
        let router = self.router.clone();
        let method = method.to_owned();
        runtime.spawn(async move {
            // Outcomes are logged by the router.
            let _ = router.serve(&method, server).await;
        });
        Ok(client)
    }
}
