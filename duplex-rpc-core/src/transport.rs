//! The transport collaborator seam.

use crate::channel::MessageChannel;
use crate::context::CallContext;
use crate::error::Status;

/// Supplies an established, ordered, reliable channel per call.
///
/// A transport owns connection setup and any wire encoding. It reports its
/// own failures as `Transport` errors, distinct from application errors
/// carried inside the call.
///
/// The returned channel is the caller's endpoint: it sends `Req` and
/// receives `Resp`. The call context is shared with the serving endpoint.
pub trait Transport<Req, Resp>: Send + Sync {
    /// Open a channel for one call of `method`.
    fn open(&self, method: &str, ctx: CallContext) -> Result<MessageChannel<Req, Resp>, Status>;
}

impl<T, Req, Resp> Transport<Req, Resp> for std::sync::Arc<T>
where
    T: Transport<Req, Resp> + ?Sized,
{
    fn open(&self, method: &str, ctx: CallContext) -> Result<MessageChannel<Req, Resp>, Status> {
        (**self).open(method, ctx)
    }
}
