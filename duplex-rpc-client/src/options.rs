//! Call options for per-call configuration.

use std::time::Duration;

use duplex_rpc_core::{CallContext, compute_effective_timeout};

/// Options for configuring individual RPC calls.
///
/// # Example
///
/// ```
/// use duplex_rpc_client::CallOptions;
/// use std::time::Duration;
///
/// let options = CallOptions::new().timeout(Duration::from_secs(5));
/// assert_eq!(options.get_timeout(), Some(Duration::from_secs(5)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Timeout for this specific call.
    /// If set, the smaller of this and the client's default timeout applies.
    pub(crate) timeout: Option<Duration>,
    /// Caller-owned context for this call.
    pub(crate) context: Option<CallContext>,
}

impl CallOptions {
    /// Create new default call options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the timeout for this call.
    ///
    /// The deadline is fixed when the call starts. Both ends of the call
    /// observe it at every receive and before every send.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Get the configured timeout, if any.
    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Run the call under a context the caller already holds, so it can be
    /// cancelled from elsewhere.
    ///
    /// The context's own deadline is used as-is; [`timeout`](Self::timeout)
    /// and the client default are ignored.
    pub fn context(mut self, ctx: CallContext) -> Self {
        self.context = Some(ctx);
        self
    }

    /// Build the context for one call.
    pub(crate) fn into_context(self, default_timeout: Option<Duration>) -> CallContext {
        match self.context {
            Some(ctx) => ctx,
            None => {
                CallContext::from_timeout(compute_effective_timeout(default_timeout, self.timeout))
            }
        }
    }
}
