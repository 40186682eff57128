//! Client builder.
//!
//! Provides a fluent API for configuring and building a [`Client`].

use std::time::Duration;

use crate::client::Client;

/// Builder for creating a [`Client`].
///
/// # Example
///
/// ```ignore
/// use duplex_rpc_client::ClientBuilder;
/// use std::time::Duration;
///
/// let client = ClientBuilder::new(transport)
///     .timeout(Duration::from_secs(10))
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ClientBuilder<T> {
    transport: T,
    /// Default timeout for RPC calls.
    default_timeout: Option<Duration>,
}

impl<T> ClientBuilder<T> {
    /// Create a new builder over `transport`.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            default_timeout: None,
        }
    }

    /// Set the default timeout for every call.
    ///
    /// A per-call timeout from [`CallOptions`](crate::CallOptions) can only
    /// shorten it.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Build the client.
    pub fn build(self) -> Client<T> {
        Client::from_parts(self.transport, self.default_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_timeout() {
        let client = ClientBuilder::new(()).timeout(Duration::from_secs(3)).build();
        assert_eq!(client.default_timeout(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_builder_defaults() {
        let client = ClientBuilder::new(()).build();
        assert_eq!(client.default_timeout(), None);
    }
}
