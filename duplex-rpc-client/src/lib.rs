//! Client for duplex-rpc services.
//!
//! This crate provides the caller-facing side of a duplex-rpc call over any
//! [`Transport`]: the transport opens one channel per call and the client
//! drives it in one of four shapes.
//!
//! ## Features
//!
//! - Unary calls ([`Client::call_unary`])
//! - Server streaming calls, returning a lazy [`Streaming`] sequence
//! - Client streaming calls ([`ClientStreamCall`]: `send`* then `close`)
//! - Bidirectional calls ([`BidiCall`]: independent send and receive)
//! - Default and per-call deadlines ([`ClientBuilder::timeout`],
//!   [`CallOptions::timeout`])
//! - Cancellation by dropping or cancelling an unfinished call
//!
//! ## Example
//!
//! ```ignore
//! use duplex_rpc_client::Client;
//! use futures::StreamExt;
//!
//! let client = Client::new(transport);
//!
//! let mut factors = client
//!     .call_server_stream::<_, _, _, PrimeFactor>("PrimeNumberDecomposition", Number(28))
//!     .await?;
//! while let Some(factor) = factors.next().await {
//!     println!("{}", factor?.value);
//! }
//! ```
//!
//! ## Tracing
//!
//! With the `tracing` feature every call runs inside an `rpc.call` span
//! carrying `rpc.method` and `rpc.type`.

mod builder;
mod call;
mod client;
mod options;
mod streaming;

pub use builder::ClientBuilder;
pub use call::{BidiCall, ClientStreamCall, RequestSink};
pub use client::Client;
pub use options::CallOptions;
pub use streaming::Streaming;

// Re-export core types used in client signatures
pub use duplex_rpc_core::{CallContext, ErrorKind, Status, Transport};
