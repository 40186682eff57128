//! # duplex-rpc
//!
//! Server side of a small RPC framework built around one duplex channel per
//! call. Every call has one of four shapes:
//!
//! - **Unary**: one request, one result ([`handler::serve_unary`])
//! - **Server streaming**: one request, a driven sequence of responses
//!   ([`handler::ServerStreamDriver`])
//! - **Client streaming**: a sequence of requests folded into one result
//!   ([`handler::Aggregate`])
//! - **Bidirectional**: independent inbound and outbound loops
//!   ([`Pump`])
//!
//! A [`Router`] maps method names to these shapes and a [`LocalTransport`]
//! serves a router in-process. The call-level types (context, channel,
//! errors) live in `duplex-rpc-core` and are re-exported here.

pub mod handler;
pub mod router;
pub mod transport;

pub use duplex_rpc_core::{
    CallContext, DirectionState, ErrorKind, Frame, FrameReceiver, FrameSender, MessageChannel,
    Pump, PumpReport, Status, Transport, duplex, rpc_messages,
};
pub use router::{MethodKind, Router};
pub use transport::LocalTransport;

// Re-export the stream toolkit used by handler signatures.
pub use futures;

pub mod prelude {
    //! The types most services need.
    pub use crate::handler::{Aggregate, ServerStreamDriver};
    pub use crate::{
        CallContext, LocalTransport, MessageChannel, MethodKind, Pump, PumpReport, Router,
        Status,
    };
}
