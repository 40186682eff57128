//! Server-side coordination for the call shapes.
//!
//! - [`unary`]: one request, one result
//! - [`server_stream`]: one request, a driven sequence of responses
//! - [`client_stream`]: a folded sequence of requests, one result
//!
//! Bidirectional calls run on [`duplex_rpc_core::Pump`].

pub mod client_stream;
pub mod server_stream;
pub mod unary;

pub use client_stream::{Aggregate, aggregate};
pub use server_stream::{ServerStreamDriver, StreamOutcome, StreamSummary};
pub use unary::serve_unary;

use duplex_rpc_core::{FrameSender, Status};

/// Report `status` to the peer as the last outbound event, then hand it back.
///
/// Nothing is sent for cancellation or transport failures: the canceller
/// already knows, and a broken channel cannot carry it.
pub(crate) async fn report<T>(sender: &mut FrameSender<T>, status: Status) -> Status {
    if status.is_cancelled() || status.is_transport() {
        return status;
    }
    if let Err(err) = sender.fail(status.clone()).await {
        tracing::debug!(
            target: "duplex_rpc",
            status = %status,
            error = %err,
            "failure could not be reported to the peer"
        );
    }
    status
}
