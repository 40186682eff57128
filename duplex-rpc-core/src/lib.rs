//! Core call types for duplex-rpc.
//!
//! This crate provides the types shared by the server (`duplex-rpc`) and
//! client (`duplex-rpc-client`) crates.
//!
//! ## Modules
//!
//! - [`error`]: Error kinds, status codes and the [`Status`] error type
//! - [`context`]: Per-call deadline and cancellation
//! - [`frame`]: Stream frames and the per-direction state machine
//! - [`channel`]: The duplex per-call message channel
//! - [`message`]: The [`rpc_messages!`] macro for request/response enums
//! - [`pump`]: Concurrent bidirectional stream driver
//! - [`transport`]: The transport seam that opens channels

pub mod channel;
pub mod context;
pub mod error;
pub mod frame;
pub mod message;
pub mod pump;
pub mod transport;

pub use channel::*;
pub use context::*;
pub use error::*;
pub use frame::*;
pub use pump::*;
pub use transport::*;
