//! The `client` module defines the relay's view of one attached client.
//!
//! A [`ConnectionHandle`] is the send capability the broker holds for a
//! connection: a bounded outbound queue plus a liveness flag. The transport
//! owns the matching [`OutboundQueue`] and drains it into the socket.

pub mod handle;
pub use handle::{ConnectionHandle, ConnectionId, OutboundQueue, SendAttempt};
