//! The `transport` module turns WebSocket connections into broker operations.
//!
//! It routes request paths to topics, runs the per-connection lifecycle
//! (attach on open, relay on message, detach on close), and hosts the server
//! loop itself.

pub mod lifecycle;
pub mod router;
pub mod websocket;

pub use lifecycle::{Connection, ConnectionState};
pub use router::Router;
pub use websocket::{bind, run, serve};
