//! # pubsub-relay
//!
//! `pubsub-relay` is a minimal publish/subscribe relay over WebSockets. Each
//! topic is a URL path; every message a client sends on a topic is relayed,
//! unmodified, to every client connected to the same path.
//!
//! ## Core Modules
//!
//! - `broker`: topic registry, broadcast groups and the relay engine.
//! - `client`: the per-connection send handle the broker delivers through.
//! - `config`: loads server and relay settings.
//! - `transport`: WebSocket server, path routing and connection lifecycle.
//! - `utils`: error types and logging setup.

pub mod broker;
pub mod client;
pub mod config;
pub mod transport;
pub mod utils;
