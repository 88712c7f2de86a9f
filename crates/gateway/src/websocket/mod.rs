//! Real-time coordination over WebSockets
//!
//! Tracks who is connected, what they are doing and which room they occupy,
//! and relays call negotiation between them.
//!
//! # Architecture
//!
//! - **Registry**: identity to live connections mapping
//! - **Presence**: per-identity status machine and its critical section
//! - **Admission**: room capacity and single-room occupancy
//! - **Signaling**: call lifecycle and opaque negotiation relay
//! - **Dispatcher**: global, per-identity and per-room fan-out
//! - **Handler**: Axum upgrade route, heartbeats and event routing
//! - **Events**: closed event families for client/server communication

pub mod admission;
pub mod channels;
pub mod connection;
pub mod dispatcher;
pub mod events;
pub mod handler;
pub mod presence;
pub mod registry;
pub mod signaling;
pub mod state;

pub use handler::ws_handler;
pub use state::{Coordinator, CoordinatorStats};
