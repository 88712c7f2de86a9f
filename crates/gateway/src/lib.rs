//! Huddle gateway library
//!
//! Real-time presence, room admission and call signaling for a virtual office.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod websocket;

pub use config::Config;
pub use error::{ApiError, ApiResult, CoordinatorError, CoordinatorResult};
pub use state::AppState;
pub use websocket::{Coordinator, CoordinatorStats};
