//! Huddle Shared Types and Utilities
//!
//! This crate contains the domain types, errors, and persistence seam shared
//! by the Huddle gateway.

pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use db::*;
pub use error::*;
pub use store::{MemoryStore, PgStore, PresenceStore};
pub use types::*;
