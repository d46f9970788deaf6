//! Database module for chargeboard.
//!
//! Provides SQLite storage of charging sessions with an embedded schema.

mod models;
mod store;

pub use models::*;
pub use store::*;
