//! Charging session statistics.
//!
//! Classifies sessions as OK/NOK under the request filters and rolls them up
//! globally, per site and per moment. Everything here is pure computation
//! over one fetched batch.

mod aggregate;
mod filter;
mod pivot;

pub use aggregate::*;
pub use filter::*;
pub use pivot::*;
