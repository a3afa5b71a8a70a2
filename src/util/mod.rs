//! Utility types and functions shared by the baker.
//!
//! - [`Error`] / [`Result`] - Error handling
//! - Math type re-exports from glam plus [`Aabb`] and [`Ray`]
//! - Deterministic position-seeded sampling

mod error;
mod math;
pub mod rng;

pub use error::*;
pub use math::*;
