//! Shared building blocks: geometry, tuning constants and the aggregated
//! error type.
//!
//! Nothing here touches pixels or tools.

pub mod config;
pub mod errors;
pub mod geometry;
