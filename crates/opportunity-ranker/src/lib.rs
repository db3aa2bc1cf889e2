//! Elevator modernization opportunity ranking.
//!
//! Buildings, their elevators, and their violations are scored into a bounded
//! opportunity score and priority tier, then served through a filtered,
//! paginated retrieval surface.

pub mod buildings;
pub mod config;
pub mod error;
pub mod telemetry;
