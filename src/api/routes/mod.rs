//! Route handlers for the scoring API.
//!
//! - [`health`]: liveness and readiness
//! - [`predict`]: single and batch scoring
//! - [`model`]: model inspection, threshold management, evaluation, reload
//! - [`metrics`]: serving counters

pub mod health;
pub mod metrics;
pub mod model;
pub mod predict;
