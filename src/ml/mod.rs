//! Evaluation helpers for the developer tools.

pub mod metrics;
