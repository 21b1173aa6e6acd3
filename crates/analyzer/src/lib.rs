//! Session analyzer service
//!
//! HTTP trigger, health and metrics endpoints in front of the analysis
//! worker pool, plus the configuration that wires them together.

pub mod api;
pub mod config;
