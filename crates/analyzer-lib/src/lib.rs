//! Analyzer library for martial-arts training video analysis
//!
//! This crate provides the core functionality for:
//! - Fixed-stride frame sampling against an external pose oracle
//! - Running aggregation of guard, level-change and extension signals
//! - Score and coaching summary synthesis
//! - Result delivery, annotated media export and upload
//! - Background run execution, health checks and observability

pub mod accumulator;
pub mod annotation;
pub mod delivery;
pub mod error;
pub mod geometry;
pub mod health;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod sampler;
pub mod summary;
pub mod worker;

pub use error::{AnalysisError, Result};
pub use health::{ComponentHealth, ComponentStatus, HealthRegistry, HealthReport, Readiness};
pub use models::*;
pub use observability::{AnalyzerMetrics, StructuredLogger};
pub use pipeline::{Analyzer, AnalyzerBuilder};
pub use worker::{SubmitError, WorkerConfig, WorkerPool};
