//! Hand-off of run outcomes to downstream services
//!
//! This module provides:
//! - `PersistenceClient`: stores the terminal `AnalysisResult` of a session
//! - `MediaStore`: publishes annotated media and returns its public URL
//!
//! Both are called at most once per run and are never retried; failures are
//! reported to the caller, which logs them and carries on.

mod media;
mod persistence;

pub use media::{DisabledMediaStore, HttpMediaStore, UploadResponse};
pub use persistence::{DiscardingPersistence, HttpPersistenceClient};

use crate::error::Result;
use crate::models::AnalysisResult;
use async_trait::async_trait;
use std::path::Path;

/// Stores the outcome of a run, keyed by session ID
#[async_trait]
pub trait PersistenceClient: Send + Sync {
    async fn deliver(&self, session_id: &str, result: &AnalysisResult) -> Result<()>;
}

/// Publishes a local media file
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Whether uploads are configured at all
    fn is_enabled(&self) -> bool {
        true
    }

    /// Upload the file and return its public URL
    async fn upload(&self, path: &Path, session_id: &str) -> Result<String>;
}
