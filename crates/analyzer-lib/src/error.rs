//! Error taxonomy for analysis runs

use thiserror::Error;

/// Failure raised at a collaborator boundary
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The video could not be opened or decoding failed
    #[error("video source unavailable: {0}")]
    SourceUnavailable(String),

    /// The pose oracle could not be created or rejected a frame
    #[error("pose oracle failure: {0}")]
    OracleFailure(String),

    /// Annotated media could not be written
    #[error("annotation export failed: {0}")]
    Export(String),

    /// The persistence or storage service could not be reached
    #[error("delivery failed: {0}")]
    DeliveryFailure(String),

    /// A recorded landmark track is malformed
    #[error("invalid landmark track: {0}")]
    InvalidTrack(String),
}

impl AnalysisError {
    /// Whether this error aborts the run
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AnalysisError::SourceUnavailable(_)
                | AnalysisError::OracleFailure(_)
                | AnalysisError::InvalidTrack(_)
        )
    }

    /// Short label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::SourceUnavailable(_) => "source_unavailable",
            AnalysisError::OracleFailure(_) => "oracle_failure",
            AnalysisError::Export(_) => "export",
            AnalysisError::DeliveryFailure(_) => "delivery_failure",
            AnalysisError::InvalidTrack(_) => "invalid_track",
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
