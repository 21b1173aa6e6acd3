//! Service configuration

use analyzer_lib::sampler::OracleConfig;
use analyzer_lib::worker::WorkerConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Service configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Service name attached to lifecycle log records
    pub service_name: String,

    /// Port for the trigger, health and metrics endpoints
    pub api_port: u16,

    /// Base URL of the session persistence service
    pub persistence_url: String,

    /// Upload endpoint for annotated media; uploads are disabled when unset
    pub media_upload_url: Option<String>,

    /// Storage folder passed to the upload endpoint
    pub media_folder: String,

    /// Where annotation files are written
    pub output_dir: PathBuf,

    /// Write per-frame annotation overlays
    pub annotate: bool,

    pub max_concurrent_runs: usize,
    pub queue_capacity: usize,

    /// Timeout for persistence and upload requests, in seconds
    pub request_timeout_secs: u64,

    /// Poses scored below this are treated as absent
    pub min_detection_confidence: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            service_name: "session-analyzer".to_string(),
            api_port: 5001,
            persistence_url: "http://127.0.0.1:5000/api/sessions".to_string(),
            media_upload_url: None,
            media_folder: "mma_sessions/annotated".to_string(),
            output_dir: PathBuf::from("."),
            annotate: true,
            max_concurrent_runs: 4,
            queue_capacity: 64,
            request_timeout_secs: 30,
            min_detection_confidence: 0.5,
        }
    }
}

impl AnalyzerConfig {
    /// Load from `analyzer.toml` (optional) and `ANALYZER_*` environment variables.
    ///
    /// Invalid configuration is logged and replaced by the defaults.
    pub fn load() -> Self {
        let loaded = config::Config::builder()
            .add_source(config::File::with_name("analyzer").required(false))
            .add_source(config::Environment::with_prefix("ANALYZER").try_parsing(true))
            .build()
            .and_then(|c| c.try_deserialize::<AnalyzerConfig>());

        match loaded {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Invalid configuration, using defaults");
                AnalyzerConfig::default()
            }
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn oracle(&self) -> OracleConfig {
        OracleConfig {
            min_detection_confidence: self.min_detection_confidence,
        }
    }

    pub fn worker(&self) -> WorkerConfig {
        WorkerConfig {
            max_concurrent_runs: self.max_concurrent_runs,
            queue_capacity: self.queue_capacity,
        }
    }
}
