//! Observability infrastructure for the session analyzer
//!
//! Provides:
//! - Prometheus metrics (run outcomes, run duration, frame and feedback counts)
//! - Structured JSON logging of run lifecycle events with tracing

use crate::models::{AnalysisResult, Session, SessionMetrics};
use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for whole-run durations (in seconds)
const RUN_DURATION_BUCKETS: &[f64] = &[
    0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AnalyzerMetricsInner> = OnceLock::new();

struct AnalyzerMetricsInner {
    runs_submitted: IntCounter,
    runs_rejected: IntCounter,
    runs_completed: IntCounter,
    runs_failed: IntCounter,
    runs_in_flight: IntGauge,
    run_duration_seconds: Histogram,
    frames_sampled: IntCounter,
    frames_without_pose: IntCounter,
    feedback_events: IntCounter,
    delivery_failures: IntCounter,
    upload_failures: IntCounter,
}

impl AnalyzerMetricsInner {
    fn new() -> Self {
        Self {
            runs_submitted: register_int_counter!(
                "session_analyzer_runs_submitted_total",
                "Analysis runs accepted for processing"
            )
            .expect("Failed to register runs_submitted_total"),

            runs_rejected: register_int_counter!(
                "session_analyzer_runs_rejected_total",
                "Analysis requests rejected by the worker pool"
            )
            .expect("Failed to register runs_rejected_total"),

            runs_completed: register_int_counter!(
                "session_analyzer_runs_completed_total",
                "Analysis runs that produced metrics"
            )
            .expect("Failed to register runs_completed_total"),

            runs_failed: register_int_counter!(
                "session_analyzer_runs_failed_total",
                "Analysis runs that ended in failed status"
            )
            .expect("Failed to register runs_failed_total"),

            runs_in_flight: register_int_gauge!(
                "session_analyzer_active_runs",
                "Analysis runs queued or executing"
            )
            .expect("Failed to register active_runs"),

            run_duration_seconds: register_histogram!(
                "session_analyzer_run_duration_seconds",
                "Wall time of one analysis run",
                RUN_DURATION_BUCKETS.to_vec()
            )
            .expect("Failed to register run_duration_seconds"),

            frames_sampled: register_int_counter!(
                "session_analyzer_frames_sampled_total",
                "Sampled frames passed to the pose oracle"
            )
            .expect("Failed to register frames_sampled_total"),

            frames_without_pose: register_int_counter!(
                "session_analyzer_frames_without_pose_total",
                "Sampled frames where no pose was detected"
            )
            .expect("Failed to register frames_without_pose_total"),

            feedback_events: register_int_counter!(
                "session_analyzer_feedback_events_total",
                "Coaching feedback events emitted"
            )
            .expect("Failed to register feedback_events_total"),

            delivery_failures: register_int_counter!(
                "session_analyzer_delivery_failures_total",
                "Results the persistence service did not accept"
            )
            .expect("Failed to register delivery_failures_total"),

            upload_failures: register_int_counter!(
                "session_analyzer_upload_failures_total",
                "Annotated media uploads that failed"
            )
            .expect("Failed to register upload_failures_total"),
        }
    }
}

/// Handle to the process-wide analyzer metrics.
///
/// Clones share the same underlying Prometheus series.
#[derive(Clone)]
pub struct AnalyzerMetrics {
    _private: (),
}

impl Default for AnalyzerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalyzerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AnalyzerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AnalyzerMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn inc_runs_submitted(&self) {
        self.inner().runs_submitted.inc();
    }

    pub fn inc_runs_rejected(&self) {
        self.inner().runs_rejected.inc();
    }

    pub fn set_runs_in_flight(&self, count: i64) {
        self.inner().runs_in_flight.set(count);
    }

    /// Record the outcome and duration of a finished run
    pub fn observe_run(&self, result: &AnalysisResult, duration_secs: f64) {
        if result.is_completed() {
            self.inner().runs_completed.inc();
        } else {
            self.inner().runs_failed.inc();
        }
        self.inner().run_duration_seconds.observe(duration_secs);
    }

    pub fn inc_frames_sampled(&self, pose_detected: bool) {
        self.inner().frames_sampled.inc();
        if !pose_detected {
            self.inner().frames_without_pose.inc();
        }
    }

    pub fn add_feedback_events(&self, count: usize) {
        self.inner().feedback_events.inc_by(count as u64);
    }

    pub fn inc_delivery_failures(&self) {
        self.inner().delivery_failures.inc();
    }

    pub fn inc_upload_failures(&self) {
        self.inner().upload_failures.inc();
    }
}

/// Structured logger for run lifecycle events
#[derive(Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn log_startup(&self, version: &str, port: u16) {
        info!(
            event = "service_started",
            service = %self.service,
            version = %version,
            port = port,
            "Session analyzer started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            service = %self.service,
            reason = %reason,
            "Session analyzer shutting down"
        );
    }

    pub fn log_run_started(&self, session: &Session) {
        info!(
            event = "run_started",
            service = %self.service,
            session_id = %session.session_id,
            discipline = %session.discipline,
            video_url = %session.video_url,
            "Starting session analysis"
        );
    }

    pub fn log_run_completed(
        &self,
        session: &Session,
        metrics: &SessionMetrics,
        feedback_events: usize,
        frames: u64,
    ) {
        info!(
            event = "run_completed",
            service = %self.service,
            session_id = %session.session_id,
            discipline = %session.discipline,
            frames = frames,
            guard_stability = metrics.guard_stability,
            takedown_speed = metrics.takedown_speed,
            strike_volume = metrics.strike_volume,
            feedback_events = feedback_events,
            "Session analysis complete"
        );
    }

    pub fn log_run_failed(&self, session: &Session, kind: &str, details: &str) {
        warn!(
            event = "run_failed",
            service = %self.service,
            session_id = %session.session_id,
            error_kind = %kind,
            details = %details,
            "Session analysis failed"
        );
    }

    pub fn log_delivery_failed(&self, session_id: &str, details: &str) {
        warn!(
            event = "delivery_failed",
            service = %self.service,
            session_id = %session_id,
            details = %details,
            "Could not hand results to the persistence service"
        );
    }

    pub fn log_upload_failed(&self, session_id: &str, details: &str) {
        warn!(
            event = "upload_failed",
            service = %self.service,
            session_id = %session_id,
            details = %details,
            "Annotated media upload failed, continuing without URL"
        );
    }
}
