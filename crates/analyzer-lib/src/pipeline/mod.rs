//! Analysis run orchestration
//!
//! An `Analyzer` owns the collaborators shared by every run and executes one
//! session at a time per call:
//!
//! 1. open the video and create a fresh pose oracle for the run
//! 2. walk the sampled frames through the `MetricAccumulator`, writing an
//!    overlay for each to the annotation sink
//! 3. publish the annotation file through the `MediaStore`
//! 4. synthesize the `AnalysisResult`
//! 5. (`run` only) hand the result to the `PersistenceClient` exactly once
//!
//! Frame processing is blocking and runs on the blocking thread pool. Runs
//! share no mutable state; everything a run accumulates lives on its own
//! stack.

use crate::accumulator::{MetricAccumulator, RunningAggregates};
use crate::annotation::{AnnotationFactory, NoopAnnotationFactory};
use crate::delivery::{DisabledMediaStore, DiscardingPersistence, MediaStore, PersistenceClient};
use crate::error::{AnalysisError, Result};
use crate::health::{components, HealthRegistry};
use crate::models::{AnalysisResult, FeedbackEvent, Session};
use crate::observability::{AnalyzerMetrics, StructuredLogger};
use crate::sampler::{OracleFactory, Sampler, VideoOpener};
use crate::summary;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

#[cfg(test)]
mod tests;

/// Everything the frame loop of a successful run produced
#[derive(Debug)]
struct FramePass {
    aggregates: RunningAggregates,
    feedback: Vec<FeedbackEvent>,
    decoded_frames: u64,
    annotation: Option<PathBuf>,
}

/// Collaborators used by the blocking part of a run
#[derive(Clone)]
struct FrameStage {
    opener: Arc<dyn VideoOpener>,
    oracles: Arc<dyn OracleFactory>,
    annotations: Arc<dyn AnnotationFactory>,
    metrics: AnalyzerMetrics,
}

impl FrameStage {
    fn process(&self, session: &Session) -> Result<FramePass> {
        let mut source = self.opener.open(&session.video_url)?;
        let metadata = source.metadata();
        let mut oracle = self.oracles.create(session)?;

        let mut sink = match self.annotations.create(session, &metadata) {
            Ok(sink) => Some(sink),
            Err(e) => {
                warn!(session_id = %session.session_id, error = %e, "Annotation export disabled for run");
                None
            }
        };

        let mut accumulator = MetricAccumulator::new(session.discipline, metadata.effective_fps());
        let walked = {
            let mut sampler = Sampler::new(source.as_mut(), oracle.as_mut());
            let mut failure = None;

            for item in &mut sampler {
                let sampled = match item {
                    Ok(sampled) => sampled,
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                };

                self.metrics
                    .inc_frames_sampled(sampled.sample.pose.is_some());
                accumulator.observe(&sampled.sample);

                let export_error = sink.as_mut().and_then(|s| {
                    s.write(
                        &sampled.frame,
                        sampled.sample.timestamp_ms,
                        sampled.sample.pose.as_ref(),
                    )
                    .err()
                });
                if let Some(e) = export_error {
                    warn!(session_id = %session.session_id, error = %e, "Annotation export stopped");
                    if let Some(partial) = sink.take() {
                        partial.discard();
                    }
                }
            }

            match failure {
                Some(e) => Err(e),
                None => Ok(sampler.decoded_frames()),
            }
        };

        oracle.close();
        let decoded_frames = match walked {
            Ok(decoded_frames) => decoded_frames,
            Err(e) => {
                if let Some(partial) = sink {
                    partial.discard();
                }
                return Err(e);
            }
        };

        let annotation = sink.and_then(|s| match s.finish() {
            Ok(path) => path,
            Err(e) => {
                warn!(session_id = %session.session_id, error = %e, "Annotation export could not be finished");
                None
            }
        });

        let (aggregates, feedback) = accumulator.finish();
        Ok(FramePass {
            aggregates,
            feedback,
            decoded_frames,
            annotation,
        })
    }
}

/// Executes analysis runs
pub struct Analyzer {
    frames: FrameStage,
    media: Arc<dyn MediaStore>,
    persistence: Arc<dyn PersistenceClient>,
    health: HealthRegistry,
    logger: StructuredLogger,
}

impl Analyzer {
    pub fn builder(
        opener: Arc<dyn VideoOpener>,
        oracles: Arc<dyn OracleFactory>,
    ) -> AnalyzerBuilder {
        AnalyzerBuilder {
            opener,
            oracles,
            annotations: Arc::new(NoopAnnotationFactory),
            media: Arc::new(DisabledMediaStore),
            persistence: Arc::new(DiscardingPersistence),
            health: HealthRegistry::new(),
            logger: StructuredLogger::new("session-analyzer"),
            metrics: AnalyzerMetrics::new(),
        }
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    pub fn metrics(&self) -> &AnalyzerMetrics {
        &self.frames.metrics
    }

    /// Analyze a session without delivering the result
    pub async fn evaluate(&self, session: &Session) -> AnalysisResult {
        let started = Instant::now();
        self.logger.log_run_started(session);

        let stage = self.frames.clone();
        let owned = session.clone();
        let pass = tokio::task::spawn_blocking(move || stage.process(&owned))
            .await
            .unwrap_or_else(|e| Err(AnalysisError::OracleFailure(format!("frame task aborted: {}", e))));

        let result = match pass {
            Ok(pass) => self.complete(session, pass).await,
            Err(e) => {
                self.logger.log_run_failed(session, e.kind(), &e.to_string());
                AnalysisResult::failed()
            }
        };

        self.frames
            .metrics
            .observe_run(&result, started.elapsed().as_secs_f64());
        result
    }

    /// Analyze a session and hand the result to the persistence service
    pub async fn run(&self, session: &Session) -> AnalysisResult {
        let result = self.evaluate(session).await;

        match self.persistence.deliver(&session.session_id, &result).await {
            Ok(()) => self.health.set_healthy(components::PERSISTENCE).await,
            Err(e) => {
                self.logger
                    .log_delivery_failed(&session.session_id, &e.to_string());
                self.frames.metrics.inc_delivery_failures();
                self.health
                    .set_degraded(components::PERSISTENCE, e.to_string())
                    .await;
            }
        }

        result
    }

    async fn complete(&self, session: &Session, pass: FramePass) -> AnalysisResult {
        let url = match pass.annotation {
            Some(path) => self.publish(session, path).await,
            None => String::new(),
        };

        let result = summary::synthesize(&pass.aggregates, pass.feedback, session.discipline, url);
        self.frames
            .metrics
            .add_feedback_events(result.feedback().len());

        if let Some(metrics) = &result.metrics {
            self.logger.log_run_completed(
                session,
                metrics,
                result.feedback().len(),
                pass.decoded_frames,
            );
        }
        debug!(
            session_id = %session.session_id,
            missing_pose_frames = pass.aggregates.missing_pose_frames(),
            "Frame pass summary"
        );

        result
    }

    /// Upload the annotation file; returns the locator to report
    async fn publish(&self, session: &Session, path: PathBuf) -> String {
        if !self.media.is_enabled() {
            return path.display().to_string();
        }

        match self.media.upload(&path, &session.session_id).await {
            Ok(url) => {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    debug!(path = %path.display(), error = %e, "Could not remove uploaded file");
                }
                self.health.set_healthy(components::MEDIA_STORE).await;
                url
            }
            Err(e) => {
                self.logger
                    .log_upload_failed(&session.session_id, &e.to_string());
                self.frames.metrics.inc_upload_failures();
                self.health
                    .set_degraded(components::MEDIA_STORE, e.to_string())
                    .await;
                String::new()
            }
        }
    }
}

pub struct AnalyzerBuilder {
    opener: Arc<dyn VideoOpener>,
    oracles: Arc<dyn OracleFactory>,
    annotations: Arc<dyn AnnotationFactory>,
    media: Arc<dyn MediaStore>,
    persistence: Arc<dyn PersistenceClient>,
    health: HealthRegistry,
    logger: StructuredLogger,
    metrics: AnalyzerMetrics,
}

impl AnalyzerBuilder {
    pub fn annotations(mut self, annotations: Arc<dyn AnnotationFactory>) -> Self {
        self.annotations = annotations;
        self
    }

    pub fn media_store(mut self, media: Arc<dyn MediaStore>) -> Self {
        self.media = media;
        self
    }

    pub fn persistence(mut self, persistence: Arc<dyn PersistenceClient>) -> Self {
        self.persistence = persistence;
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn metrics(mut self, metrics: AnalyzerMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn build(self) -> Analyzer {
        Analyzer {
            frames: FrameStage {
                opener: self.opener,
                oracles: self.oracles,
                annotations: self.annotations,
                metrics: self.metrics,
            },
            media: self.media,
            persistence: self.persistence,
            health: self.health,
            logger: self.logger,
        }
    }
}
