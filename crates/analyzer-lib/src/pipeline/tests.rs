//! Scenario tests for complete analysis runs

use super::*;
use crate::annotation::JsonlAnnotationFactory;
use crate::models::{landmarks, Discipline, Landmark, Pose, RunStatus, Severity};
use crate::sampler::{Frame, PoseOracle, VideoMetadata, VideoSource};
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

const FPS: f64 = 30.0;

struct ScriptedVideo {
    frames: u64,
    fail_at: Option<u64>,
    read: u64,
}

impl VideoSource for ScriptedVideo {
    fn metadata(&self) -> VideoMetadata {
        VideoMetadata {
            width: 640,
            height: 360,
            fps: FPS,
        }
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        if self.read == self.frames {
            return Ok(None);
        }
        self.read += 1;
        if self.fail_at == Some(self.read) {
            return Err(AnalysisError::SourceUnavailable("corrupt packet".into()));
        }
        Ok(Some(Frame::default()))
    }
}

#[derive(Default)]
struct ScriptedOpener {
    frames: u64,
    fail_at: Option<u64>,
    unavailable: bool,
}

impl VideoOpener for ScriptedOpener {
    fn open(&self, locator: &str) -> Result<Box<dyn VideoSource>> {
        if self.unavailable {
            return Err(AnalysisError::SourceUnavailable(format!(
                "cannot open {}",
                locator
            )));
        }
        Ok(Box::new(ScriptedVideo {
            frames: self.frames,
            fail_at: self.fail_at,
            read: 0,
        }))
    }
}

/// Pose by decoded frame index
type PoseScript = Arc<dyn Fn(u64) -> Option<Pose> + Send + Sync>;

struct ScriptedOracle {
    script: PoseScript,
    fail_at: Option<u64>,
    closed: Arc<AtomicUsize>,
}

impl PoseOracle for ScriptedOracle {
    fn detect(&mut self, _frame: &Frame, timestamp_ms: u64) -> Result<Option<Pose>> {
        let index = (timestamp_ms as f64 * FPS / 1000.0).round() as u64;
        if self.fail_at == Some(index) {
            return Err(AnalysisError::OracleFailure("inference error".into()));
        }
        Ok((self.script)(index))
    }

    fn close(self: Box<Self>) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

struct ScriptedOracles {
    script: PoseScript,
    fail_at: Option<u64>,
    closed: Arc<AtomicUsize>,
}

impl ScriptedOracles {
    fn new(script: impl Fn(u64) -> Option<Pose> + Send + Sync + 'static) -> Self {
        Self {
            script: Arc::new(script),
            fail_at: None,
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl OracleFactory for ScriptedOracles {
    fn create(&self, _session: &Session) -> Result<Box<dyn PoseOracle>> {
        Ok(Box::new(ScriptedOracle {
            script: self.script.clone(),
            fail_at: self.fail_at,
            closed: self.closed.clone(),
        }))
    }
}

#[derive(Default)]
struct RecordingPersistence {
    delivered: Mutex<Vec<(String, AnalysisResult)>>,
    unreachable: bool,
}

#[async_trait]
impl PersistenceClient for RecordingPersistence {
    async fn deliver(&self, session_id: &str, result: &AnalysisResult) -> Result<()> {
        self.delivered
            .lock()
            .unwrap()
            .push((session_id.to_string(), result.clone()));
        if self.unreachable {
            return Err(AnalysisError::DeliveryFailure("connection refused".into()));
        }
        Ok(())
    }
}

#[derive(Default)]
struct RecordingMediaStore {
    uploads: Mutex<Vec<PathBuf>>,
    failing: bool,
}

#[async_trait]
impl MediaStore for RecordingMediaStore {
    async fn upload(&self, path: &Path, session_id: &str) -> Result<String> {
        self.uploads.lock().unwrap().push(path.to_path_buf());
        if self.failing {
            return Err(AnalysisError::DeliveryFailure("storage offline".into()));
        }
        Ok(format!("https://media.test/{}.jsonl", session_id))
    }
}

fn pose(guard_up: bool, hip_y: f64) -> Pose {
    let mut points = vec![Landmark::new(0.5, 0.5); landmarks::POSE_LANDMARK_COUNT];
    points[landmarks::LEFT_EAR] = Landmark::new(0.45, 0.2);
    points[landmarks::RIGHT_EAR] = Landmark::new(0.55, 0.2);
    let wrist_y = if guard_up { 0.25 } else { 0.6 };
    points[landmarks::LEFT_WRIST] = Landmark::new(0.45, wrist_y);
    points[landmarks::RIGHT_WRIST] = Landmark::new(0.55, wrist_y);
    points[landmarks::LEFT_SHOULDER] = Landmark::new(0.2, 0.3);
    points[landmarks::LEFT_ELBOW] = Landmark::new(0.2, 0.45);
    points[landmarks::LEFT_HIP] = Landmark::new(0.45, hip_y);
    points[landmarks::RIGHT_HIP] = Landmark::new(0.55, hip_y);
    Pose::new(points).unwrap()
}

fn analyzer(opener: ScriptedOpener, oracles: ScriptedOracles) -> Analyzer {
    Analyzer::builder(Arc::new(opener), Arc::new(oracles)).build()
}

fn session(discipline: Discipline) -> Session {
    Session::new("session-1", discipline, "file:///videos/session-1.mp4")
}

#[tokio::test]
async fn test_unopenable_video_delivers_failed_once() {
    let persistence = Arc::new(RecordingPersistence::default());
    let opener = ScriptedOpener {
        unavailable: true,
        ..Default::default()
    };
    let analyzer = Analyzer::builder(
        Arc::new(opener),
        Arc::new(ScriptedOracles::new(|_| None)),
    )
    .persistence(persistence.clone())
    .build();

    let result = analyzer.run(&session(Discipline::Boxing)).await;

    assert_eq!(result, AnalysisResult::failed());
    let delivered = persistence.delivered.lock().unwrap();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].0, "session-1");
    assert_eq!(
        serde_json::to_value(&delivered[0].1).unwrap(),
        serde_json::json!({ "status": "failed" })
    );
}

#[tokio::test]
async fn test_empty_video_completes_with_zero_scores() {
    let analyzer = analyzer(ScriptedOpener::default(), ScriptedOracles::new(|_| None));

    let result = analyzer.evaluate(&session(Discipline::Boxing)).await;

    assert_eq!(result.status, RunStatus::Completed);
    let metrics = result.metrics.unwrap();
    assert_eq!(metrics.guard_stability, 0);
    assert_eq!(metrics.takedown_speed, 0);
    assert_eq!(metrics.strike_volume, 0);
    assert_eq!(metrics.accuracy_score, 85);
    assert!(result.feedback().is_empty());
}

#[tokio::test]
async fn test_full_guard_scores_100_without_feedback() {
    let opener = ScriptedOpener {
        frames: 90,
        ..Default::default()
    };
    let analyzer = analyzer(opener, ScriptedOracles::new(|_| Some(pose(true, 0.6))));

    let result = analyzer.evaluate(&session(Discipline::Boxing)).await;

    let metrics = result.metrics.unwrap();
    assert_eq!(metrics.guard_stability, 100);
    assert_eq!(metrics.takedown_speed, 0);
    assert!(result.feedback().is_empty());
    let summary = result.analysis_summary.unwrap();
    assert_eq!(summary.strengths, vec!["High Guard Consistency"]);
}

#[tokio::test]
async fn test_grappling_shot_at_frame_90() {
    let opener = ScriptedOpener {
        frames: 120,
        ..Default::default()
    };
    let oracles = ScriptedOracles::new(|index| {
        let hip_y = if index == 90 { 0.25 } else { 0.6 };
        Some(pose(false, hip_y))
    });

    let result = analyzer(opener, oracles)
        .evaluate(&session(Discipline::Grappling))
        .await;

    let feedback = result.feedback();
    assert_eq!(feedback.len(), 1);
    assert_eq!(feedback[0].issue, "Deep Level Change");
    assert_eq!(feedback[0].suggestion, "Good depth on the shot");
    assert_eq!(feedback[0].timestamp, 3.0);
    assert_eq!(feedback[0].severity, Some(Severity::Low));
    assert_eq!(result.metrics.unwrap().takedown_speed, 35);
}

#[tokio::test]
async fn test_feedback_capped_at_five_earliest() {
    let opener = ScriptedOpener {
        frames: 300,
        ..Default::default()
    };
    let analyzer = analyzer(opener, ScriptedOracles::new(|_| Some(pose(false, 0.6))));

    let result = analyzer.evaluate(&session(Discipline::MuayThai)).await;

    let timestamps: Vec<f64> = result.feedback().iter().map(|e| e.timestamp).collect();
    assert_eq!(timestamps, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    assert!(result
        .feedback()
        .iter()
        .all(|e| e.issue == "Guard Dropped"));
}

#[tokio::test]
async fn test_oracle_failure_is_fatal() {
    let opener = ScriptedOpener {
        frames: 90,
        ..Default::default()
    };
    let mut oracles = ScriptedOracles::new(|_| Some(pose(true, 0.6)));
    oracles.fail_at = Some(30);
    let closed = oracles.closed.clone();

    let result = analyzer(opener, oracles)
        .evaluate(&session(Discipline::Boxing))
        .await;

    assert_eq!(result, AnalysisResult::failed());
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_decode_error_mid_stream_discards_aggregates() {
    let opener = ScriptedOpener {
        frames: 90,
        fail_at: Some(50),
        ..Default::default()
    };
    let dir = tempfile::tempdir().unwrap();
    let analyzer = Analyzer::builder(
        Arc::new(opener),
        Arc::new(ScriptedOracles::new(|_| Some(pose(true, 0.6)))),
    )
    .annotations(Arc::new(JsonlAnnotationFactory::new(dir.path())))
    .build();

    let result = analyzer.evaluate(&session(Discipline::Boxing)).await;

    assert_eq!(result.status, RunStatus::Failed);
    assert!(result.metrics.is_none());
    // Overlays written before the failure are not left behind
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_missing_poses_do_not_dilute_takedown_speed() {
    let opener = ScriptedOpener {
        frames: 30,
        ..Default::default()
    };
    // Poses only on frames 3 and 6; the rest are undetected
    let oracles = ScriptedOracles::new(|index| match index {
        3 => Some(pose(true, 0.5)),
        6 => Some(pose(true, 0.4)),
        _ => None,
    });

    let result = analyzer(opener, oracles)
        .evaluate(&session(Discipline::Sparring))
        .await;

    let metrics = result.metrics.unwrap();
    assert_eq!(metrics.takedown_speed, 10);
    // 2 guarded frames out of 10 sampled
    assert_eq!(metrics.guard_stability, 20);
    assert!(result.feedback().is_empty());
}

#[tokio::test]
async fn test_oracle_closed_once_per_successful_run() {
    let opener = ScriptedOpener {
        frames: 9,
        ..Default::default()
    };
    let oracles = ScriptedOracles::new(|_| None);
    let closed = oracles.closed.clone();

    analyzer(opener, oracles)
        .evaluate(&session(Discipline::Boxing))
        .await;

    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_delivery_failure_keeps_result_and_degrades_health() {
    let persistence = Arc::new(RecordingPersistence {
        unreachable: true,
        ..Default::default()
    });
    let opener = ScriptedOpener {
        frames: 30,
        ..Default::default()
    };
    let analyzer = Analyzer::builder(
        Arc::new(opener),
        Arc::new(ScriptedOracles::new(|_| Some(pose(true, 0.6)))),
    )
    .persistence(persistence.clone())
    .build();

    let result = analyzer.run(&session(Discipline::Boxing)).await;

    assert!(result.is_completed());
    assert_eq!(persistence.delivered.lock().unwrap().len(), 1);
    let report = analyzer.health().health().await;
    assert_eq!(
        report.components[components::PERSISTENCE].status,
        crate::health::ComponentStatus::Degraded
    );
}

#[tokio::test]
async fn test_annotation_uploaded_and_local_file_removed() {
    let dir = tempfile::tempdir().unwrap();
    let media = Arc::new(RecordingMediaStore::default());
    let opener = ScriptedOpener {
        frames: 9,
        ..Default::default()
    };
    let analyzer = Analyzer::builder(
        Arc::new(opener),
        Arc::new(ScriptedOracles::new(|_| Some(pose(true, 0.6)))),
    )
    .annotations(Arc::new(JsonlAnnotationFactory::new(dir.path())))
    .media_store(media.clone())
    .build();

    let result = analyzer.evaluate(&session(Discipline::Boxing)).await;

    assert_eq!(
        result.annotated_video_url.as_deref(),
        Some("https://media.test/session-1.jsonl")
    );
    let uploads = media.uploads.lock().unwrap();
    assert_eq!(uploads.as_slice(), [dir.path().join("out_session-1.jsonl")]);
    assert!(!uploads[0].exists());
}

#[tokio::test]
async fn test_failed_upload_reports_empty_locator() {
    let dir = tempfile::tempdir().unwrap();
    let media = Arc::new(RecordingMediaStore {
        failing: true,
        ..Default::default()
    });
    let opener = ScriptedOpener {
        frames: 9,
        ..Default::default()
    };
    let analyzer = Analyzer::builder(
        Arc::new(opener),
        Arc::new(ScriptedOracles::new(|_| None)),
    )
    .annotations(Arc::new(JsonlAnnotationFactory::new(dir.path())))
    .media_store(media)
    .build();

    let result = analyzer.evaluate(&session(Discipline::Boxing)).await;

    assert!(result.is_completed());
    assert_eq!(result.annotated_video_url.as_deref(), Some(""));
    assert!(dir.path().join("out_session-1.jsonl").exists());
}

#[tokio::test]
async fn test_local_annotation_path_when_uploads_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let opener = ScriptedOpener {
        frames: 6,
        ..Default::default()
    };
    let analyzer = Analyzer::builder(
        Arc::new(opener),
        Arc::new(ScriptedOracles::new(|_| None)),
    )
    .annotations(Arc::new(JsonlAnnotationFactory::new(dir.path())))
    .build();

    let result = analyzer.evaluate(&session(Discipline::Boxing)).await;

    let expected = dir.path().join("out_session-1.jsonl");
    assert_eq!(
        result.annotated_video_url,
        Some(expected.display().to_string())
    );
}

#[tokio::test]
async fn test_unwritable_annotation_dir_is_not_fatal() {
    let opener = ScriptedOpener {
        frames: 30,
        ..Default::default()
    };
    let analyzer = Analyzer::builder(
        Arc::new(opener),
        Arc::new(ScriptedOracles::new(|_| Some(pose(true, 0.6)))),
    )
    .annotations(Arc::new(JsonlAnnotationFactory::new(
        "/nonexistent/annotations",
    )))
    .build();

    let result = analyzer.evaluate(&session(Discipline::Boxing)).await;

    assert!(result.is_completed());
    assert_eq!(result.metrics.unwrap().guard_stability, 100);
    assert_eq!(result.annotated_video_url.as_deref(), Some(""));
}
