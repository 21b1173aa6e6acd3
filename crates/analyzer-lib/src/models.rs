//! Core data models for the session analyzer

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pose landmark indices (33-point body model)
pub mod landmarks {
    pub const LEFT_EAR: usize = 7;
    pub const RIGHT_EAR: usize = 8;
    pub const LEFT_SHOULDER: usize = 11;
    pub const RIGHT_SHOULDER: usize = 12;
    pub const LEFT_ELBOW: usize = 13;
    pub const RIGHT_ELBOW: usize = 14;
    pub const LEFT_WRIST: usize = 15;
    pub const RIGHT_WRIST: usize = 16;
    pub const LEFT_HIP: usize = 23;
    pub const RIGHT_HIP: usize = 24;
    pub const LEFT_KNEE: usize = 25;
    pub const RIGHT_KNEE: usize = 26;
    pub const LEFT_ANKLE: usize = 27;
    pub const RIGHT_ANKLE: usize = 28;

    /// Number of landmarks in a complete pose
    pub const POSE_LANDMARK_COUNT: usize = 33;
}

/// A 2-D point in normalized image coordinates (0..1, y grows downward)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
}

impl Landmark {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Landmarks of one detected subject, ordered by anatomical index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PoseFields")]
pub struct Pose {
    landmarks: Vec<Landmark>,
}

#[derive(Deserialize)]
struct PoseFields {
    landmarks: Vec<Landmark>,
}

impl TryFrom<PoseFields> for Pose {
    type Error = String;

    fn try_from(fields: PoseFields) -> Result<Self, Self::Error> {
        let count = fields.landmarks.len();
        Pose::new(fields.landmarks).ok_or_else(|| {
            format!(
                "pose has {} landmarks, expected at least {}",
                count,
                landmarks::POSE_LANDMARK_COUNT
            )
        })
    }
}

impl Pose {
    /// Build a pose from a landmark list.
    ///
    /// Returns `None` unless every body-model index is present.
    pub fn new(landmarks: Vec<Landmark>) -> Option<Self> {
        if landmarks.len() < landmarks::POSE_LANDMARK_COUNT {
            return None;
        }
        Some(Self { landmarks })
    }

    pub fn get(&self, index: usize) -> Landmark {
        self.landmarks[index]
    }

    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }
}

/// Training context that selects which feedback and summary rules apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Discipline {
    #[default]
    Boxing,
    MuayThai,
    Sparring,
    Grappling,
}

impl Discipline {
    /// Striking disciplines receive guard feedback
    pub fn is_striking(&self) -> bool {
        matches!(
            self,
            Discipline::Boxing | Discipline::MuayThai | Discipline::Sparring
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Discipline::Boxing => "boxing",
            Discipline::MuayThai => "muay_thai",
            Discipline::Sparring => "sparring",
            Discipline::Grappling => "grappling",
        }
    }
}

impl fmt::Display for Discipline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Discipline {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "boxing" => Ok(Discipline::Boxing),
            "muay_thai" => Ok(Discipline::MuayThai),
            "sparring" => Ok(Discipline::Sparring),
            "grappling" => Ok(Discipline::Grappling),
            other => Err(format!("unknown session type: {}", other)),
        }
    }
}

/// One analysis request; immutable for the duration of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub discipline: Discipline,
    pub video_url: String,
}

impl Session {
    pub fn new(
        session_id: impl Into<String>,
        discipline: Discipline,
        video_url: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            discipline,
            video_url: video_url.into(),
        }
    }
}

/// One sampled frame and the oracle's answer for it
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSample {
    /// 1-based index of the frame in decode order
    pub sequence_index: u64,
    pub timestamp_ms: u64,
    pub pose: Option<Pose>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        })
    }
}

/// Timestamped coaching cue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEvent {
    /// Seconds from the start of the video, one decimal place
    pub timestamp: f64,
    pub issue: String,
    pub suggestion: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetrics {
    pub guard_stability: i64,
    pub takedown_speed: i64,
    pub strike_volume: i64,
    pub accuracy_score: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub strengths: Vec<String>,
    pub flaws: Vec<String>,
    pub improvements: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Failed,
}

/// Terminal record handed to the persistence service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<SessionMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Vec<FeedbackEvent>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_summary: Option<AnalysisSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotated_video_url: Option<String>,
}

/// Maximum feedback events carried in a result
pub const MAX_FEEDBACK_EVENTS: usize = 5;

impl AnalysisResult {
    /// Build a completed result, keeping only the first feedback events
    pub fn completed(
        metrics: SessionMetrics,
        mut feedback: Vec<FeedbackEvent>,
        summary: AnalysisSummary,
        annotated_video_url: String,
    ) -> Self {
        feedback.truncate(MAX_FEEDBACK_EVENTS);
        Self {
            status: RunStatus::Completed,
            metrics: Some(metrics),
            feedback: Some(feedback),
            analysis_summary: Some(summary),
            annotated_video_url: Some(annotated_video_url),
        }
    }

    pub fn failed() -> Self {
        Self {
            status: RunStatus::Failed,
            metrics: None,
            feedback: None,
            analysis_summary: None,
            annotated_video_url: None,
        }
    }

    /// Feedback events, empty for failed runs
    pub fn feedback(&self) -> &[FeedbackEvent] {
        self.feedback.as_deref().unwrap_or_default()
    }

    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }
}
