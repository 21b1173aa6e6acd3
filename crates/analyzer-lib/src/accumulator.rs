//! Running aggregation over the sampled landmark stream
//!
//! `MetricAccumulator` consumes frame samples in decode order, keeps the
//! per-run aggregates and emits coaching feedback when frame-indexed
//! triggers fire. Trigger moduli apply to the decoded frame index, so with
//! stride-3 sampling a guard cue can only fire on frames 30, 60, 90, ... and
//! a level-change cue on frames 45, 90, 135, ...

use crate::geometry::{angle, hip_height, is_guard_up};
use crate::models::{landmarks, Discipline, FeedbackEvent, FrameSample, Landmark, Pose, Severity};

/// Decoded-frame modulus for guard feedback
pub const GUARD_FEEDBACK_MODULUS: u64 = 30;

/// Decoded-frame modulus for level-change feedback
pub const LEVEL_CHANGE_MODULUS: u64 = 45;

/// Hip height below which a grappling level change counts as deep
pub const DEEP_LEVEL_CHANGE_HEIGHT: f64 = 0.3;

pub const GUARD_DROPPED_ISSUE: &str = "Guard Dropped";
pub const GUARD_DROPPED_SUGGESTION: &str = "Keep hands up during striking";
pub const DEEP_LEVEL_CHANGE_ISSUE: &str = "Deep Level Change";
pub const DEEP_LEVEL_CHANGE_SUGGESTION: &str = "Good depth on the shot";

/// Aggregates owned by a single run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunningAggregates {
    pub processed_frame_count: u64,
    pub guard_frame_count: u64,
    /// One entry per sampled frame; `None` where no pose was detected
    pub hip_height_series: Vec<Option<f64>>,
    pub max_extension_angle: f64,
}

impl RunningAggregates {
    /// Lowest and highest recorded hip heights
    pub fn hip_height_range(&self) -> Option<(f64, f64)> {
        self.hip_height_series
            .iter()
            .flatten()
            .fold(None, |range, &h| match range {
                None => Some((h, h)),
                Some((lo, hi)) => Some((lo.min(h), hi.max(h))),
            })
    }

    /// Sampled frames where the oracle found no pose
    pub fn missing_pose_frames(&self) -> usize {
        self.hip_height_series.iter().filter(|h| h.is_none()).count()
    }
}

/// The landmarks the metrics are computed from
struct KeyPoints {
    left_wrist: Landmark,
    right_wrist: Landmark,
    left_ear: Landmark,
    right_ear: Landmark,
    left_shoulder: Landmark,
    left_elbow: Landmark,
    left_hip: Landmark,
    right_hip: Landmark,
}

impl KeyPoints {
    fn from_pose(pose: &Pose) -> Self {
        Self {
            left_wrist: pose.get(landmarks::LEFT_WRIST),
            right_wrist: pose.get(landmarks::RIGHT_WRIST),
            left_ear: pose.get(landmarks::LEFT_EAR),
            right_ear: pose.get(landmarks::RIGHT_EAR),
            left_shoulder: pose.get(landmarks::LEFT_SHOULDER),
            left_elbow: pose.get(landmarks::LEFT_ELBOW),
            left_hip: pose.get(landmarks::LEFT_HIP),
            right_hip: pose.get(landmarks::RIGHT_HIP),
        }
    }
}

/// Seconds at a decoded frame index, rounded to one decimal
fn event_timestamp(frame_index: u64, fps: f64) -> f64 {
    (frame_index as f64 / fps * 10.0).round() / 10.0
}

pub struct MetricAccumulator {
    discipline: Discipline,
    fps: f64,
    aggregates: RunningAggregates,
    feedback: Vec<FeedbackEvent>,
}

impl MetricAccumulator {
    pub fn new(discipline: Discipline, fps: f64) -> Self {
        Self {
            discipline,
            fps,
            aggregates: RunningAggregates::default(),
            feedback: Vec::new(),
        }
    }

    /// Fold one sample into the aggregates.
    ///
    /// Returns the number of feedback events the sample produced.
    pub fn observe(&mut self, sample: &FrameSample) -> usize {
        self.aggregates.processed_frame_count += 1;

        let Some(pose) = &sample.pose else {
            self.aggregates.hip_height_series.push(None);
            return 0;
        };

        let before = self.feedback.len();
        let points = KeyPoints::from_pose(pose);
        let index = sample.sequence_index;

        let guard_up = is_guard_up(points.left_wrist, points.left_ear)
            && is_guard_up(points.right_wrist, points.right_ear);
        if guard_up {
            self.aggregates.guard_frame_count += 1;
        } else if index % GUARD_FEEDBACK_MODULUS == 0 && self.discipline.is_striking() {
            self.push_event(
                index,
                GUARD_DROPPED_ISSUE,
                GUARD_DROPPED_SUGGESTION,
                Severity::Medium,
            );
        }

        let height = hip_height(points.left_hip, points.right_hip);
        self.aggregates.hip_height_series.push(Some(height));
        if self.discipline == Discipline::Grappling
            && height < DEEP_LEVEL_CHANGE_HEIGHT
            && index % LEVEL_CHANGE_MODULUS == 0
        {
            self.push_event(
                index,
                DEEP_LEVEL_CHANGE_ISSUE,
                DEEP_LEVEL_CHANGE_SUGGESTION,
                Severity::Low,
            );
        }

        let extension = angle(points.left_shoulder, points.left_elbow, points.left_wrist);
        if extension > self.aggregates.max_extension_angle {
            self.aggregates.max_extension_angle = extension;
        }

        self.feedback.len() - before
    }

    fn push_event(&mut self, index: u64, issue: &str, suggestion: &str, severity: Severity) {
        self.feedback.push(FeedbackEvent {
            timestamp: event_timestamp(index, self.fps),
            issue: issue.to_string(),
            suggestion: suggestion.to_string(),
            severity: Some(severity),
        });
    }

    pub fn aggregates(&self) -> &RunningAggregates {
        &self.aggregates
    }

    pub fn feedback(&self) -> &[FeedbackEvent] {
        &self.feedback
    }

    pub fn finish(self) -> (RunningAggregates, Vec<FeedbackEvent>) {
        (self.aggregates, self.feedback)
    }
}
