//! Recorded landmark tracks
//!
//! A track is a JSON document holding the stream metadata of a video and
//! the poses previously detected in it:
//!
//! ```json
//! {
//!   "fps": 30.0, "width": 1280, "height": 720, "frameCount": 90,
//!   "frames": [{ "index": 3, "confidence": 0.9, "landmarks": [[0.5, 0.4], ...] }]
//! }
//! ```
//!
//! `TrackSource` replays the frame sequence (without pixels) and
//! `TrackOracle` answers detections from the recorded poses, so a full
//! analysis can run without a decoder or a model.

use super::{
    timestamp_ms, Frame, OracleConfig, OracleFactory, PoseOracle, VideoMetadata, VideoOpener,
    VideoSource,
};
use crate::error::{AnalysisError, Result};
use crate::models::{landmarks::POSE_LANDMARK_COUNT, Landmark, Pose, Session};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

fn full_confidence() -> f64 {
    1.0
}

/// Recorded pose for one decoded frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackFrame {
    /// 1-based decoded frame index
    pub index: u64,
    #[serde(default = "full_confidence")]
    pub confidence: f64,
    pub landmarks: Vec<[f64; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LandmarkTrack {
    #[serde(default)]
    pub fps: f64,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    pub frame_count: u64,
    #[serde(default)]
    pub frames: Vec<TrackFrame>,
}

impl LandmarkTrack {
    /// Parse and validate a track document
    pub fn from_json(json: &str) -> Result<Self> {
        let track: LandmarkTrack =
            serde_json::from_str(json).map_err(|e| AnalysisError::InvalidTrack(e.to_string()))?;
        track.validate()?;
        Ok(track)
    }

    /// Read a track from disk; an unreadable file means the source is unavailable
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            AnalysisError::SourceUnavailable(format!("{}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    fn validate(&self) -> Result<()> {
        let mut previous = 0;
        for frame in &self.frames {
            if frame.index <= previous || frame.index > self.frame_count {
                return Err(AnalysisError::InvalidTrack(format!(
                    "frame index {} out of order or beyond frame count {}",
                    frame.index, self.frame_count
                )));
            }
            if frame.landmarks.len() < POSE_LANDMARK_COUNT {
                return Err(AnalysisError::InvalidTrack(format!(
                    "frame {} has {} landmarks, expected {}",
                    frame.index,
                    frame.landmarks.len(),
                    POSE_LANDMARK_COUNT
                )));
            }
            previous = frame.index;
        }
        Ok(())
    }

    pub fn metadata(&self) -> VideoMetadata {
        VideoMetadata {
            width: self.width,
            height: self.height,
            fps: self.fps,
        }
    }
}

/// Resolve a `file://` or plain-path locator
fn track_path(locator: &str) -> PathBuf {
    PathBuf::from(locator.strip_prefix("file://").unwrap_or(locator))
}

/// Replays the frame sequence of a track
pub struct TrackSource {
    metadata: VideoMetadata,
    remaining: u64,
}

impl TrackSource {
    pub fn new(track: &LandmarkTrack) -> Self {
        Self {
            metadata: track.metadata(),
            remaining: track.frame_count,
        }
    }
}

impl VideoSource for TrackSource {
    fn metadata(&self) -> VideoMetadata {
        self.metadata
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        Ok(Some(Frame {
            width: self.metadata.width,
            height: self.metadata.height,
            pixels: Vec::new(),
        }))
    }
}

/// Opens track files as video sources
#[derive(Debug, Clone, Default)]
pub struct TrackOpener;

impl VideoOpener for TrackOpener {
    fn open(&self, locator: &str) -> Result<Box<dyn VideoSource>> {
        let track = LandmarkTrack::load(&track_path(locator)).map_err(|e| match e {
            AnalysisError::InvalidTrack(msg) => AnalysisError::SourceUnavailable(msg),
            other => other,
        })?;
        debug!(locator = %locator, frames = track.frame_count, "Opened landmark track");
        Ok(Box::new(TrackSource::new(&track)))
    }
}

/// Answers detections from recorded poses, keyed by timestamp
pub struct TrackOracle {
    poses: BTreeMap<u64, (f64, Pose)>,
    min_confidence: f64,
    last_timestamp: Option<u64>,
}

impl TrackOracle {
    pub fn new(track: &LandmarkTrack, config: &OracleConfig) -> Self {
        let fps = track.metadata().effective_fps();
        let poses = track
            .frames
            .iter()
            .filter_map(|frame| {
                let landmarks = frame
                    .landmarks
                    .iter()
                    .map(|[x, y]| Landmark::new(*x, *y))
                    .collect();
                Pose::new(landmarks)
                    .map(|pose| (timestamp_ms(frame.index, fps), (frame.confidence, pose)))
            })
            .collect();

        Self {
            poses,
            min_confidence: config.min_detection_confidence,
            last_timestamp: None,
        }
    }
}

impl PoseOracle for TrackOracle {
    fn detect(&mut self, _frame: &Frame, timestamp_ms: u64) -> Result<Option<Pose>> {
        if let Some(last) = self.last_timestamp {
            if timestamp_ms <= last {
                return Err(AnalysisError::OracleFailure(format!(
                    "timestamp {}ms is not after {}ms",
                    timestamp_ms, last
                )));
            }
        }
        self.last_timestamp = Some(timestamp_ms);

        Ok(self
            .poses
            .get(&timestamp_ms)
            .filter(|(confidence, _)| *confidence >= self.min_confidence)
            .map(|(_, pose)| pose.clone()))
    }
}

/// Creates a `TrackOracle` from the track named by the session's locator
#[derive(Debug, Clone)]
pub struct TrackOracleFactory {
    config: Arc<OracleConfig>,
}

impl TrackOracleFactory {
    pub fn new(config: Arc<OracleConfig>) -> Self {
        Self { config }
    }
}

impl OracleFactory for TrackOracleFactory {
    fn create(&self, session: &Session) -> Result<Box<dyn PoseOracle>> {
        let track = LandmarkTrack::load(&track_path(&session.video_url))
            .map_err(|e| AnalysisError::OracleFailure(e.to_string()))?;
        Ok(Box::new(TrackOracle::new(&track, &self.config)))
    }
}
