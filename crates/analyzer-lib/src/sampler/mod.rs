//! Frame sampling and pose detection
//!
//! This module defines the collaborator seams of an analysis run:
//! - `VideoOpener` / `VideoSource` supply decoded frames and stream metadata
//! - `OracleFactory` / `PoseOracle` turn a frame into at most one pose
//!
//! `Sampler` walks a source at a fixed stride and asks the oracle for a pose
//! on every sampled frame. `track` provides a recorded-landmark backend for
//! both seams.

mod stride;
mod track;

pub use stride::{timestamp_ms, SampledFrame, Sampler, SAMPLE_STRIDE};
pub use track::{
    LandmarkTrack, TrackFrame, TrackOpener, TrackOracle, TrackOracleFactory, TrackSource,
};

use crate::error::Result;
use crate::models::{Pose, Session};

/// Frame rate assumed when a source reports none
pub const FALLBACK_FPS: f64 = 30.0;

/// Stream properties reported by a video source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    /// Reported frame rate; zero or non-finite when unknown
    pub fps: f64,
}

impl VideoMetadata {
    /// Frame rate used for timestamps
    pub fn effective_fps(&self) -> f64 {
        if self.fps.is_finite() && self.fps > 0.0 {
            self.fps
        } else {
            FALLBACK_FPS
        }
    }
}

/// One decoded RGB frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Decoded frames of one video, in presentation order
pub trait VideoSource: Send {
    fn metadata(&self) -> VideoMetadata;

    /// Next decoded frame, `None` at end of stream
    fn read_frame(&mut self) -> Result<Option<Frame>>;
}

/// Opens a video locator (path or URL)
pub trait VideoOpener: Send + Sync {
    fn open(&self, locator: &str) -> Result<Box<dyn VideoSource>>;
}

/// Stateful pose detector bound to a single run.
///
/// Calls must carry strictly increasing timestamps.
pub trait PoseOracle: Send {
    fn detect(&mut self, frame: &Frame, timestamp_ms: u64) -> Result<Option<Pose>>;

    /// Release detector resources at the end of the run
    fn close(self: Box<Self>) {}
}

/// Immutable detector settings shared by every run
#[derive(Debug, Clone, PartialEq)]
pub struct OracleConfig {
    /// Poses scored below this are reported as absent
    pub min_detection_confidence: f64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            min_detection_confidence: 0.5,
        }
    }
}

/// Builds one fresh oracle per run
pub trait OracleFactory: Send + Sync {
    fn create(&self, session: &Session) -> Result<Box<dyn PoseOracle>>;
}
