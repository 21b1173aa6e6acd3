//! Fixed-stride frame sampler
//!
//! Every decoded frame is read, but only every `SAMPLE_STRIDE`-th frame is
//! handed to the pose oracle.

use super::{Frame, PoseOracle, VideoSource};
use crate::error::Result;
use crate::models::FrameSample;
use tracing::debug;

/// Analyze every third decoded frame
pub const SAMPLE_STRIDE: u64 = 3;

/// Presentation timestamp of a 1-based decoded frame index
pub fn timestamp_ms(frame_index: u64, fps: f64) -> u64 {
    (frame_index as f64 / fps * 1000.0).round() as u64
}

/// A sampled frame together with its pixels, for annotation
#[derive(Debug, Clone)]
pub struct SampledFrame {
    pub sample: FrameSample,
    pub frame: Frame,
}

/// Lazy sequence of sampled frames.
///
/// Yields at most one error, after which the sequence is exhausted.
pub struct Sampler<'a> {
    source: &'a mut dyn VideoSource,
    oracle: &'a mut dyn PoseOracle,
    fps: f64,
    decoded: u64,
    finished: bool,
}

impl<'a> Sampler<'a> {
    pub fn new(source: &'a mut dyn VideoSource, oracle: &'a mut dyn PoseOracle) -> Self {
        let fps = source.metadata().effective_fps();
        Self {
            source,
            oracle,
            fps,
            decoded: 0,
            finished: false,
        }
    }

    /// Number of frames decoded so far, sampled or not
    pub fn decoded_frames(&self) -> u64 {
        self.decoded
    }

    fn next_sample(&mut self) -> Result<Option<SampledFrame>> {
        loop {
            let Some(frame) = self.source.read_frame()? else {
                debug!(decoded = self.decoded, "End of video stream");
                return Ok(None);
            };

            self.decoded += 1;
            if self.decoded % SAMPLE_STRIDE != 0 {
                continue;
            }

            let timestamp_ms = timestamp_ms(self.decoded, self.fps);
            let pose = self.oracle.detect(&frame, timestamp_ms)?;

            return Ok(Some(SampledFrame {
                sample: FrameSample {
                    sequence_index: self.decoded,
                    timestamp_ms,
                    pose,
                },
                frame,
            }));
        }
    }
}

impl Iterator for Sampler<'_> {
    type Item = Result<SampledFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.next_sample() {
            Ok(Some(sampled)) => Some(Ok(sampled)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
