//! Annotated media export
//!
//! Each sampled frame is written to an `AnnotationSink` together with its
//! pose overlay (skeleton segments and joint markers in pixel space). The
//! default sink stores overlays as JSON Lines; rendering them onto video is
//! left to the media pipeline that consumes the file.

use crate::error::{AnalysisError, Result};
use crate::models::{landmarks::*, Pose, Session};
use crate::sampler::{Frame, VideoMetadata};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::debug;

/// Skeleton segments drawn between landmark pairs
pub const POSE_CONNECTIONS: [(usize, usize); 12] = [
    (LEFT_SHOULDER, RIGHT_SHOULDER),
    (LEFT_SHOULDER, LEFT_ELBOW),
    (LEFT_ELBOW, LEFT_WRIST),
    (RIGHT_SHOULDER, RIGHT_ELBOW),
    (RIGHT_ELBOW, RIGHT_WRIST),
    (LEFT_SHOULDER, LEFT_HIP),
    (RIGHT_SHOULDER, RIGHT_HIP),
    (LEFT_HIP, RIGHT_HIP),
    (LEFT_HIP, LEFT_KNEE),
    (LEFT_KNEE, LEFT_ANKLE),
    (RIGHT_HIP, RIGHT_KNEE),
    (RIGHT_KNEE, RIGHT_ANKLE),
];

/// Joints marked on the overlay
pub const POSE_JOINTS: [usize; 12] = [
    LEFT_SHOULDER,
    RIGHT_SHOULDER,
    LEFT_ELBOW,
    RIGHT_ELBOW,
    LEFT_WRIST,
    RIGHT_WRIST,
    LEFT_HIP,
    RIGHT_HIP,
    LEFT_KNEE,
    RIGHT_KNEE,
    LEFT_ANKLE,
    RIGHT_ANKLE,
];

/// Overlay for one sampled frame, in pixel coordinates
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameOverlay {
    pub timestamp_ms: u64,
    pub segments: Vec<[(i64, i64); 2]>,
    pub joints: Vec<(i64, i64)>,
}

impl FrameOverlay {
    pub fn new(timestamp_ms: u64, pose: Option<&Pose>, width: u32, height: u32) -> Self {
        let to_pixel = |index: usize| {
            let point = pose.map(|p| p.get(index)).unwrap_or_default();
            (
                (point.x * width as f64) as i64,
                (point.y * height as f64) as i64,
            )
        };

        match pose {
            Some(_) => Self {
                timestamp_ms,
                segments: POSE_CONNECTIONS
                    .iter()
                    .map(|&(start, end)| [to_pixel(start), to_pixel(end)])
                    .collect(),
                joints: POSE_JOINTS.iter().map(|&j| to_pixel(j)).collect(),
            },
            None => Self {
                timestamp_ms,
                segments: Vec::new(),
                joints: Vec::new(),
            },
        }
    }
}

/// Receives every sampled frame of a run
pub trait AnnotationSink: Send {
    fn write(&mut self, frame: &Frame, timestamp_ms: u64, pose: Option<&Pose>) -> Result<()>;

    /// Flush and return the path of the finished media file, if any
    fn finish(self: Box<Self>) -> Result<Option<PathBuf>>;

    /// Drop everything written so far
    fn discard(self: Box<Self>) {}
}

/// Builds one sink per run
pub trait AnnotationFactory: Send + Sync {
    fn create(&self, session: &Session, metadata: &VideoMetadata) -> Result<Box<dyn AnnotationSink>>;
}

/// Writes overlays to `<output_dir>/out_<session_id>.jsonl`
#[derive(Debug, Clone)]
pub struct JsonlAnnotationFactory {
    output_dir: PathBuf,
}

impl JsonlAnnotationFactory {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

impl AnnotationFactory for JsonlAnnotationFactory {
    fn create(&self, session: &Session, metadata: &VideoMetadata) -> Result<Box<dyn AnnotationSink>> {
        let path = self.output_dir.join(annotation_file_name(&session.session_id));
        let file = File::create(&path)
            .map_err(|e| AnalysisError::Export(format!("{}: {}", path.display(), e)))?;

        Ok(Box::new(JsonlAnnotationSink {
            path,
            writer: BufWriter::new(file),
            width: metadata.width,
            height: metadata.height,
        }))
    }
}

/// File name for a session's overlays; anything outside `[A-Za-z0-9_-]` becomes `_`
pub fn annotation_file_name(session_id: &str) -> String {
    let stem: String = session_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("out_{}.jsonl", stem)
}

pub struct JsonlAnnotationSink {
    path: PathBuf,
    writer: BufWriter<File>,
    width: u32,
    height: u32,
}

impl AnnotationSink for JsonlAnnotationSink {
    fn write(&mut self, frame: &Frame, timestamp_ms: u64, pose: Option<&Pose>) -> Result<()> {
        let (width, height) = if frame.width > 0 && frame.height > 0 {
            (frame.width, frame.height)
        } else {
            (self.width, self.height)
        };
        let overlay = FrameOverlay::new(timestamp_ms, pose, width, height);

        serde_json::to_writer(&mut self.writer, &overlay)
            .map_err(|e| AnalysisError::Export(e.to_string()))?;
        self.writer
            .write_all(b"\n")
            .map_err(|e| AnalysisError::Export(e.to_string()))
    }

    fn finish(mut self: Box<Self>) -> Result<Option<PathBuf>> {
        self.writer
            .flush()
            .map_err(|e| AnalysisError::Export(e.to_string()))?;
        Ok(Some(self.path))
    }

    fn discard(self: Box<Self>) {
        let Self { path, writer, .. } = *self;
        drop(writer);
        if let Err(e) = std::fs::remove_file(&path) {
            debug!(path = %path.display(), error = %e, "Could not remove partial annotation file");
        }
    }
}

/// Used when annotation export is disabled
#[derive(Debug, Clone, Default)]
pub struct NoopAnnotationFactory;

struct NoopAnnotationSink;

impl AnnotationSink for NoopAnnotationSink {
    fn write(&mut self, _frame: &Frame, _timestamp_ms: u64, _pose: Option<&Pose>) -> Result<()> {
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Option<PathBuf>> {
        Ok(None)
    }
}

impl AnnotationFactory for NoopAnnotationFactory {
    fn create(&self, _session: &Session, _metadata: &VideoMetadata) -> Result<Box<dyn AnnotationSink>> {
        Ok(Box::new(NoopAnnotationSink))
    }
}
