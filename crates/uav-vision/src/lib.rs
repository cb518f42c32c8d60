//! # UAV Vision
//!
//! Vision-side collaborators of the guidance loop:
//! - [`Frame`]: an immutable BGR pixel buffer as delivered by the transport
//! - [`Detector`] / [`Tracker`]: black-box object detection and persistent
//!   track association, supplied by the embedding application
//! - [`VisionPipeline`]: runs both with confidence filtering and treats
//!   collaborator failures as an empty frame
//! - [`annotate`]: box classification handed to the visualization side

pub mod annotate;
pub mod config;
pub mod error;

pub use annotate::{AnnotatedFrame, Annotation, Annotator, BoxRole};
pub use config::{AnnotationConfig, VisionConfig, VEHICLE_CLASSES};
pub use error::{VisionError, VisionResult};

use std::sync::Arc;
use tracing::{debug, warn};
use uav_core::{Detection, Resolution, TrackedDetection};

// ============================================================================
// FRAME
// ============================================================================

/// Immutable BGR frame, `height * width * 3` bytes, row-major
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Arc<[u8]>,
}

impl Frame {
    /// Wrap a raw BGR buffer, checking its length against the dimensions
    pub fn from_bgr(width: u32, height: u32, data: Vec<u8>) -> VisionResult<Self> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(VisionError::FrameSize {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }

        Ok(Self {
            width,
            height,
            data: data.into(),
        })
    }

    /// All-black frame
    pub fn blank(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize * 3;
        Self {
            width,
            height,
            data: vec![0u8; len].into(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// BGR triple at (x, y)
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 3;
        Some([self.data[offset], self.data[offset + 1], self.data[offset + 2]])
    }
}

// ============================================================================
// COLLABORATOR TRAITS
// ============================================================================

/// Object detector, e.g. a YOLO-style network
pub trait Detector: Send {
    /// Boxes in pixel space scoring at least `confidence`
    fn infer(&mut self, frame: &Frame, confidence: f32) -> VisionResult<Vec<Detection>>;
}

/// Multi-object tracker assigning persistent ids across frames
pub trait Tracker: Send {
    fn update(&mut self, detections: &[Detection], frame: &Frame) -> VisionResult<Vec<TrackedDetection>>;
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Counters kept by the pipeline
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames_processed: u64,
    pub detections: u64,
    pub rejected_rows: u64,
    pub detector_failures: u64,
    pub tracker_failures: u64,
}

/// Detector plus optional tracker behind one filtered interface
pub struct VisionPipeline {
    config: VisionConfig,
    detector: Box<dyn Detector>,
    tracker: Option<Box<dyn Tracker>>,
    stats: PipelineStats,
}

impl VisionPipeline {
    pub fn new(config: VisionConfig, detector: Box<dyn Detector>) -> Self {
        Self {
            config,
            detector,
            tracker: None,
            stats: PipelineStats::default(),
        }
    }

    pub fn with_tracker(mut self, tracker: Box<dyn Tracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Run the detector on a frame.
    ///
    /// A failing detector yields no detections. Rows with a non-finite or
    /// inverted box, or a score under the threshold, are dropped.
    pub fn detect(&mut self, frame: &Frame) -> Vec<Detection> {
        self.stats.frames_processed += 1;
        let threshold = self.config.confidence_threshold;

        let raw = match self.detector.infer(frame, threshold) {
            Ok(raw) => raw,
            Err(e) => {
                self.stats.detector_failures += 1;
                warn!("Detector failed, treating frame as empty: {}", e);
                return Vec::new();
            }
        };

        let total = raw.len();
        let detections: Vec<Detection> = raw
            .into_iter()
            .filter(|d| d.score >= threshold && is_well_formed(d))
            .collect();

        let rejected = total - detections.len();
        if rejected > 0 {
            debug!("Dropped {} of {} detector rows", rejected, total);
        }
        self.stats.rejected_rows += rejected as u64;
        self.stats.detections += detections.len() as u64;
        detections
    }

    /// Run the tracker; without a tracker, or on failure, nothing is tracked.
    ///
    /// Tracked rows with a non-finite or inverted box are dropped.
    pub fn track(&mut self, detections: &[Detection], frame: &Frame) -> Vec<TrackedDetection> {
        let Some(tracker) = self.tracker.as_mut() else {
            debug!("No tracker configured, multi-target tracking unavailable");
            return Vec::new();
        };

        let raw = match tracker.update(detections, frame) {
            Ok(raw) => raw,
            Err(e) => {
                self.stats.tracker_failures += 1;
                warn!("Tracker failed, treating frame as empty: {}", e);
                return Vec::new();
            }
        };

        let total = raw.len();
        let tracked: Vec<TrackedDetection> = raw.into_iter().filter(|t| is_well_formed(&t.detection)).collect();

        let rejected = total - tracked.len();
        if rejected > 0 {
            debug!("Dropped {} of {} tracker rows", rejected, total);
        }
        self.stats.rejected_rows += rejected as u64;
        tracked
    }

    pub fn has_tracker(&self) -> bool {
        self.tracker.is_some()
    }

    pub fn class_name(&self, class_id: usize) -> String {
        self.config.class_name(class_id)
    }

    pub fn config(&self) -> &VisionConfig {
        &self.config
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }
}

fn is_well_formed(detection: &Detection) -> bool {
    let b = &detection.bbox;
    [b.xmin, b.ymin, b.xmax, b.ymax].iter().all(|v| v.is_finite()) && b.xmax >= b.xmin && b.ymax >= b.ymin
}

// ============================================================================
// TESTS
// ============================================================================
