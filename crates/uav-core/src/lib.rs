//! # UAV Core
//!
//! Shared domain types for the UAV visual-guidance system: vehicle and camera
//! poses, per-frame detections, located targets and work modes. Frame
//! geometry lives in [`geometry`], guidance events in [`events`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod error;
pub mod events;
pub mod geometry;

pub use error::{CoreError, CoreResult};
pub use events::*;
pub use nalgebra::{Matrix3, Vector3};

// ============================================================================
// POSE MODELS
// ============================================================================

/// Attitude in radians
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EulerAngles {
    pub pitch: f64,
    pub roll: f64,
    pub yaw: f64,
}

impl EulerAngles {
    pub fn new(pitch: f64, roll: f64, yaw: f64) -> Self {
        Self { pitch, roll, yaw }
    }

    /// Pitch-only attitude, as used for gimbal commands
    pub fn from_pitch(pitch: f64) -> Self {
        Self { pitch, ..Default::default() }
    }
}

/// Position in the NED world frame (meters) plus attitude
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vector3<f64>,
    pub orientation: EulerAngles,
}

impl Pose {
    pub fn new(position: Vector3<f64>, orientation: EulerAngles) -> Self {
        Self { position, orientation }
    }

    pub fn at(x: f64, y: f64, z: f64) -> Self {
        Self::new(Vector3::new(x, y, z), EulerAngles::default())
    }

    /// Squared horizontal distance to a world point
    pub fn horizontal_distance_squared(&self, point: &Vector3<f64>) -> f64 {
        let dx = point.x - self.position.x;
        let dy = point.y - self.position.y;
        dx * dx + dy * dy
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::new(Vector3::zeros(), EulerAngles::default())
    }
}

// ============================================================================
// CAMERA MODELS
// ============================================================================

/// Image size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn as_f64(&self) -> (f64, f64) {
        (self.width as f64, self.height as f64)
    }

    pub fn center(&self) -> (f64, f64) {
        (self.width as f64 / 2.0, self.height as f64 / 2.0)
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::new(752, 480)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Pinhole camera description
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub resolution: Resolution,
    /// Horizontal field of view
    pub fov_degrees: f64,
}

impl CameraIntrinsics {
    pub fn new(resolution: Resolution, fov_degrees: f64) -> Self {
        Self { resolution, fov_degrees }
    }

    /// Virtual focal length in pixels
    pub fn focal_length(&self) -> f64 {
        geometry::virtual_focal_length(self.resolution.width as f64, self.fov_degrees)
    }

    /// Angular offset `(pitch, yaw)` of an image point from the image center
    pub fn pixel_angles(&self, u: f64, v: f64) -> (f64, f64) {
        let (width, height) = self.resolution.as_f64();
        geometry::pixel_offset_to_angles(width, height, self.fov_degrees, u, v)
    }
}

impl Default for CameraIntrinsics {
    fn default() -> Self {
        Self::new(Resolution::default(), 90.0)
    }
}

// ============================================================================
// DETECTION MODELS
// ============================================================================

/// Axis-aligned box in pixel space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl BoundingBox {
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self { xmin, ymin, xmax, ymax }
    }

    /// Box of the given size centered on (cx, cy)
    pub fn centered(cx: f64, cy: f64, width: f64, height: f64) -> Self {
        Self::new(cx - width / 2.0, cy - height / 2.0, cx + width / 2.0, cy + height / 2.0)
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.xmin + self.xmax) / 2.0, (self.ymin + self.ymax) / 2.0)
    }

    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    /// Width and height as fractions of the frame
    pub fn normalized_size(&self, resolution: &Resolution) -> (f64, f64) {
        let (w, h) = resolution.as_f64();
        (self.width().abs() / w, self.height().abs() / h)
    }

    /// Squared pixel distance from the box center to the frame center
    pub fn center_offset_squared(&self, resolution: &Resolution) -> f64 {
        let (cx, cy) = self.center();
        let (fx, fy) = resolution.center();
        (cx - fx).powi(2) + (cy - fy).powi(2)
    }
}

/// One detector output row
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub score: f32,
    pub class_id: usize,
}

impl Detection {
    pub fn new(bbox: BoundingBox, score: f32, class_id: usize) -> Self {
        Self { bbox, score, class_id }
    }
}

/// Persistent identifier assigned by the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for TrackId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Detection with a tracker identity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackedDetection {
    pub detection: Detection,
    pub track_id: TrackId,
}

impl TrackedDetection {
    pub fn new(detection: Detection, track_id: impl Into<TrackId>) -> Self {
        Self {
            detection,
            track_id: track_id.into(),
        }
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.detection.bbox
    }
}

// ============================================================================
// TARGET MODELS
// ============================================================================

/// A world-anchored target committed once centered under the camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub class_name: String,
    pub location: Vector3<f64>,
    pub located_at: DateTime<Utc>,
}

impl Target {
    /// Target on the ground plane (z = 0)
    pub fn on_ground(class_name: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            class_name: class_name.into(),
            location: Vector3::new(x, y, 0.0),
            located_at: Utc::now(),
        }
    }

    /// Whether `point` lies within `tolerance` meters on both horizontal axes
    pub fn is_near(&self, point: &Vector3<f64>, tolerance: f64) -> bool {
        (self.location.x - point.x).abs() <= tolerance && (self.location.y - point.y).abs() <= tolerance
    }
}

/// Target located in multi-target mode, with its tracker identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedTarget {
    #[serde(flatten)]
    pub target: Target,
    pub track_id: TrackId,
}

impl TrackedTarget {
    pub fn new(target: Target, track_id: TrackId) -> Self {
        Self { target, track_id }
    }
}

// ============================================================================
// WORK MODE
// ============================================================================

/// Per-frame behavior selected by the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkMode {
    /// Frames pass through untouched
    #[default]
    #[serde(alias = "normal")]
    Idle,
    /// Detect and annotate, no motion
    Detect,
    /// Single-target pursuit
    Track,
    /// ID-directed multi-target pursuit
    #[serde(alias = "botsort")]
    MultiTrack,
}

impl WorkMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkMode::Idle => "idle",
            WorkMode::Detect => "detect",
            WorkMode::Track => "track",
            WorkMode::MultiTrack => "multi_track",
        }
    }

    /// Whether frames in this mode go through the detector
    pub fn runs_detector(&self) -> bool {
        !matches!(self, WorkMode::Idle)
    }
}

impl fmt::Display for WorkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "idle" | "normal" => Ok(WorkMode::Idle),
            "detect" => Ok(WorkMode::Detect),
            "track" => Ok(WorkMode::Track),
            "multi_track" | "multi-track" | "botsort" => Ok(WorkMode::MultiTrack),
            other => Err(CoreError::unknown_work_mode(other)),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box_geometry() {
        let bbox = BoundingBox::new(100.0, 50.0, 150.0, 130.0);
        assert_eq!(bbox.center(), (125.0, 90.0));
        assert_eq!(bbox.width(), 50.0);
        assert_eq!(bbox.height(), 80.0);

        let (w, h) = bbox.normalized_size(&Resolution::new(500, 400));
        assert_eq!(w, 0.1);
        assert_eq!(h, 0.2);
    }

    #[test]
    fn test_centered_box_has_no_offset() {
        let res = Resolution::default();
        let bbox = BoundingBox::centered(376.0, 240.0, 40.0, 30.0);
        assert_eq!(bbox.center_offset_squared(&res), 0.0);
    }

    #[test]
    fn test_default_camera() {
        let camera = CameraIntrinsics::default();
        assert_eq!(camera.resolution, Resolution::new(752, 480));
        assert!((camera.focal_length() - 376.0).abs() < 1e-9);
        assert_eq!(camera.pixel_angles(376.0, 240.0), (0.0, 0.0));
    }

    #[test]
    fn test_target_tolerance_box() {
        let target = Target::on_ground("Sedan", 10.0, 20.0);
        assert_eq!(target.location.z, 0.0);
        assert!(target.is_near(&Vector3::new(11.5, 19.0, 0.0), 2.0));
        assert!(target.is_near(&Vector3::new(12.0, 22.0, 0.0), 2.0));
        assert!(!target.is_near(&Vector3::new(12.5, 20.0, 0.0), 2.0));
        assert!(!target.is_near(&Vector3::new(10.0, 17.9, 0.0), 2.0));
    }

    #[test]
    fn test_work_mode_parsing() {
        assert_eq!("normal".parse::<WorkMode>().unwrap(), WorkMode::Idle);
        assert_eq!("Track".parse::<WorkMode>().unwrap(), WorkMode::Track);
        assert_eq!("botsort".parse::<WorkMode>().unwrap(), WorkMode::MultiTrack);
        assert!("base".parse::<WorkMode>().is_err());
    }

    #[test]
    fn test_work_mode_serde_aliases() {
        let mode: WorkMode = serde_json::from_str("\"botsort\"").unwrap();
        assert_eq!(mode, WorkMode::MultiTrack);
        assert_eq!(serde_json::to_string(&WorkMode::MultiTrack).unwrap(), "\"multi_track\"");
    }

    #[test]
    fn test_tracked_target_serializes_flat() {
        let tracked = TrackedTarget::new(Target::on_ground("Van", 1.0, 2.0), TrackId(7));
        let json = serde_json::to_value(&tracked).unwrap();
        assert_eq!(json["class_name"], "Van");
        assert_eq!(json["track_id"], 7);

        let back: TrackedTarget = serde_json::from_value(json).unwrap();
        assert_eq!(back, tracked);
    }
}
