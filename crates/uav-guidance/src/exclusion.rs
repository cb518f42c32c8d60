//! Exclusion of already located targets
//!
//! Back-projects each detection's box center onto the ground plane from the
//! current camera pose and drops detections that land within the tolerance
//! box of a target located earlier.

use nalgebra::Vector3;
use uav_core::geometry::project_to_ground;
use uav_core::{BoundingBox, CameraIntrinsics, Detection, Pose, Target};

/// A detection that survived exclusion, with its ground estimate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub detection: Detection,
    /// Back-projected position, z = 0
    pub ground: Vector3<f64>,
}

/// Result of one exclusion pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExclusionOutcome {
    pub candidates: Vec<Candidate>,
    /// Detections matching a located target, for distinct rendering
    pub located: Vec<Detection>,
    /// Detections whose ray does not reach the ground
    pub unprojectable: usize,
}

#[derive(Debug, Clone)]
pub struct ExclusionFilter {
    intrinsics: CameraIntrinsics,
    tolerance: f64,
}

impl ExclusionFilter {
    pub fn new(intrinsics: CameraIntrinsics, tolerance: f64) -> Self {
        Self { intrinsics, tolerance }
    }

    /// Ground position under the center of `bbox`, if the ray points down
    pub fn back_project(&self, camera: &Pose, bbox: &BoundingBox) -> Option<Vector3<f64>> {
        let (u, v) = bbox.center();
        project_to_ground(camera, &self.intrinsics, u, v)
    }

    /// Split `detections` into fresh candidates and already located ones.
    ///
    /// Pure: the same inputs always give the same outcome.
    pub fn apply(&self, detections: &[Detection], camera: &Pose, targets: &[Target]) -> ExclusionOutcome {
        let mut outcome = ExclusionOutcome::default();

        for detection in detections {
            let Some(ground) = self.back_project(camera, &detection.bbox) else {
                outcome.unprojectable += 1;
                continue;
            };

            if targets.iter().any(|t| t.is_near(&ground, self.tolerance)) {
                outcome.located.push(*detection);
            } else {
                outcome.candidates.push(Candidate {
                    detection: *detection,
                    ground,
                });
            }
        }

        outcome
    }
}
