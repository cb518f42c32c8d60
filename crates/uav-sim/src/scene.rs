//! Simulated ground scene
//!
//! Ground vehicles at fixed positions, seen through the same pinhole model the
//! guidance loop uses for back-projection. The detector reports every vehicle
//! whose center falls inside the frame; the tracker labels detections with the
//! ground-truth vehicle id.

use nalgebra::Vector3;
use parking_lot::RwLock;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;
use uav_core::geometry::project_to_image;
use uav_core::{BoundingBox, CameraIntrinsics, Detection, TrackId, TrackedDetection};
use uav_vision::{Detector, Frame, Tracker, VisionResult, VEHICLE_CLASSES};

use crate::transport::VehicleState;

/// Pixel distance within which a detection is matched to a vehicle
const MATCH_RADIUS_PX: f64 = 4.0;

/// One parked vehicle
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GroundVehicle {
    pub id: TrackId,
    pub class_id: usize,
    pub position: Vector3<f64>,
    /// Footprint edge length, meters
    pub size: f64,
}

pub struct SimScene {
    vehicles: Vec<GroundVehicle>,
    vehicle_state: Arc<RwLock<VehicleState>>,
    intrinsics: CameraIntrinsics,
}

impl SimScene {
    pub fn new(
        vehicles: Vec<GroundVehicle>,
        vehicle_state: Arc<RwLock<VehicleState>>,
        intrinsics: CameraIntrinsics,
    ) -> Self {
        Self {
            vehicles,
            vehicle_state,
            intrinsics,
        }
    }

    /// `count` vehicles scattered within `radius` meters of the origin.
    ///
    /// Ids start at 1 and follow generation order.
    pub fn random(
        count: usize,
        radius: f64,
        seed: u64,
        vehicle_state: Arc<RwLock<VehicleState>>,
        intrinsics: CameraIntrinsics,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let vehicles = (1..=count as u64)
            .map(|id| GroundVehicle {
                id: TrackId(id),
                class_id: rng.gen_range(0..VEHICLE_CLASSES.len()),
                position: Vector3::new(rng.gen_range(-radius..radius), rng.gen_range(-radius..radius), 0.0),
                size: rng.gen_range(3.0..6.0),
            })
            .collect();
        Self::new(vehicles, vehicle_state, intrinsics)
    }

    pub fn vehicles(&self) -> &[GroundVehicle] {
        &self.vehicles
    }

    /// Vehicles visible from the current camera pose, with their boxes
    pub fn visible(&self) -> Vec<(GroundVehicle, BoundingBox)> {
        let camera = self.vehicle_state.read().camera_pose();
        let (width, height) = self.intrinsics.resolution.as_f64();
        let focal = self.intrinsics.focal_length();

        self.vehicles
            .iter()
            .filter_map(|vehicle| {
                let (u, v) = project_to_image(&camera, &self.intrinsics, &vehicle.position)?;
                if !(0.0..width).contains(&u) || !(0.0..height).contains(&v) {
                    return None;
                }
                let range = (vehicle.position - camera.position).norm().max(1.0);
                let side = focal * vehicle.size / range;
                Some((*vehicle, BoundingBox::centered(u, v, side, side * 0.6)))
            })
            .collect()
    }

    /// Vehicle nearest to `point` on the ground plane, with its distance
    pub fn nearest_vehicle(&self, point: &Vector3<f64>) -> Option<(&GroundVehicle, f64)> {
        self.vehicles
            .iter()
            .map(|v| (v, (v.position - point).xy().norm()))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }
}

/// Detector over a shared [`SimScene`]
pub struct SceneDetector(pub Arc<SimScene>);

impl Detector for SceneDetector {
    fn infer(&mut self, _frame: &Frame, _confidence: f32) -> VisionResult<Vec<Detection>> {
        let detections: Vec<Detection> = self
            .0
            .visible()
            .into_iter()
            .map(|(vehicle, bbox)| Detection::new(bbox, 0.9, vehicle.class_id))
            .collect();
        debug!("Scene detector: {} vehicles in view", detections.len());
        Ok(detections)
    }
}

/// Tracker assigning ground-truth ids to detections
pub struct SceneTracker(pub Arc<SimScene>);

impl Tracker for SceneTracker {
    fn update(&mut self, detections: &[Detection], _frame: &Frame) -> VisionResult<Vec<TrackedDetection>> {
        let visible = self.0.visible();
        let tracked = detections
            .iter()
            .filter_map(|detection| {
                let (cx, cy) = detection.bbox.center();
                visible
                    .iter()
                    .find(|(_, bbox)| {
                        let (u, v) = bbox.center();
                        (u - cx).hypot(v - cy) < MATCH_RADIUS_PX
                    })
                    .map(|(vehicle, _)| TrackedDetection::new(*detection, vehicle.id))
            })
            .collect();
        Ok(tracked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;
    use uav_core::{EulerAngles, Pose};

    fn scene_over(vehicles: Vec<GroundVehicle>, gimbal: f64) -> Arc<SimScene> {
        let mut state = VehicleState::new(Pose::new(Vector3::new(0.0, 0.0, -20.0), EulerAngles::default()));
        state.gimbal_pitch = gimbal;
        Arc::new(SimScene::new(vehicles, Arc::new(RwLock::new(state)), CameraIntrinsics::default()))
    }

    fn vehicle(id: u64, x: f64, y: f64) -> GroundVehicle {
        GroundVehicle {
            id: TrackId(id),
            class_id: 4,
            position: Vector3::new(x, y, 0.0),
            size: 4.0,
        }
    }

    #[test]
    fn test_vehicle_below_vertical_camera_is_centered() {
        let scene = scene_over(vec![vehicle(1, 0.0, 0.0)], -FRAC_PI_2);
        let mut detector = SceneDetector(scene);

        let detections = detector.infer(&Frame::blank(752, 480), 0.5).unwrap();
        assert_eq!(detections.len(), 1);
        let (cx, cy) = detections[0].bbox.center();
        assert!((cx - 376.0).abs() < 1e-6);
        assert!((cy - 240.0).abs() < 1e-6);
        assert_eq!(detections[0].class_id, 4);
    }

    #[test]
    fn test_out_of_view_vehicles_are_not_detected() {
        // level camera looking north: a vehicle to the south is behind it
        let scene = scene_over(vec![vehicle(1, -30.0, 0.0), vehicle(2, 60.0, 0.0)], 0.0);
        let visible = scene.visible();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].0.id, TrackId(2));
    }

    #[test]
    fn test_tracker_labels_with_vehicle_ids() {
        let scene = scene_over(vec![vehicle(3, 2.0, 1.0), vehicle(8, -4.0, -3.0)], -FRAC_PI_2);
        let frame = Frame::blank(752, 480);
        let detections = SceneDetector(scene.clone()).infer(&frame, 0.5).unwrap();

        let tracked = SceneTracker(scene).update(&detections, &frame).unwrap();
        let mut ids: Vec<_> = tracked.iter().map(|t| t.track_id).collect();
        ids.sort();
        assert_eq!(ids, vec![TrackId(3), TrackId(8)]);
    }

    #[test]
    fn test_random_scene_is_deterministic() {
        let state = Arc::new(RwLock::new(VehicleState::new(Pose::at(0.0, 0.0, -20.0))));
        let a = SimScene::random(4, 30.0, 11, state.clone(), CameraIntrinsics::default());
        let b = SimScene::random(4, 30.0, 11, state, CameraIntrinsics::default());
        assert_eq!(a.vehicles(), b.vehicles());
        assert_eq!(a.vehicles()[3].id, TrackId(4));
    }

    #[test]
    fn test_nearest_vehicle() {
        let scene = scene_over(vec![vehicle(1, 10.0, 0.0), vehicle(2, 1.0, 1.0)], 0.0);
        let (nearest, distance) = scene.nearest_vehicle(&Vector3::new(0.0, 0.0, 0.0)).unwrap();
        assert_eq!(nearest.id, TrackId(2));
        assert!((distance - 2f64.sqrt()).abs() < 1e-12);
    }
}
