//! Single-target pursuit
//!
//! Picks the nearest detection that is not an already located target,
//! approaches it under the re-evaluation gate, then centers over it with the
//! camera pointing straight down and commits a [`Target`].

use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;
use tracing::{debug, info};
use uav_core::{CameraIntrinsics, Detection, Pose, Target};
use uav_vision::{Annotation, Annotator, BoxRole};

use crate::config::{CameraConfig, PursuitConfig};
use crate::exclusion::{Candidate, ExclusionFilter};
use crate::{
    GuidanceAction, MotionPrimitives, PursuitOutcome, SearchAction, SearchBehavior, TransportResult, YawMode,
};

/// Where the single-target state machine stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PursuitState {
    #[default]
    Searching,
    Approaching,
    /// Latched until the target is committed or pursuit resets
    Centering,
}

pub struct SinglePursuit {
    config: PursuitConfig,
    intrinsics: CameraIntrinsics,
    exclusion: ExclusionFilter,
    annotator: Annotator,
    search: SearchBehavior,
    state: PursuitState,
    camera_raising: bool,
}

impl SinglePursuit {
    pub fn new(config: PursuitConfig, camera: &CameraConfig, annotator: Annotator) -> Self {
        let intrinsics = camera.intrinsics();
        Self {
            exclusion: ExclusionFilter::new(intrinsics, config.exclusion_tolerance),
            search: SearchBehavior::new(config.gate()),
            intrinsics,
            annotator,
            config,
            state: PursuitState::Searching,
            camera_raising: false,
        }
    }

    pub fn state(&self) -> PursuitState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = PursuitState::Searching;
        self.camera_raising = false;
    }

    /// Nearest candidate to the camera on the ground plane.
    ///
    /// While the camera is being raised, boxes about to leave through the
    /// bottom edge are skipped.
    fn select<'a>(&self, candidates: &'a [Candidate], camera: &Pose) -> Option<&'a Candidate> {
        let height = self.intrinsics.resolution.height as f64;
        candidates
            .iter()
            .filter(|c| !(self.camera_raising && height - c.detection.bbox.ymax < self.config.edge_margin))
            .min_by(|a, b| {
                camera
                    .horizontal_distance_squared(&a.ground)
                    .total_cmp(&camera.horizontal_distance_squared(&b.ground))
            })
    }

    /// One frame of pursuit over `detections`, given the targets located so far
    pub async fn step(
        &mut self,
        motion: &mut MotionPrimitives,
        detections: &[Detection],
        targets: &[Target],
    ) -> TransportResult<PursuitOutcome<Target>> {
        let camera = motion.transport().camera_pose().await?;
        let outcome = self.exclusion.apply(detections, &camera, targets);

        let mut annotations: Vec<Annotation> = outcome
            .located
            .iter()
            .map(|d| self.annotator.detection(d, BoxRole::Located))
            .collect();

        let Some(chosen) = self.select(&outcome.candidates, &camera).copied() else {
            annotations.extend(
                outcome
                    .candidates
                    .iter()
                    .map(|c| self.annotator.detection(&c.detection, BoxRole::Other)),
            );
            self.state = PursuitState::Searching;
            let search = self.search.step(motion).await?;
            if search == SearchAction::CameraSweep {
                self.camera_raising = true;
            }
            return Ok(PursuitOutcome::new(GuidanceAction::Search(search), annotations));
        };

        for candidate in &outcome.candidates {
            let role = if candidate.detection == chosen.detection {
                BoxRole::Current
            } else {
                BoxRole::Other
            };
            annotations.push(self.annotator.detection(&candidate.detection, role));
        }

        let bbox = chosen.detection.bbox;
        let (cx, cy) = bbox.center();
        let (target_pitch, target_yaw) = self.intrinsics.pixel_angles(cx, cy);
        let body = motion.transport().body_pose().await?;
        let combined = body.orientation.pitch + motion.camera_pitch() + target_pitch;

        if self.state == PursuitState::Searching {
            debug!("Candidate acquired at ({:.1}, {:.1})", chosen.ground.x, chosen.ground.y);
            self.state = PursuitState::Approaching;
        }
        if combined < self.config.close_pitch_threshold {
            self.state = PursuitState::Centering;
        }

        let (width, height) = self.intrinsics.resolution.as_f64();
        let instruction = motion.instruction();
        let v_max = motion.max_velocity();
        let rate = motion.max_camera_rate();

        if self.state == PursuitState::Approaching {
            if !motion.cooldown_elapsed(self.config.gate()) {
                return Ok(PursuitOutcome::new(GuidanceAction::AwaitingGate, annotations));
            }

            let pitch_to_body = FRAC_PI_2 + combined;
            let speed = v_max * (pitch_to_body / self.config.approach_divisor);
            if height - bbox.ymax < self.config.edge_margin {
                motion.rotate_camera(-rate, instruction).await?;
            }
            if bbox.ymin < self.config.edge_margin {
                motion.rotate_camera(rate, instruction).await?;
            }
            motion
                .move_velocity_face_direction(speed * target_yaw.cos(), speed * target_yaw.sin(), 0.0, instruction)
                .await?;
            self.camera_raising = false;
            return Ok(PursuitOutcome::new(GuidanceAction::Approach, annotations));
        }

        if !motion.camera_is_vertical() {
            motion.rotate_camera(-rate, instruction).await?;
            return Ok(PursuitOutcome::new(GuidanceAction::CameraToVertical, annotations));
        }

        let v_front = v_max * (height / 2.0 - cy) / 2.0 / height;
        let v_right = v_max * (cx - width / 2.0) / 2.0 / width;
        motion
            .move_velocity_body_relative(v_front, v_right, 0.0, instruction, YawMode::hold())
            .await?;
        self.camera_raising = false;

        if bbox.center_offset_squared(&self.intrinsics.resolution) >= self.config.centering_threshold {
            return Ok(PursuitOutcome::new(GuidanceAction::Centering, annotations));
        }

        let target = Target::on_ground(
            self.annotator.class_name(chosen.detection.class_id),
            camera.position.x,
            camera.position.y,
        );
        info!(
            "🎯 Located {} at ({:.2}, {:.2})",
            target.class_name, target.location.x, target.location.y
        );
        self.reset();

        let mut outcome = PursuitOutcome::new(GuidanceAction::Located, annotations);
        outcome.located = Some(target);
        Ok(outcome)
    }
}
