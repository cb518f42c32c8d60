//! ID-directed multi-target pursuit
//!
//! Visits an externally supplied queue of tracker ids in order. Each id is
//! closed on with the adaptive laws, centered under a vertical camera, then
//! committed as a [`TrackedTarget`] before the queue advances.

use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info, warn};
use uav_core::geometry::body_frame_velocity_from_attitude;
use uav_core::{CameraIntrinsics, Target, TrackId, TrackedDetection, TrackedTarget};
use uav_vision::{Annotation, Annotator, BoxRole};

use crate::adaptive::AdaptiveLaws;
use crate::config::{AdaptiveConfig, CameraConfig, PursuitConfig, RecoveryConfig};
use crate::recovery::TrackRecovery;
use crate::{GuidanceAction, MotionPrimitives, PursuitOutcome, SearchBehavior, TransportResult, YawMode};

// ============================================================================
// TARGET QUEUE
// ============================================================================

/// Ordered ids still to visit plus the one being pursued
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PursuitQueue {
    pending: VecDeque<TrackId>,
    current: Option<TrackId>,
}

impl PursuitQueue {
    /// Replace the queue; the first id becomes current
    pub fn set_targets(&mut self, ids: impl IntoIterator<Item = TrackId>) {
        self.pending = ids.into_iter().collect();
        self.current = self.pending.pop_front();
    }

    /// Move on to the next queued id
    pub fn advance(&mut self) -> Option<TrackId> {
        self.current = self.pending.pop_front();
        self.current
    }

    pub fn current(&self) -> Option<TrackId> {
        self.current
    }

    pub fn pending(&self) -> Vec<TrackId> {
        self.pending.iter().copied().collect()
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

// ============================================================================
// PURSUIT
// ============================================================================

pub struct MultiPursuit {
    config: PursuitConfig,
    laws: AdaptiveLaws,
    intrinsics: CameraIntrinsics,
    annotator: Annotator,
    search: SearchBehavior,
    queue: PursuitQueue,
    stalled_on: Option<TrackId>,
    recovery: Option<TrackRecovery>,
}

impl MultiPursuit {
    pub fn new(
        config: PursuitConfig,
        adaptive: AdaptiveConfig,
        recovery: RecoveryConfig,
        camera: &CameraConfig,
        annotator: Annotator,
    ) -> Self {
        let laws = AdaptiveLaws::new(adaptive, camera.resolution, camera.fov_degrees, config.speed_rho_gain);
        Self {
            search: SearchBehavior::new(config.gate()),
            recovery: recovery.enabled.then(|| TrackRecovery::new(recovery)),
            intrinsics: camera.intrinsics(),
            laws,
            annotator,
            config,
            queue: PursuitQueue::default(),
            stalled_on: None,
        }
    }

    pub fn queue(&self) -> &PursuitQueue {
        &self.queue
    }

    pub fn current_target(&self) -> Option<TrackId> {
        self.queue.current()
    }

    pub fn set_targets(&mut self, ids: impl IntoIterator<Item = TrackId>) {
        self.queue.set_targets(ids);
        self.stalled_on = None;
        debug!("Target queue set: current {:?}, {} pending", self.queue.current(), self.queue.remaining());
    }

    pub fn recovery_enabled(&self) -> bool {
        self.recovery.is_some()
    }

    /// Drop per-pursuit state; the queue survives
    pub fn reset(&mut self) {
        self.stalled_on = None;
    }

    fn annotate(&self, tracked: &[TrackedDetection], located: &[TrackId]) -> Vec<Annotation> {
        let current = self.queue.current();
        tracked
            .iter()
            .map(|t| {
                let role = if Some(t.track_id) == current {
                    BoxRole::Current
                } else if located.contains(&t.track_id) {
                    BoxRole::Located
                } else {
                    BoxRole::Other
                };
                self.annotator.tracked(t, role)
            })
            .collect()
    }

    /// One frame of pursuit over the tracker output.
    ///
    /// `located` holds ids committed earlier, used for box roles only.
    pub async fn step(
        &mut self,
        motion: &mut MotionPrimitives,
        tracked: &[TrackedDetection],
        located: &[TrackId],
    ) -> TransportResult<PursuitOutcome<TrackedTarget>> {
        if tracked.is_empty() {
            return Ok(PursuitOutcome::new(GuidanceAction::Passthrough, Vec::new()));
        }
        let annotations = self.annotate(tracked, located);

        let Some(current) = self.queue.current() else {
            let search = self.search.step(motion).await?;
            return Ok(PursuitOutcome::new(GuidanceAction::Search(search), annotations));
        };

        let Some(chosen) = tracked.iter().find(|t| t.track_id == current).copied() else {
            return self.on_missing(current, motion, annotations).await;
        };
        if self.stalled_on.take().is_some() {
            debug!("Track {} visible again", current);
        }

        let body = motion.transport().body_pose().await?;
        if let Some(recovery) = self.recovery.as_mut().filter(|r| r.snapshot_due()) {
            recovery.record(tracked.iter().map(|t| t.track_id), body, motion.camera_pitch());
        }

        let bbox = chosen.detection.bbox;
        let (cx, cy) = bbox.center();
        let (width, height) = self.intrinsics.resolution.as_f64();
        let (target_pitch, target_yaw) = self.intrinsics.pixel_angles(cx, cy);
        let combined = body.orientation.pitch + motion.camera_pitch() + target_pitch;

        let instruction = motion.instruction();
        let altitude = (body.position.z - self.config.ground_offset).abs();
        let command = self.laws.evaluate(&bbox, altitude, instruction.as_secs_f64());
        let duration = Duration::try_from_secs_f64(command.duration).unwrap_or(instruction);
        let rate = motion.max_camera_rate();

        if combined < self.config.close_pitch_threshold {
            if !motion.camera_is_vertical() {
                motion.rotate_camera(-rate, instruction).await?;
                return Ok(PursuitOutcome::new(GuidanceAction::CameraToVertical, annotations));
            }

            let v_front = command.speed * (height / 2.0 - cy) / height;
            let v_right = command.speed * (cx - width / 2.0) / width;
            motion
                .move_velocity_body_relative(v_front, v_right, 0.0, duration, YawMode::hold())
                .await?;

            if bbox.center_offset_squared(&self.intrinsics.resolution) >= self.config.multi_centering_threshold {
                return Ok(PursuitOutcome::new(GuidanceAction::Centering, annotations));
            }

            let camera = motion.transport().camera_pose().await?;
            let target = TrackedTarget::new(
                Target::on_ground(
                    self.annotator.class_name(chosen.detection.class_id),
                    camera.position.x,
                    camera.position.y,
                ),
                current,
            );
            info!(
                "🎯 Located {} {} at ({:.2}, {:.2})",
                target.target.class_name, current, target.target.location.x, target.target.location.y
            );
            if let Some(recovery) = self.recovery.as_mut() {
                recovery.forget(current);
            }
            self.queue.advance();

            let mut outcome = PursuitOutcome::new(GuidanceAction::Located, annotations);
            outcome.located = Some(target);
            return Ok(outcome);
        }

        if height - bbox.ymax < self.config.edge_margin {
            motion.rotate_camera(-rate, duration).await?;
        }
        if bbox.ymin < self.config.edge_margin {
            motion.rotate_camera(rate, duration).await?;
        }

        let velocity = body_frame_velocity_from_attitude(command.speed, command.pitch, command.roll, target_yaw);
        let v_down = if command.rho < self.config.descend_below_rho {
            velocity.z * (-motion.camera_pitch()).sin()
        } else {
            0.0
        };
        motion
            .move_velocity_face_direction(velocity.x, -velocity.y, v_down, duration)
            .await?;
        debug!(
            "Closing on {}: rho {:.4}, speed {:.2} m/s for {:.2}s",
            current, command.rho, command.speed, command.duration
        );
        Ok(PursuitOutcome::new(GuidanceAction::Approach, annotations))
    }

    async fn on_missing(
        &mut self,
        current: TrackId,
        motion: &mut MotionPrimitives,
        annotations: Vec<Annotation>,
    ) -> TransportResult<PursuitOutcome<TrackedTarget>> {
        let newly_lost = self.stalled_on != Some(current);
        if newly_lost {
            warn!("Track {} not reported by the tracker", current);
            self.stalled_on = Some(current);
        }

        if let Some(recovery) = self.recovery.as_mut() {
            if let Some(snapshot_age) = recovery.try_recover(current, motion).await? {
                return Ok(PursuitOutcome::new(
                    GuidanceAction::Recovered {
                        track_id: current,
                        snapshot_age,
                    },
                    annotations,
                ));
            }
        }

        Ok(PursuitOutcome::new(
            GuidanceAction::Stalled {
                track_id: current,
                newly_lost,
            },
            annotations,
        ))
    }
}
