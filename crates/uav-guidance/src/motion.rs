//! Motion primitives
//!
//! The only actuation surface of the guidance loop. Each primitive issues at
//! most one outbound actuation request, and every invocation stamps the
//! last-controlled clock, even when the request fails.
//!
//! The gimbal pitch is owned here and always lies in [-π/2, 0].

use metrics::gauge;
use nalgebra::Vector3;
use std::f64::consts::FRAC_PI_2;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};
use uav_core::geometry::body_to_world_velocity;
use uav_core::{EulerAngles, Pose};

use crate::config::{CameraConfig, MotionConfig};
use crate::{Drivetrain, Transport, TransportResult, VelocityCommand, YawMode};

/// Lowest gimbal pitch (straight down)
pub const GIMBAL_MIN_PITCH: f64 = -FRAC_PI_2;
/// Highest gimbal pitch (level)
pub const GIMBAL_MAX_PITCH: f64 = 0.0;

/// Limit each axis of `commanded` to within `step` of `reported`.
///
/// Axes already within `epsilon` of the reported value pass unchanged.
pub fn rate_limit(commanded: &Vector3<f64>, reported: &Vector3<f64>, step: f64, epsilon: f64) -> Vector3<f64> {
    commanded.zip_map(reported, |cmd, rep| {
        if cmd - rep > epsilon {
            cmd.min(rep + step)
        } else if rep - cmd > epsilon {
            cmd.max(rep - step)
        } else {
            cmd
        }
    })
}

fn clamp_gimbal(pitch: f64) -> f64 {
    pitch.clamp(GIMBAL_MIN_PITCH, GIMBAL_MAX_PITCH)
}

/// Time-stamped actuation on top of a [`Transport`]
pub struct MotionPrimitives {
    transport: Arc<dyn Transport>,
    config: MotionConfig,
    max_camera_rate: f64,
    camera_pitch: f64,
    last_controlled: Option<Instant>,
}

impl MotionPrimitives {
    pub fn new(transport: Arc<dyn Transport>, config: MotionConfig, camera: &CameraConfig) -> Self {
        Self {
            transport,
            config,
            max_camera_rate: camera.max_rotation_rate,
            camera_pitch: GIMBAL_MAX_PITCH,
            last_controlled: None,
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Current gimbal pitch
    pub fn camera_pitch(&self) -> f64 {
        self.camera_pitch
    }

    pub fn camera_is_vertical(&self) -> bool {
        self.camera_pitch <= GIMBAL_MIN_PITCH
    }

    pub fn max_velocity(&self) -> f64 {
        self.config.max_velocity
    }

    pub fn max_camera_rate(&self) -> f64 {
        self.max_camera_rate
    }

    /// Body yaw rate used while searching, deg/s
    pub fn max_yaw_rate(&self) -> f64 {
        self.config.max_yaw_rate
    }

    pub fn instruction(&self) -> Duration {
        self.config.instruction()
    }

    pub fn last_controlled(&self) -> Option<Instant> {
        self.last_controlled
    }

    /// Whether more than `gate` has passed since the last actuation.
    ///
    /// Never-controlled counts as elapsed.
    pub fn cooldown_elapsed(&self, gate: Duration) -> bool {
        self.last_controlled.is_none_or(|at| at.elapsed() > gate)
    }

    fn mark_controlled(&mut self) {
        self.last_controlled = Some(Instant::now());
    }

    /// Velocity command in body axes, heading controlled by `yaw_mode`
    pub async fn move_velocity_body_relative(
        &mut self,
        v_front: f64,
        v_right: f64,
        v_down: f64,
        duration: Duration,
        yaw_mode: YawMode,
    ) -> TransportResult<VelocityCommand> {
        self.mark_controlled();
        let step = self.config.body_relative_step_limit;
        self.send_velocity(v_front, v_right, v_down, duration, Drivetrain::MaxDegreeOfFreedom, yaw_mode, step)
            .await
    }

    /// Velocity command in body axes, body turning to face the travel direction
    pub async fn move_velocity_face_direction(
        &mut self,
        v_front: f64,
        v_right: f64,
        v_down: f64,
        duration: Duration,
    ) -> TransportResult<VelocityCommand> {
        self.mark_controlled();
        let step = self.config.face_direction_step_limit;
        self.send_velocity(v_front, v_right, v_down, duration, Drivetrain::ForwardOnly, YawMode::Angle(0.0), step)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn send_velocity(
        &mut self,
        v_front: f64,
        v_right: f64,
        v_down: f64,
        duration: Duration,
        drivetrain: Drivetrain,
        yaw_mode: YawMode,
        step: f64,
    ) -> TransportResult<VelocityCommand> {
        let pose = self.transport.body_pose().await?;
        let world = body_to_world_velocity(v_front, v_right, v_down, pose.orientation.yaw);
        let reported = self.transport.body_velocity().await?;
        let velocity = rate_limit(&world, &reported, step, self.config.rate_limit_epsilon);

        let command = VelocityCommand {
            velocity,
            duration,
            drivetrain,
            yaw_mode,
        };
        trace!(?command, requested = ?world, "velocity command");
        self.transport.command_velocity(command).await?;
        Ok(command)
    }

    /// Integrate `rate * duration` into the gimbal pitch, clamp, and send it
    pub async fn rotate_camera(&mut self, rate: f64, duration: Duration) -> TransportResult<f64> {
        let next = self.camera_pitch + rate * duration.as_secs_f64();
        self.set_camera(next).await
    }

    /// Set the gimbal to an absolute pitch, clamped
    pub async fn point_camera(&mut self, pitch: f64) -> TransportResult<f64> {
        self.set_camera(pitch).await
    }

    async fn set_camera(&mut self, requested: f64) -> TransportResult<f64> {
        self.mark_controlled();
        let pitch = if requested.is_finite() {
            clamp_gimbal(requested)
        } else {
            self.camera_pitch
        };

        self.transport
            .command_camera_pose(EulerAngles::from_pitch(pitch))
            .await?;
        self.camera_pitch = pitch;
        gauge!("uav_gimbal_pitch_radians").set(pitch);
        Ok(pitch)
    }

    /// Zero velocity for one instruction period
    pub async fn hover(&mut self) -> TransportResult<()> {
        self.mark_controlled();
        let command = VelocityCommand {
            velocity: Vector3::zeros(),
            duration: self.instruction(),
            drivetrain: Drivetrain::MaxDegreeOfFreedom,
            yaw_mode: YawMode::hold(),
        };
        self.transport.command_velocity(command).await
    }

    /// Blocking point-to-point move, outside the per-frame loop
    pub async fn fly_to_position(&mut self, target: Vector3<f64>, velocity: Option<f64>) -> TransportResult<()> {
        self.mark_controlled();
        let velocity = velocity.unwrap_or(self.config.fly_to_velocity);
        debug!("Flying to ({:.1}, {:.1}, {:.1}) at {:.1} m/s", target.x, target.y, target.z, velocity);
        self.transport.move_to_position(target, velocity).await
    }

    /// Teleport the vehicle to a pose
    pub async fn set_position_directly(&mut self, pose: Pose) -> TransportResult<()> {
        self.mark_controlled();
        debug!(
            "Placing vehicle at ({:.1}, {:.1}, {:.1})",
            pose.position.x, pose.position.y, pose.position.z
        );
        self.transport.set_vehicle_pose(pose).await
    }
}

// ============================================================================
// TESTS
// ============================================================================
