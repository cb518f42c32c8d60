//! Kinematic vehicle behind the guidance [`Transport`]
//!
//! Velocity commands are followed exactly for their duration, after which
//! the vehicle hovers. State is integrated lazily on every transport call.

use async_trait::async_trait;
use nalgebra::Vector3;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;
use uav_core::{EulerAngles, Pose, Resolution};
use uav_guidance::{Drivetrain, Transport, TransportResult, VelocityCommand, YawMode};
use uav_vision::Frame;

/// Horizontal speed below which a forward-only command keeps its heading
const MIN_TURN_SPEED: f64 = 0.05;

#[derive(Debug, Clone, Copy)]
struct ActiveCommand {
    command: VelocityCommand,
    until: Instant,
}

/// Simulated vehicle state
#[derive(Debug, Clone)]
pub struct VehicleState {
    pub body: Pose,
    pub gimbal_pitch: f64,
    active: Option<ActiveCommand>,
    updated_at: Instant,
}

impl VehicleState {
    pub fn new(body: Pose) -> Self {
        Self {
            body,
            gimbal_pitch: 0.0,
            active: None,
            updated_at: Instant::now(),
        }
    }

    /// Camera pose: body position, gimbal pitch added to body pitch
    pub fn camera_pose(&self) -> Pose {
        let o = self.body.orientation;
        Pose::new(self.body.position, EulerAngles::new(o.pitch + self.gimbal_pitch, o.roll, o.yaw))
    }

    /// Velocity at `now`; zero once the active command ran out
    pub fn velocity_at(&self, now: Instant) -> Vector3<f64> {
        match self.active {
            Some(active) if now < active.until => active.command.velocity,
            _ => Vector3::zeros(),
        }
    }

    /// Integrate up to `now`
    pub fn advance(&mut self, now: Instant) {
        let Some(active) = self.active else {
            self.updated_at = now;
            return;
        };

        let end = now.min(active.until);
        let dt = end.saturating_duration_since(self.updated_at).as_secs_f64();
        if dt > 0.0 {
            let velocity = active.command.velocity;
            self.body.position += velocity * dt;
            self.body.orientation.yaw = next_yaw(self.body.orientation.yaw, &active.command, dt);
        }

        if now >= active.until {
            self.active = None;
        }
        self.updated_at = now;
    }
}

fn next_yaw(yaw: f64, command: &VelocityCommand, dt: f64) -> f64 {
    match (command.drivetrain, command.yaw_mode) {
        (Drivetrain::MaxDegreeOfFreedom, YawMode::Rate(rate)) => wrap_angle(yaw + rate.to_radians() * dt),
        (Drivetrain::MaxDegreeOfFreedom, YawMode::Angle(angle)) => wrap_angle(angle.to_radians()),
        (Drivetrain::ForwardOnly, yaw_mode) => {
            let v = command.velocity;
            if v.x.hypot(v.y) < MIN_TURN_SPEED {
                return yaw;
            }
            let offset = match yaw_mode {
                YawMode::Angle(angle) => angle.to_radians(),
                YawMode::Rate(_) => 0.0,
            };
            wrap_angle(v.y.atan2(v.x) + offset)
        }
    }
}

fn wrap_angle(angle: f64) -> f64 {
    let wrapped = (angle + std::f64::consts::PI).rem_euclid(std::f64::consts::TAU);
    wrapped - std::f64::consts::PI
}

/// In-process stand-in for the simulator RPC client
pub struct SimTransport {
    state: Arc<RwLock<VehicleState>>,
    resolution: Resolution,
    frame_interval: Duration,
}

impl SimTransport {
    pub fn new(start: Pose, resolution: Resolution, frame_interval: Duration) -> Self {
        Self {
            state: Arc::new(RwLock::new(VehicleState::new(start))),
            resolution,
            frame_interval,
        }
    }

    /// Shared vehicle state, read by the simulated scene
    pub fn state(&self) -> Arc<RwLock<VehicleState>> {
        self.state.clone()
    }

    fn advanced(&self) -> parking_lot::RwLockWriteGuard<'_, VehicleState> {
        let mut state = self.state.write();
        state.advance(Instant::now());
        state
    }
}

#[async_trait]
impl Transport for SimTransport {
    async fn body_pose(&self) -> TransportResult<Pose> {
        Ok(self.advanced().body)
    }

    async fn body_velocity(&self) -> TransportResult<Vector3<f64>> {
        Ok(self.advanced().velocity_at(Instant::now()))
    }

    async fn camera_pose(&self) -> TransportResult<Pose> {
        Ok(self.advanced().camera_pose())
    }

    async fn command_velocity(&self, command: VelocityCommand) -> TransportResult<()> {
        let mut state = self.advanced();
        trace!(?command, "sim velocity");
        state.active = Some(ActiveCommand {
            command,
            until: Instant::now() + command.duration,
        });
        Ok(())
    }

    async fn command_camera_pose(&self, orientation: EulerAngles) -> TransportResult<()> {
        self.advanced().gimbal_pitch = orientation.pitch;
        Ok(())
    }

    async fn capture_frame(&self) -> TransportResult<Frame> {
        tokio::time::sleep(self.frame_interval).await;
        self.advanced();
        Ok(Frame::blank(self.resolution.width, self.resolution.height))
    }

    async fn move_to_position(&self, position: Vector3<f64>, velocity: f64) -> TransportResult<()> {
        let distance = (position - self.advanced().body.position).norm();
        if velocity > 0.0 && distance.is_finite() {
            tokio::time::sleep(Duration::from_secs_f64(distance / velocity)).await;
        }

        let mut state = self.advanced();
        state.body.position = position;
        state.active = None;
        Ok(())
    }

    async fn set_vehicle_pose(&self, pose: Pose) -> TransportResult<()> {
        let mut state = self.advanced();
        state.body = pose;
        state.active = None;
        Ok(())
    }
}
