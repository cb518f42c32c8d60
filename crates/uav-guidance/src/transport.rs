//! Vehicle and camera transport
//!
//! The guidance loop talks to the vehicle only through [`Transport`]. Every
//! call is one request/response round trip; there is no retry at this layer.

use async_trait::async_trait;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uav_core::{EulerAngles, Pose};
use uav_vision::Frame;

use crate::TransportResult;

/// How the body is oriented while a velocity command runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Drivetrain {
    /// Heading is controlled independently by the yaw mode
    MaxDegreeOfFreedom,
    /// Body turns to face the direction of travel
    ForwardOnly,
}

/// Heading control for a velocity command, in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum YawMode {
    /// Hold an absolute heading (relative to travel for `ForwardOnly`)
    Angle(f64),
    /// Turn at a constant rate, deg/s
    Rate(f64),
}

impl YawMode {
    /// Keep the current heading
    pub fn hold() -> Self {
        YawMode::Rate(0.0)
    }
}

impl Default for YawMode {
    fn default() -> Self {
        Self::hold()
    }
}

/// One world-frame velocity command
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocityCommand {
    /// NED, m/s
    pub velocity: Vector3<f64>,
    pub duration: Duration,
    pub drivetrain: Drivetrain,
    pub yaw_mode: YawMode,
}

/// Vehicle/camera RPC surface consumed by the guidance loop
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Vehicle position and attitude
    async fn body_pose(&self) -> TransportResult<Pose>;

    /// Vehicle velocity in the world frame
    async fn body_velocity(&self) -> TransportResult<Vector3<f64>>;

    /// Camera position and attitude in the world frame (gimbal included)
    async fn camera_pose(&self) -> TransportResult<Pose>;

    /// Issue a velocity command; returns once acknowledged
    async fn command_velocity(&self, command: VelocityCommand) -> TransportResult<()>;

    /// Set the gimbal attitude relative to the body
    async fn command_camera_pose(&self, orientation: EulerAngles) -> TransportResult<()>;

    /// Latest camera image
    async fn capture_frame(&self) -> TransportResult<Frame>;

    /// Fly to a position and wait for arrival
    async fn move_to_position(&self, position: Vector3<f64>, velocity: f64) -> TransportResult<()>;

    /// Place the vehicle at a pose without flying there
    async fn set_vehicle_pose(&self, pose: Pose) -> TransportResult<()>;
}

/// Build a frame from a raw transport image, rejecting size mismatches
pub fn frame_from_bgr(width: u32, height: u32, data: Vec<u8>) -> TransportResult<Frame> {
    Ok(Frame::from_bgr(width, height, data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TransportError;

    #[test]
    fn test_malformed_image_is_transport_error() {
        let err = frame_from_bgr(10, 10, vec![0; 12]).unwrap_err();
        assert!(matches!(err, TransportError::MalformedResponse(_)));
        assert!(frame_from_bgr(2, 2, vec![0; 12]).is_ok());
    }
}
