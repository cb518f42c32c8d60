//! Search behavior when no candidate is visible
//!
//! Priority, re-evaluated each time the gate opens: raise the camera while it
//! is below level, otherwise turn the body in place.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::{MotionPrimitives, TransportResult, YawMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchAction {
    /// Gimbal raised one step
    CameraSweep,
    /// Body yawed in place
    BodyRotate,
    /// Gate still closed, nothing issued
    CoolingDown,
}

#[derive(Debug, Clone)]
pub struct SearchBehavior {
    gate: Duration,
}

impl SearchBehavior {
    pub fn new(gate: Duration) -> Self {
        Self { gate }
    }

    pub async fn step(&self, motion: &mut MotionPrimitives) -> TransportResult<SearchAction> {
        if !motion.cooldown_elapsed(self.gate) {
            return Ok(SearchAction::CoolingDown);
        }

        let duration = motion.instruction();
        if motion.camera_pitch() < 0.0 {
            let pitch = motion.rotate_camera(motion.max_camera_rate(), duration).await?;
            debug!("Search: camera raised to {:.3} rad", pitch);
            Ok(SearchAction::CameraSweep)
        } else {
            let yaw_mode = YawMode::Rate(motion.max_yaw_rate());
            motion
                .move_velocity_body_relative(0.0, 0.0, 0.0, duration, yaw_mode)
                .await?;
            debug!("Search: rotating body at {:.1} deg/s", motion.max_yaw_rate());
            Ok(SearchAction::BodyRotate)
        }
    }
}
