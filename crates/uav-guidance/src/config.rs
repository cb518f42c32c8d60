//! Guidance configuration
//!
//! Every tunable of the guidance loop, with defaults matching the flight-tested
//! values. The whole tree deserializes from partial input; missing fields keep
//! their defaults.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::time::Duration;
use uav_core::{CameraIntrinsics, Resolution};
use uav_vision::VisionConfig;

use crate::{GuidanceError, GuidanceResult};

/// Complete guidance configuration, built once at startup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GuidanceConfig {
    pub camera: CameraConfig,
    pub motion: MotionConfig,
    pub pursuit: PursuitConfig,
    pub adaptive: AdaptiveConfig,
    pub recovery: RecoveryConfig,
    pub worker: WorkerConfig,
    pub vision: VisionConfig,
}

impl GuidanceConfig {
    /// Reject values that would make the control laws meaningless
    pub fn validate(&self) -> GuidanceResult<()> {
        let res = self.camera.resolution;
        if res.width == 0 || res.height == 0 {
            return Err(GuidanceError::invalid_config(format!("resolution {res} has a zero side")));
        }
        if !(self.camera.fov_degrees > 0.0 && self.camera.fov_degrees < 180.0) {
            return Err(GuidanceError::invalid_config(format!(
                "field of view {} outside (0, 180) degrees",
                self.camera.fov_degrees
            )));
        }
        positive_seconds("motion.instruction_duration", self.motion.instruction_duration)?;
        if !(self.motion.max_velocity.is_finite() && self.motion.max_velocity > 0.0) {
            return Err(GuidanceError::invalid_config("max velocity must be positive"));
        }
        non_negative_seconds("pursuit.reevaluation_gate", self.pursuit.reevaluation_gate)?;
        non_negative_seconds("recovery.snapshot_interval", self.recovery.snapshot_interval)?;
        non_negative_seconds("recovery.snapshot_timeout", self.recovery.snapshot_timeout)?;
        non_negative_seconds("recovery.cooldown", self.recovery.cooldown)?;
        if self.recovery.enabled && self.recovery.max_snapshots_per_id == 0 {
            return Err(GuidanceError::invalid_config("recovery needs at least one snapshot per id"));
        }
        self.vision
            .validate()
            .map_err(|e| GuidanceError::invalid_config(e.to_string()))
    }

    /// Preset for scripted simulation runs: short gate, recovery on
    pub fn simulation() -> Self {
        Self {
            pursuit: PursuitConfig {
                reevaluation_gate: 0.25,
                ..Default::default()
            },
            recovery: RecoveryConfig {
                enabled: true,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// Finite and not negative, as `Duration::from_secs_f64` requires
fn non_negative_seconds(name: &str, value: f64) -> GuidanceResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(GuidanceError::invalid_config(format!("{name} = {value} is not a valid duration")))
    }
}

fn positive_seconds(name: &str, value: f64) -> GuidanceResult<()> {
    non_negative_seconds(name, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(GuidanceError::invalid_config(format!("{name} must be positive")))
    }
}

/// Camera and gimbal
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub resolution: Resolution,
    /// Horizontal field of view in degrees
    pub fov_degrees: f64,
    /// Gimbal pitch rate in rad/s
    pub max_rotation_rate: f64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::new(752, 480),
            fov_degrees: 90.0,
            max_rotation_rate: PI / 4.0,
        }
    }
}

impl CameraConfig {
    pub fn intrinsics(&self) -> CameraIntrinsics {
        CameraIntrinsics::new(self.resolution, self.fov_degrees)
    }
}

/// Actuation limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Length of one velocity command in seconds
    pub instruction_duration: f64,
    /// m/s
    pub max_velocity: f64,
    /// Body yaw rate while searching, deg/s
    pub max_yaw_rate: f64,
    /// Largest per-axis velocity change per body-relative command, m/s
    pub body_relative_step_limit: f64,
    /// Largest per-axis velocity change per face-direction command, m/s
    pub face_direction_step_limit: f64,
    /// Differences below this are not limited
    pub rate_limit_epsilon: f64,
    /// Speed used by fly-to commands, m/s
    pub fly_to_velocity: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            instruction_duration: 0.04,
            max_velocity: 5.0,
            max_yaw_rate: 10.0,
            body_relative_step_limit: 1.0,
            face_direction_step_limit: 2.0,
            rate_limit_epsilon: 1e-3,
            fly_to_velocity: 5.0,
        }
    }
}

impl MotionConfig {
    pub fn instruction(&self) -> Duration {
        Duration::from_secs_f64(self.instruction_duration)
    }
}

/// Pursuit thresholds shared by both state machines
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PursuitConfig {
    /// Seconds since the last actuation before an approach or search step
    pub reevaluation_gate: f64,
    /// Half-width of the box around a located target, meters
    pub exclusion_tolerance: f64,
    /// Squared pixel distance that counts as centered (single-target)
    pub centering_threshold: f64,
    /// Squared pixel distance that counts as centered (multi-target)
    pub multi_centering_threshold: f64,
    /// Combined body + gimbal + in-frame pitch below which the target is close
    pub close_pitch_threshold: f64,
    /// Frame-edge margin that triggers a gimbal nudge, pixels
    pub edge_margin: f64,
    /// Divisor applied to the approach speed law
    pub approach_divisor: f64,
    /// Empirical ground offset subtracted from body z for altitude
    pub ground_offset: f64,
    /// Descent is allowed only below this rho
    pub descend_below_rho: f64,
    /// Rho gain fed to the speed law
    pub speed_rho_gain: f64,
}

impl Default for PursuitConfig {
    fn default() -> Self {
        Self {
            reevaluation_gate: 2.0,
            exclusion_tolerance: 2.0,
            centering_threshold: 150.0,
            multi_centering_threshold: 200.0,
            close_pitch_threshold: -PI * 4.0 / 9.0,
            edge_margin: 20.0,
            approach_divisor: 5.0,
            ground_offset: 20.5,
            descend_below_rho: 0.2,
            speed_rho_gain: 20.0,
        }
    }
}

impl PursuitConfig {
    pub fn gate(&self) -> Duration {
        Duration::from_secs_f64(self.reevaluation_gate)
    }
}

/// Multi-target control-law parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    pub speed: SpeedLawConfig,
    pub step: StepLawConfig,
    pub attitude: AttitudeLawConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedLawConfig {
    pub v_base: f64,
    pub h_ref: f64,
    pub alpha: f64,
    pub beta: f64,
    pub v_max: f64,
}

impl Default for SpeedLawConfig {
    fn default() -> Self {
        Self {
            v_base: 3.0,
            h_ref: 22.0,
            alpha: 0.5,
            beta: 0.025,
            v_max: 20.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StepLawConfig {
    pub s_max: f64,
    pub s_nominal: f64,
    pub s_min: f64,
    pub rho_desired: f64,
    pub rho_threshold: f64,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    /// Upper bound of the fast-approach branch
    pub fast_below: f64,
    /// Upper bound (inclusive) of the fine-adjustment branch
    pub fine_up_to: f64,
}

impl Default for StepLawConfig {
    fn default() -> Self {
        Self {
            s_max: 3.0,
            s_nominal: 0.8,
            s_min: 0.5,
            rho_desired: 0.3,
            rho_threshold: 0.5,
            alpha: 5.0,
            beta: 2.0,
            gamma: 0.8,
            fast_below: 0.15,
            fine_up_to: 0.45,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttitudeLawConfig {
    pub k_phi: f64,
    pub k_theta: f64,
}

impl Default for AttitudeLawConfig {
    fn default() -> Self {
        Self {
            k_phi: 0.01,
            k_theta: 0.05,
        }
    }
}

/// Snapshot-based re-acquisition of a lost track id
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub enabled: bool,
    /// Minimum seconds between snapshots
    pub snapshot_interval: f64,
    /// Snapshots older than this (seconds) are not used
    pub snapshot_timeout: f64,
    pub max_snapshots_per_id: usize,
    /// Minimum seconds between recovery attempts
    pub cooldown: f64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            snapshot_interval: 0.2,
            snapshot_timeout: 15.0,
            max_snapshots_per_id: 30,
            cooldown: 2.0,
        }
    }
}

/// Frame-loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Pause after a failed frame, milliseconds
    pub failure_backoff_ms: u64,
    pub command_capacity: usize,
    pub event_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            failure_backoff_ms: 100,
            command_capacity: 32,
            event_capacity: 256,
        }
    }
}

impl WorkerConfig {
    pub fn failure_backoff(&self) -> Duration {
        Duration::from_millis(self.failure_backoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = GuidanceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.camera.resolution, Resolution::new(752, 480));
        assert_eq!(config.pursuit.gate(), Duration::from_secs(2));
        assert!(!config.recovery.enabled);
    }

    #[test]
    fn test_validate_rejects_bad_camera() {
        let mut config = GuidanceConfig::default();
        config.camera.resolution = Resolution::new(0, 480);
        assert!(config.validate().is_err());

        let mut config = GuidanceConfig::default();
        config.camera.fov_degrees = 180.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_motion() {
        let mut config = GuidanceConfig::default();
        config.motion.instruction_duration = 0.0;
        assert!(config.validate().is_err());

        let mut config = GuidanceConfig::default();
        config.motion.max_velocity = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_finite_durations() {
        let mut config = GuidanceConfig::default();
        config.motion.instruction_duration = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = GuidanceConfig::default();
        config.motion.max_velocity = f64::INFINITY;
        assert!(config.validate().is_err());

        let mut config = GuidanceConfig::default();
        config.pursuit.reevaluation_gate = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = GuidanceConfig::default();
        config.pursuit.reevaluation_gate = f64::INFINITY;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_recovery() {
        let mut config = GuidanceConfig::simulation();
        config.recovery.cooldown = -1.0;
        assert!(config.validate().is_err());

        let mut config = GuidanceConfig::simulation();
        config.recovery.snapshot_interval = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = GuidanceConfig::simulation();
        config.recovery.snapshot_timeout = -0.5;
        assert!(config.validate().is_err());

        let mut config = GuidanceConfig::simulation();
        config.recovery.max_snapshots_per_id = 0;
        assert!(config.validate().is_err());

        // an unused cap is harmless while recovery is off
        let mut config = GuidanceConfig::default();
        config.recovery.max_snapshots_per_id = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_input_keeps_defaults() {
        let json = r#"{ "pursuit": { "reevaluation_gate": 0.5 }, "recovery": { "enabled": true } }"#;
        let config: GuidanceConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.pursuit.reevaluation_gate, 0.5);
        assert_eq!(config.pursuit.centering_threshold, 150.0);
        assert!(config.recovery.enabled);
        assert_eq!(config.recovery.max_snapshots_per_id, 30);
        assert_eq!(config.adaptive.speed.v_max, 20.0);
    }

    #[test]
    fn test_simulation_preset() {
        let config = GuidanceConfig::simulation();
        assert!(config.validate().is_ok());
        assert!(config.recovery.enabled);
        assert!(config.pursuit.reevaluation_gate < 2.0);
    }
}
