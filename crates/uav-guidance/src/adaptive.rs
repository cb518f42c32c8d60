//! Adaptive control laws for ID-directed pursuit
//!
//! All three laws take `rho`, the normalized box area, as the proximity proxy:
//! small boxes are far away, large boxes are close.

use uav_core::{BoundingBox, Resolution};

use crate::config::{AdaptiveConfig, AttitudeLawConfig, SpeedLawConfig, StepLawConfig};

/// Normalized bounding-box area, width ratio times height ratio
pub fn rho(bbox: &BoundingBox, resolution: &Resolution) -> f64 {
    let (w, h) = bbox.normalized_size(resolution);
    w * h
}

/// Focal-length proxy `1 / tan(fov / 2)`.
///
/// The half angle goes to `tan` as-is, so a value given in degrees is
/// treated as radians. The attitude law was tuned with this proxy.
pub fn focal_proxy(fov_degrees: f64) -> f64 {
    1.0 / (fov_degrees / 2.0).tan()
}

/// Sigmoid speed in `rho`, damped by altitude, boosted by pixel offset.
///
/// Result is clipped to `[0, v_max]`.
pub fn speed_law(config: &SpeedLawConfig, rho: f64, altitude: f64, dx: f64, dy: f64) -> f64 {
    let sigmoid = config.v_base / (1.0 + rho.exp());
    let height = (1.0 + altitude / config.h_ref).powf(-config.alpha);
    let offset = config.beta * (dx * dx + dy * dy).sqrt();
    let v = sigmoid * height + offset;
    if v.is_nan() { 0.0 } else { v.clamp(0.0, config.v_max) }
}

/// Branch of the piecewise step law
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepRegime {
    FastApproach,
    FineAdjust,
    Safety,
}

impl StepLawConfig {
    pub fn regime(&self, rho: f64) -> StepRegime {
        if rho < self.fast_below {
            StepRegime::FastApproach
        } else if rho <= self.fine_up_to {
            StepRegime::FineAdjust
        } else {
            StepRegime::Safety
        }
    }
}

/// Distance to cover this step, meters
pub fn step_law(config: &StepLawConfig, rho: f64) -> f64 {
    match config.regime(rho) {
        StepRegime::FastApproach => config.s_max * (config.beta * (config.rho_desired - rho)).tanh(),
        StepRegime::FineAdjust => config.s_nominal * (1.0 + config.gamma * (config.rho_desired - rho)),
        StepRegime::Safety => config.s_min * (-config.alpha * (rho - config.rho_threshold)).exp(),
    }
}

/// Roll and pitch corrections `(phi, theta)` for a pixel offset.
///
/// `dx` grows to the right, `dy` grows upward, `focal` is [`focal_proxy`].
pub fn attitude_adjustment(
    config: &AttitudeLawConfig,
    dx: f64,
    dy: f64,
    width: f64,
    altitude: f64,
    focal: f64,
) -> (f64, f64) {
    let phi = config.k_phi * (dx / width) * (altitude / focal);
    let theta = config.k_theta * (dy / focal).atan();
    (phi, theta)
}

/// Outputs of all three laws for one tracked box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptiveCommand {
    pub rho: f64,
    pub speed: f64,
    pub step: f64,
    pub roll: f64,
    pub pitch: f64,
    /// Seconds the command should run
    pub duration: f64,
}

/// The three laws bundled with the camera geometry they need
#[derive(Debug, Clone)]
pub struct AdaptiveLaws {
    config: AdaptiveConfig,
    resolution: Resolution,
    focal: f64,
    rho_gain: f64,
}

impl AdaptiveLaws {
    pub fn new(config: AdaptiveConfig, resolution: Resolution, fov_degrees: f64, rho_gain: f64) -> Self {
        Self {
            config,
            resolution,
            focal: focal_proxy(fov_degrees),
            rho_gain,
        }
    }

    /// Evaluate the laws for `bbox` at `altitude`.
    ///
    /// The duration falls back to `fallback` when the speed is zero or the
    /// ratio is not finite.
    pub fn evaluate(&self, bbox: &BoundingBox, altitude: f64, fallback: f64) -> AdaptiveCommand {
        let (width, height) = self.resolution.as_f64();
        let (cx, cy) = bbox.center();
        let dx = cx - width / 2.0;
        let dy = height / 2.0 - cy;

        let rho = rho(bbox, &self.resolution);
        let speed = speed_law(&self.config.speed, self.rho_gain * rho, altitude, dx, dy);
        let step = step_law(&self.config.step, rho);
        let (roll, pitch) = attitude_adjustment(&self.config.attitude, dx, dy, width, altitude, self.focal);

        let duration = step / speed;
        let duration = if duration.is_finite() && duration > 0.0 {
            duration
        } else {
            fallback
        };

        AdaptiveCommand {
            rho,
            speed,
            step,
            roll,
            pitch,
            duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rho_is_area_ratio() {
        let res = Resolution::new(752, 480);
        let bbox = BoundingBox::centered(376.0, 240.0, 75.2, 48.0);
        assert_relative_eq!(rho(&bbox, &res), 0.01, epsilon = 1e-12);
    }

    #[test]
    fn test_speed_law_components() {
        let config = SpeedLawConfig::default();
        // rho 0, ground level, centered: half the base speed
        assert_relative_eq!(speed_law(&config, 0.0, 0.0, 0.0, 0.0), 1.5, epsilon = 1e-12);

        // altitude equal to h_ref halves the sigmoid term by sqrt(2)
        let damped = speed_law(&config, 0.0, 22.0, 0.0, 0.0);
        assert_relative_eq!(damped, 1.5 / 2f64.sqrt(), epsilon = 1e-12);

        // offset term adds beta * |(dx, dy)|
        let offset = speed_law(&config, 0.0, 0.0, 30.0, 40.0);
        assert_relative_eq!(offset, 1.5 + 0.025 * 50.0, epsilon = 1e-12);
    }

    #[test]
    fn test_speed_law_clipped() {
        let config = SpeedLawConfig::default();
        assert_eq!(speed_law(&config, 0.0, 0.0, 5000.0, 5000.0), config.v_max);
        let large_rho = speed_law(&config, 800.0, 10.0, 0.0, 0.0);
        assert!((0.0..1e-9).contains(&large_rho));
    }

    #[test]
    fn test_step_law_branches() {
        let config = StepLawConfig::default();

        assert_eq!(config.regime(0.1), StepRegime::FastApproach);
        assert_relative_eq!(step_law(&config, 0.1), 3.0 * (2.0f64 * 0.2).tanh(), epsilon = 1e-12);

        assert_eq!(config.regime(0.15), StepRegime::FineAdjust);
        assert_eq!(config.regime(0.45), StepRegime::FineAdjust);
        assert_relative_eq!(step_law(&config, 0.3), 0.8, epsilon = 1e-12);

        assert_eq!(config.regime(0.6), StepRegime::Safety);
        assert_relative_eq!(step_law(&config, 0.5), 0.5, epsilon = 1e-12);
        assert!(step_law(&config, 0.9) < step_law(&config, 0.6));
    }

    #[test]
    fn test_focal_proxy_takes_raw_half_angle() {
        assert_relative_eq!(focal_proxy(90.0), 1.0 / 45f64.tan(), epsilon = 1e-12);
        assert_relative_eq!(focal_proxy(std::f64::consts::FRAC_PI_2), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_attitude_adjustment_signs() {
        let config = AttitudeLawConfig::default();
        let (phi, theta) = attitude_adjustment(&config, 100.0, -50.0, 752.0, 10.0, 1.0);
        assert_relative_eq!(phi, 0.01 * (100.0 / 752.0) * 10.0, epsilon = 1e-12);
        assert!(theta < 0.0);

        assert_eq!(attitude_adjustment(&config, 0.0, 0.0, 752.0, 10.0, 1.0), (0.0, 0.0));
    }

    #[test]
    fn test_evaluate_centered_box() {
        let laws = AdaptiveLaws::new(AdaptiveConfig::default(), Resolution::new(752, 480), 90.0, 20.0);
        let bbox = BoundingBox::centered(376.0, 240.0, 94.0, 60.0);
        let command = laws.evaluate(&bbox, 0.0, 0.04);

        assert_eq!(command.rho, 0.015625);
        assert_eq!(command.roll, 0.0);
        assert_eq!(command.pitch, 0.0);
        assert_relative_eq!(command.speed, 3.0 / (1.0 + 0.3125f64.exp()), epsilon = 1e-12);
        assert_relative_eq!(command.duration, command.step / command.speed, epsilon = 1e-12);
    }

    #[test]
    fn test_evaluate_falls_back_on_zero_speed() {
        let mut config = AdaptiveConfig::default();
        config.speed.v_max = 0.0;
        let laws = AdaptiveLaws::new(config, Resolution::new(752, 480), 90.0, 20.0);
        let command = laws.evaluate(&BoundingBox::centered(376.0, 240.0, 10.0, 10.0), 5.0, 0.04);
        assert_eq!(command.speed, 0.0);
        assert_eq!(command.duration, 0.04);
    }
}
