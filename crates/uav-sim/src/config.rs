//! Simulation configuration
//!
//! Run settings come from plain environment variables. The guidance
//! configuration is layered: simulation preset, then an optional TOML file
//! named by `UAV_CONFIG`, then `UAV__SECTION__FIELD` environment overrides.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use std::time::Duration;
use uav_core::{TrackId, WorkMode};
use uav_guidance::GuidanceConfig;

/// Simulation run settings
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Work mode selected once the worker is up
    pub mode: WorkMode,
    /// Stop after this long
    pub duration: Duration,
    /// Number of ground vehicles in the scene
    pub vehicles: usize,
    /// Scene RNG seed
    pub seed: u64,
    /// Survey altitude above ground, meters
    pub altitude: f64,
    /// Ids visited in multi-target mode; empty means every vehicle
    pub target_ids: Vec<TrackId>,
    /// Simulated camera frame period
    pub frame_interval: Duration,
    /// Prometheus exporter port
    pub metrics_port: Option<u16>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            mode: WorkMode::Track,
            duration: Duration::from_secs(120),
            vehicles: 5,
            seed: 7,
            altitude: 20.0,
            target_ids: Vec::new(),
            frame_interval: Duration::from_millis(33),
            metrics_port: None,
        }
    }
}

impl SimConfig {
    /// Load settings from environment variables (and `.env`)
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let mode = std::env::var("SIM_MODE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.mode);

        let duration = std::env::var("SIM_DURATION_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.duration);

        let vehicles = std::env::var("SIM_VEHICLES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.vehicles);

        let seed = std::env::var("SIM_SEED")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.seed);

        let altitude = std::env::var("SIM_ALTITUDE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.altitude);

        let target_ids = std::env::var("SIM_TARGET_IDS")
            .map(|s| parse_target_ids(&s))
            .unwrap_or_default();

        let frame_interval = std::env::var("SIM_FRAME_INTERVAL_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.frame_interval);

        let metrics_port = std::env::var("METRICS_PORT").ok().and_then(|s| s.parse().ok());

        Self {
            mode,
            duration,
            vehicles,
            seed,
            altitude,
            target_ids,
            frame_interval,
            metrics_port,
        }
    }

    /// Ids to visit, defaulting to every scene vehicle in id order
    pub fn target_queue(&self) -> Vec<TrackId> {
        if self.target_ids.is_empty() {
            (1..=self.vehicles as u64).map(TrackId).collect()
        } else {
            self.target_ids.clone()
        }
    }
}

/// Parse a comma separated id list, skipping entries that are not numbers
pub fn parse_target_ids(raw: &str) -> Vec<TrackId> {
    raw.split(',')
        .filter_map(|part| part.trim().parse::<u64>().ok())
        .map(TrackId)
        .collect()
}

/// Builder seeded with the simulation preset
fn defaults_builder() -> anyhow::Result<ConfigBuilder<DefaultState>> {
    let defaults = Config::try_from(&GuidanceConfig::simulation())?;
    Ok(Config::builder().add_source(defaults))
}

/// Layered guidance configuration for this run
pub fn load_guidance_config() -> anyhow::Result<GuidanceConfig> {
    let mut builder = defaults_builder()?;
    if let Ok(path) = std::env::var("UAV_CONFIG") {
        builder = builder.add_source(File::with_name(&path));
    }

    let config = builder
        .add_source(Environment::with_prefix("UAV").separator("__"))
        .build()?
        .try_deserialize()?;
    Ok(config)
}
