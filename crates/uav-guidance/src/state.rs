//! Point-in-time status of the guidance loop

use serde::{Deserialize, Serialize};
use uav_core::{TrackId, WorkMode};

use crate::PursuitState;

/// Serializable status snapshot, cheap to produce every frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuidanceStatus {
    pub mode: WorkMode,
    pub pursuit_state: PursuitState,
    pub current_target: Option<TrackId>,
    pub pending_targets: Vec<TrackId>,
    pub targets_located: usize,
    pub tracked_targets_located: usize,
    /// Gimbal pitch in radians
    pub camera_pitch: f64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl GuidanceStatus {
    pub fn is_pursuing(&self) -> bool {
        match self.mode {
            WorkMode::Track => self.pursuit_state != PursuitState::Searching,
            WorkMode::MultiTrack => self.current_target.is_some(),
            WorkMode::Idle | WorkMode::Detect => false,
        }
    }
}
