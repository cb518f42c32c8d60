//! Guidance events
//!
//! Published by the guidance controller whenever its externally visible state
//! changes, so UI and logging consumers can follow along without polling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Target, TrackId, TrackedTarget, WorkMode};

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuidanceEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub payload: GuidanceEventPayload,
}

impl GuidanceEvent {
    pub fn new(payload: GuidanceEventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn work_mode_changed(from: WorkMode, to: WorkMode) -> Self {
        Self::new(GuidanceEventPayload::WorkModeChanged { from, to })
    }

    pub fn target_located(target: Target) -> Self {
        Self::new(GuidanceEventPayload::TargetLocated(target))
    }

    pub fn tracked_target_located(target: TrackedTarget) -> Self {
        Self::new(GuidanceEventPayload::TrackedTargetLocated(target))
    }

    pub fn queue_advanced(current: Option<TrackId>, remaining: usize) -> Self {
        Self::new(GuidanceEventPayload::TargetQueueAdvanced { current, remaining })
    }

    pub fn track_lost(track_id: TrackId) -> Self {
        Self::new(GuidanceEventPayload::TrackLost { track_id })
    }

    pub fn track_recovered(track_id: TrackId, snapshot_age_secs: f64) -> Self {
        Self::new(GuidanceEventPayload::TrackRecovered {
            track_id,
            snapshot_age_secs,
        })
    }

    /// Short name of the payload variant, for logs and metrics labels
    pub fn kind(&self) -> &'static str {
        match &self.payload {
            GuidanceEventPayload::WorkModeChanged { .. } => "work_mode_changed",
            GuidanceEventPayload::TargetLocated(_) => "target_located",
            GuidanceEventPayload::TrackedTargetLocated(_) => "tracked_target_located",
            GuidanceEventPayload::TargetQueueAdvanced { .. } => "target_queue_advanced",
            GuidanceEventPayload::TrackLost { .. } => "track_lost",
            GuidanceEventPayload::TrackRecovered { .. } => "track_recovered",
        }
    }
}

/// Event payload variants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GuidanceEventPayload {
    WorkModeChanged { from: WorkMode, to: WorkMode },
    TargetLocated(Target),
    TrackedTargetLocated(TrackedTarget),
    TargetQueueAdvanced { current: Option<TrackId>, remaining: usize },
    /// The current pursuit id was not reported by the tracker this frame
    TrackLost { track_id: TrackId },
    TrackRecovered { track_id: TrackId, snapshot_age_secs: f64 },
}

// ============================================================================
// TESTS
// ============================================================================
