//! What a guidance step decided

use std::time::Duration;
use uav_core::TrackId;
use uav_vision::Annotation;

use crate::SearchAction;

/// Decision taken for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GuidanceAction {
    /// Frame passed through without actuation
    Passthrough,
    Search(SearchAction),
    /// Candidate selected but the re-evaluation gate is still closed
    AwaitingGate,
    /// Coarse approach towards a distant target
    Approach,
    /// Close to the target, gimbal still turning towards vertical
    CameraToVertical,
    /// Fine velocity correction under a vertical camera
    Centering,
    /// Target committed to history this frame
    Located,
    /// Current track id not reported by the tracker
    Stalled { track_id: TrackId, newly_lost: bool },
    /// Vehicle restored to a snapshot taken while the id was visible
    Recovered { track_id: TrackId, snapshot_age: Duration },
}

impl GuidanceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuidanceAction::Passthrough => "passthrough",
            GuidanceAction::Search(_) => "search",
            GuidanceAction::AwaitingGate => "awaiting_gate",
            GuidanceAction::Approach => "approach",
            GuidanceAction::CameraToVertical => "camera_to_vertical",
            GuidanceAction::Centering => "centering",
            GuidanceAction::Located => "located",
            GuidanceAction::Stalled { .. } => "stalled",
            GuidanceAction::Recovered { .. } => "recovered",
        }
    }
}

/// Per-frame result of a pursuit state machine
#[derive(Debug, Clone)]
pub struct PursuitOutcome<L> {
    pub action: GuidanceAction,
    pub annotations: Vec<Annotation>,
    /// Target committed this frame
    pub located: Option<L>,
}

impl<L> PursuitOutcome<L> {
    pub fn new(action: GuidanceAction, annotations: Vec<Annotation>) -> Self {
        Self {
            action,
            annotations,
            located: None,
        }
    }
}
