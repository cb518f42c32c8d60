//! Append-only target history
//!
//! Shared between the frame loop (the only writer) and any number of readers.
//! Readers always get a snapshot copy, never a live view.

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use uav_core::{CoreResult, Target, TrackId, TrackedTarget};

#[derive(Debug, Clone, Default)]
pub struct TargetHistory {
    targets: Arc<RwLock<Vec<Target>>>,
    tracked: Arc<RwLock<Vec<TrackedTarget>>>,
}

/// JSON export layout
#[derive(Serialize)]
struct Export<'a> {
    targets: &'a [Target],
    tracked_targets: &'a [TrackedTarget],
}

impl TargetHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_target(&self, target: Target) {
        self.targets.write().push(target);
    }

    pub fn push_tracked(&self, target: TrackedTarget) {
        self.tracked.write().push(target);
    }

    /// Targets located in single-target mode, oldest first
    pub fn targets(&self) -> Vec<Target> {
        self.targets.read().clone()
    }

    /// Targets located in multi-target mode, oldest first
    pub fn tracked_targets(&self) -> Vec<TrackedTarget> {
        self.tracked.read().clone()
    }

    /// Ids of every tracked target located so far
    pub fn located_ids(&self) -> Vec<TrackId> {
        self.tracked.read().iter().map(|t| t.track_id).collect()
    }

    pub fn len(&self) -> usize {
        self.targets.read().len() + self.tracked.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Both lists as one pretty-printed JSON document
    pub fn export_json(&self) -> CoreResult<String> {
        let targets = self.targets.read();
        let tracked = self.tracked.read();
        let export = Export {
            targets: &targets,
            tracked_targets: &tracked,
        };
        Ok(serde_json::to_string_pretty(&export)?)
    }
}
