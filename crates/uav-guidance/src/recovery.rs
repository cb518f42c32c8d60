//! Snapshot-based re-acquisition of a lost track
//!
//! While pursuing, the body pose and gimbal pitch are recorded for every
//! visible track id at a fixed interval. When the pursued id disappears, the
//! vehicle is put back where the id was last seen and the gimbal restored, in
//! the hope that the tracker picks it up again.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};
use uav_core::{Pose, TrackId};

use crate::config::RecoveryConfig;
use crate::{MotionPrimitives, TransportResult};

/// Vehicle state at a moment a track id was visible
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackSnapshot {
    pub taken_at: Instant,
    pub body: Pose,
    pub camera_pitch: f64,
}

impl TrackSnapshot {
    pub fn age(&self) -> Duration {
        self.taken_at.elapsed()
    }
}

#[derive(Debug)]
pub struct TrackRecovery {
    config: RecoveryConfig,
    snapshots: HashMap<TrackId, VecDeque<TrackSnapshot>>,
    last_snapshot: Option<Instant>,
    last_attempt: Option<Instant>,
}

impl TrackRecovery {
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            config,
            snapshots: HashMap::new(),
            last_snapshot: None,
            last_attempt: None,
        }
    }

    /// Whether the snapshot interval has passed
    pub fn snapshot_due(&self) -> bool {
        let interval = Duration::from_secs_f64(self.config.snapshot_interval);
        self.last_snapshot.is_none_or(|at| at.elapsed() >= interval)
    }

    /// Record the same vehicle state for every id in `visible`.
    ///
    /// Only the newest `max_snapshots_per_id` entries are kept per id. Ids
    /// whose newest snapshot has timed out are dropped.
    pub fn record(&mut self, visible: impl IntoIterator<Item = TrackId>, body: Pose, camera_pitch: f64) {
        let now = Instant::now();
        let timeout = Duration::from_secs_f64(self.config.snapshot_timeout);
        self.snapshots
            .retain(|_, history| history.back().is_some_and(|s| now.duration_since(s.taken_at) <= timeout));

        let snapshot = TrackSnapshot {
            taken_at: now,
            body,
            camera_pitch,
        };

        for id in visible {
            let history = self.snapshots.entry(id).or_default();
            history.push_back(snapshot);
            while history.len() > self.config.max_snapshots_per_id {
                history.pop_front();
            }
        }
        self.last_snapshot = Some(now);
    }

    /// Newest snapshot of `id` that has not timed out
    pub fn latest(&self, id: TrackId) -> Option<&TrackSnapshot> {
        let timeout = Duration::from_secs_f64(self.config.snapshot_timeout);
        self.snapshots
            .get(&id)
            .and_then(|history| history.back())
            .filter(|snapshot| snapshot.age() <= timeout)
    }

    pub fn snapshot_count(&self, id: TrackId) -> usize {
        self.snapshots.get(&id).map_or(0, VecDeque::len)
    }

    pub fn forget(&mut self, id: TrackId) {
        self.snapshots.remove(&id);
    }

    fn cooling_down(&self) -> bool {
        let cooldown = Duration::from_secs_f64(self.config.cooldown);
        self.last_attempt.is_some_and(|at| at.elapsed() < cooldown)
    }

    /// Try to restore the vehicle to the newest usable snapshot of `id`.
    ///
    /// Returns the age of the snapshot used, or `None` when there is none or
    /// the previous attempt is too recent.
    pub async fn try_recover(&mut self, id: TrackId, motion: &mut MotionPrimitives) -> TransportResult<Option<Duration>> {
        if self.cooling_down() {
            return Ok(None);
        }
        let Some(snapshot) = self.latest(id).copied() else {
            debug!("No usable snapshot for track {}", id);
            return Ok(None);
        };

        self.last_attempt = Some(Instant::now());
        let age = snapshot.age();
        info!("🔄 Recovering track {} from a snapshot {:.1}s old", id, age.as_secs_f64());
        restore(&snapshot, motion).await?;
        Ok(Some(age))
    }
}

/// Put the vehicle and gimbal back into the snapshot state
pub async fn restore(snapshot: &TrackSnapshot, motion: &mut MotionPrimitives) -> TransportResult<()> {
    motion.set_position_directly(snapshot.body).await?;
    motion.point_camera(snapshot.camera_pitch).await?;
    Ok(())
}
