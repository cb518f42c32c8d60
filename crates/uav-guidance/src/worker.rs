//! Frame-loop worker and its command handle
//!
//! The worker owns the controller and runs fetch → dispatch → actuate in a
//! tight loop. Everything else talks to it through a [`GuidanceHandle`]:
//! commands go in over a bounded channel and are applied before the next
//! frame, annotated frames come out through a single-slot watch channel.

use metrics::counter;
use nalgebra::Vector3;
use parking_lot::RwLock;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};
use uav_core::{GuidanceEvent, Target, TrackId, TrackedTarget, WorkMode};
use uav_vision::AnnotatedFrame;

use crate::{DroneGuidanceController, EventBus, GuidanceError, GuidanceResult, GuidanceStatus, TargetHistory};

/// Upward command applied by the worker between frames
#[derive(Debug, Clone, PartialEq)]
pub enum GuidanceCommand {
    SetWorkMode(WorkMode),
    SetTargetIds(Vec<TrackId>),
    /// Blocking point-to-point move; the loop pauses until arrival
    FlyTo {
        position: Vector3<f64>,
        velocity: Option<f64>,
    },
    Hover,
}

/// Frame-loop counters
#[derive(Debug, Default, Clone)]
pub struct LoopStats {
    pub frames_processed: u64,
    pub frames_failed: u64,
    pub commands_applied: u64,
    pub last_error: Option<String>,
}

type FrameSlot = Option<Arc<AnnotatedFrame>>;

// ============================================================================
// HANDLE
// ============================================================================

/// Cloneable access to a running worker
#[derive(Clone)]
pub struct GuidanceHandle {
    commands: mpsc::Sender<GuidanceCommand>,
    frames: watch::Receiver<FrameSlot>,
    status: Arc<RwLock<Option<GuidanceStatus>>>,
    history: TargetHistory,
    events: EventBus,
    running: Arc<RwLock<bool>>,
    stats: Arc<RwLock<LoopStats>>,
}

impl GuidanceHandle {
    pub async fn send(&self, command: GuidanceCommand) -> GuidanceResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| GuidanceError::WorkerStopped)
    }

    pub async fn set_work_mode(&self, mode: WorkMode) -> GuidanceResult<()> {
        self.send(GuidanceCommand::SetWorkMode(mode)).await
    }

    pub async fn set_target_ids(&self, ids: Vec<TrackId>) -> GuidanceResult<()> {
        self.send(GuidanceCommand::SetTargetIds(ids)).await
    }

    pub fn targets(&self) -> Vec<Target> {
        self.history.targets()
    }

    pub fn tracked_targets(&self) -> Vec<TrackedTarget> {
        self.history.tracked_targets()
    }

    pub fn history(&self) -> &TargetHistory {
        &self.history
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GuidanceEvent> {
        self.events.subscribe()
    }

    pub fn recent_events(&self, count: usize) -> Vec<GuidanceEvent> {
        self.events.recent(count)
    }

    /// Most recent annotated frame, if any frame was processed yet
    pub fn latest_frame(&self) -> FrameSlot {
        self.frames.borrow().clone()
    }

    /// Receiver notified on every new display frame
    pub fn frames(&self) -> watch::Receiver<FrameSlot> {
        self.frames.clone()
    }

    pub fn status(&self) -> Option<GuidanceStatus> {
        self.status.read().clone()
    }

    pub fn stats(&self) -> LoopStats {
        self.stats.read().clone()
    }

    /// Ask the loop to exit after the current frame
    pub fn stop(&self) {
        *self.running.write() = false;
    }

    pub fn is_running(&self) -> bool {
        *self.running.read()
    }
}

// ============================================================================
// WORKER
// ============================================================================

pub struct GuidanceWorker {
    controller: DroneGuidanceController,
    commands: mpsc::Receiver<GuidanceCommand>,
    frames: watch::Sender<FrameSlot>,
    status: Arc<RwLock<Option<GuidanceStatus>>>,
    running: Arc<RwLock<bool>>,
    stats: Arc<RwLock<LoopStats>>,
    backoff: Duration,
}

impl GuidanceWorker {
    pub fn new(controller: DroneGuidanceController) -> (Self, GuidanceHandle) {
        let worker_config = &controller.config().worker;
        let backoff = worker_config.failure_backoff();
        let (command_tx, command_rx) = mpsc::channel(worker_config.command_capacity.max(1));
        let (frame_tx, frame_rx) = watch::channel(None);

        let status = Arc::new(RwLock::new(None));
        let running = Arc::new(RwLock::new(true));
        let stats = Arc::new(RwLock::new(LoopStats::default()));

        let handle = GuidanceHandle {
            commands: command_tx,
            frames: frame_rx,
            status: status.clone(),
            history: controller.history().clone(),
            events: controller.events().clone(),
            running: running.clone(),
            stats: stats.clone(),
        };

        let worker = Self {
            controller,
            commands: command_rx,
            frames: frame_tx,
            status,
            running,
            stats,
            backoff,
        };
        (worker, handle)
    }

    fn is_running(&self) -> bool {
        *self.running.read()
    }

    /// Run the loop until stopped or every handle is dropped
    pub async fn run(mut self) {
        info!("🚀 Guidance worker started in {} mode", self.controller.work_mode());

        while self.is_running() {
            if !self.drain_commands().await {
                *self.running.write() = false;
                break;
            }

            match self.controller.step().await {
                Ok(report) => {
                    self.stats.write().frames_processed += 1;
                    self.frames.send_replace(Some(Arc::new(report.frame)));
                    *self.status.write() = Some(self.controller.status());
                }
                Err(e) => {
                    warn!("Frame failed: {}", e);
                    counter!("uav_frame_failures_total").increment(1);
                    {
                        let mut stats = self.stats.write();
                        stats.frames_failed += 1;
                        stats.last_error = Some(e.to_string());
                    }
                    tokio::time::sleep(self.backoff).await;
                }
            }

            tokio::task::yield_now().await;
        }

        let stats = self.stats.read().clone();
        info!(
            "🛑 Guidance worker stopped ({} frames, {} failed)",
            stats.frames_processed, stats.frames_failed
        );
    }

    /// Apply every queued command; false once all handles are gone
    async fn drain_commands(&mut self) -> bool {
        loop {
            match self.commands.try_recv() {
                Ok(command) => self.apply(command).await,
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => {
                    info!("All guidance handles dropped");
                    return false;
                }
            }
        }
    }

    async fn apply(&mut self, command: GuidanceCommand) {
        debug!(?command, "applying command");
        match command {
            GuidanceCommand::SetWorkMode(mode) => self.controller.set_work_mode(mode),
            GuidanceCommand::SetTargetIds(ids) => self.controller.set_target_ids(ids),
            GuidanceCommand::FlyTo { position, velocity } => {
                if let Err(e) = self.controller.motion_mut().fly_to_position(position, velocity).await {
                    warn!("Fly-to failed: {}", e);
                }
            }
            GuidanceCommand::Hover => {
                if let Err(e) = self.controller.motion_mut().hover().await {
                    warn!("Hover failed: {}", e);
                }
            }
        }
        self.stats.write().commands_applied += 1;
    }

    /// Run the loop on a dedicated thread with its own single-threaded runtime
    pub fn spawn(self) -> GuidanceResult<JoinHandle<()>> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| GuidanceError::internal(format!("worker runtime: {e}")))?;

        std::thread::Builder::new()
            .name("guidance-worker".into())
            .spawn(move || runtime.block_on(self.run()))
            .map_err(|e| GuidanceError::internal(format!("worker thread: {e}")))
    }
}
