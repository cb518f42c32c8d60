//! # UAV Guidance - Visual-Servoing Control Loop
//!
//! Per-frame guidance for a camera-equipped UAV. Detections from the vision
//! side are turned into velocity, gimbal and yaw commands that close on a
//! target, decide when it is centered, hand off to the next candidate, and
//! fall back to a search pattern when nothing is visible.
//!
//! ## Features
//! - Work modes: idle passthrough, detect-only, single-target and
//!   ID-directed multi-target pursuit
//! - Exclusion of targets already located, by ground back-projection
//! - Adaptive speed/step/attitude laws for the multi-target mode
//! - Time-gated actuation through a single motion component
//! - Optional snapshot-based recovery of lost tracks
//! - Frame-loop worker with a command handle, display-frame handoff and
//!   guidance events

pub mod action;
pub mod adaptive;
pub mod config;
pub mod error;
pub mod events;
pub mod exclusion;
pub mod history;
pub mod motion;
pub mod multi;
pub mod recovery;
pub mod search;
pub mod single;
pub mod state;
pub mod transport;
pub mod worker;

#[cfg(test)]
mod testing;

pub use action::{GuidanceAction, PursuitOutcome};
pub use config::GuidanceConfig;
pub use error::{GuidanceError, GuidanceResult, TransportError, TransportResult};
pub use events::EventBus;
pub use history::TargetHistory;
pub use motion::MotionPrimitives;
pub use multi::{MultiPursuit, PursuitQueue};
pub use search::{SearchAction, SearchBehavior};
pub use single::{PursuitState, SinglePursuit};
pub use state::GuidanceStatus;
pub use transport::{frame_from_bgr, Drivetrain, Transport, VelocityCommand, YawMode};
#[cfg(test)]
pub use transport::MockTransport;
pub use worker::{GuidanceCommand, GuidanceHandle, GuidanceWorker, LoopStats};

use metrics::counter;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uav_core::{GuidanceEvent, Target, TrackId, TrackedTarget, WorkMode};
use uav_vision::{AnnotatedFrame, Annotator, BoxRole, Frame, VisionPipeline};

/// Result of one processed frame
#[derive(Debug, Clone)]
pub struct StepReport {
    pub mode: WorkMode,
    pub action: GuidanceAction,
    pub frame: AnnotatedFrame,
}

/// Work-mode dispatcher owning every guidance component
pub struct DroneGuidanceController {
    config: GuidanceConfig,
    motion: MotionPrimitives,
    vision: VisionPipeline,
    annotator: Annotator,
    single: SinglePursuit,
    multi: MultiPursuit,
    mode: WorkMode,
    history: TargetHistory,
    events: EventBus,
}

impl DroneGuidanceController {
    /// Build the controller; the configuration is validated once here
    pub fn new(config: GuidanceConfig, transport: Arc<dyn Transport>, vision: VisionPipeline) -> GuidanceResult<Self> {
        config.validate()?;
        info!(
            "Initializing guidance controller ({} camera, {:.0}° FOV)...",
            config.camera.resolution, config.camera.fov_degrees
        );

        let annotator = Annotator::new(vision.config());
        let motion = MotionPrimitives::new(transport, config.motion.clone(), &config.camera);
        let single = SinglePursuit::new(config.pursuit.clone(), &config.camera, annotator.clone());
        let multi = MultiPursuit::new(
            config.pursuit.clone(),
            config.adaptive.clone(),
            config.recovery.clone(),
            &config.camera,
            annotator.clone(),
        );
        if multi.recovery_enabled() {
            info!("Track recovery enabled");
        }

        Ok(Self {
            events: EventBus::new(config.worker.event_capacity),
            config,
            motion,
            vision,
            annotator,
            single,
            multi,
            mode: WorkMode::Idle,
            history: TargetHistory::new(),
        })
    }

    pub fn config(&self) -> &GuidanceConfig {
        &self.config
    }

    pub fn work_mode(&self) -> WorkMode {
        self.mode
    }

    /// Switch modes; takes effect on the next frame.
    ///
    /// Pursuit state is dropped, the multi-target queue is kept.
    pub fn set_work_mode(&mut self, mode: WorkMode) {
        if mode == self.mode {
            return;
        }
        if mode == WorkMode::MultiTrack && !self.vision.has_tracker() {
            warn!("Multi-target mode selected without a tracker; frames will pass through");
        }

        info!("🔀 Work mode {} -> {}", self.mode, mode);
        self.single.reset();
        self.multi.reset();
        self.events.publish(GuidanceEvent::work_mode_changed(self.mode, mode));
        self.mode = mode;
    }

    /// Replace the ids visited in multi-target mode
    pub fn set_target_ids(&mut self, ids: Vec<TrackId>) {
        self.multi.set_targets(ids);
        let queue = self.multi.queue();
        info!("📋 Target queue: current {:?}, pending {:?}", queue.current(), queue.pending());
        self.events
            .publish(GuidanceEvent::queue_advanced(queue.current(), queue.remaining()));
    }

    pub fn current_target_id(&self) -> Option<TrackId> {
        self.multi.current_target()
    }

    pub fn pending_target_ids(&self) -> Vec<TrackId> {
        self.multi.queue().pending()
    }

    pub fn pursuit_state(&self) -> PursuitState {
        self.single.state()
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

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GuidanceEvent> {
        self.events.subscribe()
    }

    pub fn motion(&self) -> &MotionPrimitives {
        &self.motion
    }

    pub fn motion_mut(&mut self) -> &mut MotionPrimitives {
        &mut self.motion
    }

    pub fn status(&self) -> GuidanceStatus {
        let queue = self.multi.queue();
        GuidanceStatus {
            mode: self.mode,
            pursuit_state: self.single.state(),
            current_target: queue.current(),
            pending_targets: queue.pending(),
            targets_located: self.history.targets().len(),
            tracked_targets_located: self.history.tracked_targets().len(),
            camera_pitch: self.motion.camera_pitch(),
            timestamp: chrono::Utc::now(),
        }
    }

    /// Capture a frame from the transport and process it
    pub async fn step(&mut self) -> TransportResult<StepReport> {
        let frame = self.motion.transport().capture_frame().await?;
        self.process_frame(frame).await
    }

    /// Dispatch one frame to the current work mode.
    ///
    /// Only transport failures surface as errors; detector and tracker
    /// failures count as an empty frame.
    pub async fn process_frame(&mut self, frame: Frame) -> TransportResult<StepReport> {
        let mode = self.mode;
        counter!("uav_frames_processed_total", "mode" => mode.as_str()).increment(1);

        let (action, annotations) = match mode {
            WorkMode::Idle => (GuidanceAction::Passthrough, Vec::new()),
            WorkMode::Detect => {
                let detections = self.vision.detect(&frame);
                let annotations = detections
                    .iter()
                    .map(|d| self.annotator.detection(d, BoxRole::Other))
                    .collect();
                (GuidanceAction::Passthrough, annotations)
            }
            WorkMode::Track => {
                let detections = self.vision.detect(&frame);
                let targets = self.history.targets();
                let outcome = self.single.step(&mut self.motion, &detections, &targets).await?;
                if let Some(target) = outcome.located {
                    self.commit_target(target);
                }
                (outcome.action, outcome.annotations)
            }
            WorkMode::MultiTrack => {
                let detections = self.vision.detect(&frame);
                let tracked = self.vision.track(&detections, &frame);
                let located = self.history.located_ids();
                let outcome = self.multi.step(&mut self.motion, &tracked, &located).await?;
                self.publish_multi(&outcome.action);
                if let Some(target) = outcome.located {
                    self.commit_tracked(target);
                }
                (outcome.action, outcome.annotations)
            }
        };

        debug!(mode = %mode, action = action.as_str(), boxes = annotations.len(), "frame processed");
        Ok(StepReport {
            mode,
            action,
            frame: AnnotatedFrame::raw(frame, mode).with_annotations(annotations),
        })
    }

    fn commit_target(&mut self, target: Target) {
        counter!("uav_targets_located_total", "mode" => WorkMode::Track.as_str()).increment(1);
        self.history.push_target(target.clone());
        self.events.publish(GuidanceEvent::target_located(target));
    }

    fn commit_tracked(&mut self, target: TrackedTarget) {
        counter!("uav_targets_located_total", "mode" => WorkMode::MultiTrack.as_str()).increment(1);
        self.history.push_tracked(target.clone());
        self.events.publish(GuidanceEvent::tracked_target_located(target));

        let queue = self.multi.queue();
        self.events
            .publish(GuidanceEvent::queue_advanced(queue.current(), queue.remaining()));
        if queue.current().is_none() {
            info!("✅ Target queue exhausted");
        }
    }

    fn publish_multi(&self, action: &GuidanceAction) {
        match *action {
            GuidanceAction::Stalled {
                track_id,
                newly_lost: true,
            } => self.events.publish(GuidanceEvent::track_lost(track_id)),
            GuidanceAction::Recovered { track_id, snapshot_age } => self
                .events
                .publish(GuidanceEvent::track_recovered(track_id, snapshot_age.as_secs_f64())),
            _ => {}
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeTransport, ScriptedDetector, ScriptedTracker};
    use nalgebra::Vector3;
    use std::f64::consts::FRAC_PI_2;
    use uav_core::{BoundingBox, Detection, GuidanceEventPayload, TrackedDetection};
    use uav_vision::VisionConfig;

    struct Harness {
        fake: Arc<FakeTransport>,
        detector: ScriptedDetector,
        tracker: ScriptedTracker,
        controller: DroneGuidanceController,
    }

    fn harness() -> Harness {
        let fake = FakeTransport::at(3.0, 4.0, -20.0);
        let detector = ScriptedDetector::default();
        let tracker = ScriptedTracker::default();
        let vision = VisionPipeline::new(VisionConfig::default(), Box::new(detector.clone()))
            .with_tracker(Box::new(tracker.clone()));
        let controller = DroneGuidanceController::new(GuidanceConfig::default(), fake.clone(), vision).unwrap();
        Harness {
            fake,
            detector,
            tracker,
            controller,
        }
    }

    fn centered(class_id: usize) -> Detection {
        Detection::new(BoundingBox::centered(376.0, 240.0, 40.0, 30.0), 0.9, class_id)
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = GuidanceConfig::default();
        config.camera.fov_degrees = 0.0;
        let vision = VisionPipeline::new(VisionConfig::default(), Box::new(ScriptedDetector::default()));

        let result = DroneGuidanceController::new(config, FakeTransport::at(0.0, 0.0, -10.0), vision);
        assert!(matches!(result, Err(GuidanceError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_idle_mode_passes_frames_through() {
        let mut h = harness();
        h.detector.set(vec![centered(0)]);

        let report = h.controller.step().await.unwrap();
        assert_eq!(report.mode, WorkMode::Idle);
        assert_eq!(report.action, GuidanceAction::Passthrough);
        assert!(report.frame.is_raw());
        assert!(h.fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_detect_mode_annotates_without_motion() {
        let mut h = harness();
        h.controller.set_work_mode(WorkMode::Detect);
        h.detector.set(vec![centered(0), centered(1)]);

        let report = h.controller.step().await.unwrap();
        assert_eq!(report.frame.count(BoxRole::Other), 2);
        assert!(h.fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_track_mode_commits_target_and_publishes() {
        let mut h = harness();
        let mut events = h.controller.subscribe();
        h.controller.set_work_mode(WorkMode::Track);
        h.controller.motion_mut().point_camera(-FRAC_PI_2).await.unwrap();
        h.detector.set(vec![centered(4)]);

        let report = h.controller.step().await.unwrap();
        assert_eq!(report.action, GuidanceAction::Located);
        assert_eq!(report.frame.count(BoxRole::Current), 1);

        let targets = h.controller.targets();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].location, Vector3::new(3.0, 4.0, 0.0));

        assert_eq!(events.try_recv().unwrap().kind(), "work_mode_changed");
        assert_eq!(events.try_recv().unwrap().kind(), "target_located");

        // the same vehicle is now excluded
        let report = h.controller.step().await.unwrap();
        assert!(matches!(report.action, GuidanceAction::Search(_)));
        assert_eq!(report.frame.count(BoxRole::Located), 1);
        assert_eq!(h.controller.targets().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_tracked_box_issues_no_motion() {
        let mut h = harness();
        h.controller.set_work_mode(WorkMode::MultiTrack);
        h.controller.set_target_ids(vec![TrackId(5)]);
        let broken = Detection::new(BoundingBox::new(f64::NAN, 200.0, 400.0, 260.0), 0.9, 6);
        h.tracker.set(vec![TrackedDetection::new(broken, 5)]);

        let report = h.controller.step().await.unwrap();
        assert_eq!(report.action, GuidanceAction::Passthrough);
        assert!(h.fake.velocity_commands().is_empty());
    }

    #[tokio::test]
    async fn test_multi_mode_visits_queue_in_order() {
        let mut h = harness();
        h.controller.set_work_mode(WorkMode::MultiTrack);
        h.controller.set_target_ids(vec![TrackId(5), TrackId(9)]);
        assert_eq!(h.controller.current_target_id(), Some(TrackId(5)));
        assert_eq!(h.controller.pending_target_ids(), vec![TrackId(9)]);

        h.controller.motion_mut().point_camera(-FRAC_PI_2).await.unwrap();
        h.tracker.set(vec![TrackedDetection::new(centered(6), 5)]);
        let mut events = h.controller.subscribe();

        let report = h.controller.step().await.unwrap();
        assert_eq!(report.action, GuidanceAction::Located);
        assert_eq!(h.controller.current_target_id(), Some(TrackId(9)));

        let tracked = h.controller.tracked_targets();
        assert_eq!(tracked.len(), 1);
        assert_eq!(tracked[0].track_id, TrackId(5));

        assert_eq!(events.try_recv().unwrap().kind(), "tracked_target_located");
        let advanced = events.try_recv().unwrap();
        assert!(matches!(
            advanced.payload,
            GuidanceEventPayload::TargetQueueAdvanced {
                current: Some(TrackId(9)),
                remaining: 0
            }
        ));

        // id 9 not visible: stall, reported once
        let report = h.controller.step().await.unwrap();
        assert!(matches!(report.action, GuidanceAction::Stalled { newly_lost: true, .. }));
        assert_eq!(report.frame.count(BoxRole::Located), 1);
        assert_eq!(events.try_recv().unwrap().kind(), "track_lost");
        h.controller.step().await.unwrap();
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_mode_switch_resets_pursuit_but_keeps_queue() {
        let mut h = harness();
        h.controller.set_target_ids(vec![TrackId(1), TrackId(2)]);
        h.controller.set_work_mode(WorkMode::Track);
        h.controller.motion_mut().point_camera(-1.2).await.unwrap();
        h.detector.set(vec![Detection::new(BoundingBox::centered(376.0, 400.0, 40.0, 30.0), 0.9, 0)]);

        h.controller.step().await.unwrap();
        assert_eq!(h.controller.pursuit_state(), PursuitState::Centering);

        h.controller.set_work_mode(WorkMode::MultiTrack);
        h.controller.set_work_mode(WorkMode::Track);
        assert_eq!(h.controller.pursuit_state(), PursuitState::Searching);
        assert_eq!(h.controller.current_target_id(), Some(TrackId(1)));
        assert_eq!(h.controller.events().event_count(), 4);
    }

    #[tokio::test]
    async fn test_same_mode_is_not_an_event() {
        let mut h = harness();
        h.controller.set_work_mode(WorkMode::Idle);
        assert_eq!(h.controller.events().event_count(), 0);
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let mut h = harness();
        h.fake.fail_next(TransportError::rpc("timeout"));

        let err = h.controller.step().await.unwrap_err();
        assert_eq!(err, TransportError::Rpc("timeout".into()));

        // next frame is fine
        assert!(h.controller.step().await.is_ok());
    }

    #[tokio::test]
    async fn test_status_snapshot() {
        let mut h = harness();
        h.controller.set_work_mode(WorkMode::MultiTrack);
        h.controller.set_target_ids(vec![TrackId(5), TrackId(9), TrackId(2)]);

        let status = h.controller.status();
        assert_eq!(status.mode, WorkMode::MultiTrack);
        assert_eq!(status.current_target, Some(TrackId(5)));
        assert_eq!(status.pending_targets, vec![TrackId(9), TrackId(2)]);
        assert!(status.is_pursuing());
    }
}
