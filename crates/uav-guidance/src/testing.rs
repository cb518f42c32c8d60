//! Test doubles shared by the guidance unit tests

use async_trait::async_trait;
use nalgebra::Vector3;
use parking_lot::Mutex;
use std::sync::Arc;
use uav_core::{Detection, EulerAngles, Pose, TrackedDetection};
use uav_vision::{Detector, Frame, Tracker, VisionResult};

use crate::{Transport, TransportError, TransportResult, VelocityCommand};

/// Actuation request seen by [`FakeTransport`]
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Velocity(VelocityCommand),
    CameraPose(EulerAngles),
    MoveTo(Vector3<f64>, f64),
    SetPose(Pose),
}

#[derive(Debug)]
pub struct FakeState {
    pub body: Pose,
    pub velocity: Vector3<f64>,
    pub gimbal_pitch: f64,
    pub frame: Frame,
    pub calls: Vec<Call>,
    pub fail_next: Option<TransportError>,
}

/// In-memory vehicle that records every actuation request.
///
/// The camera sits at the body position; its pitch is body pitch plus the
/// last commanded gimbal pitch.
#[derive(Debug)]
pub struct FakeTransport {
    pub state: Mutex<FakeState>,
}

impl FakeTransport {
    pub fn new(body: Pose) -> Self {
        Self {
            state: Mutex::new(FakeState {
                body,
                velocity: Vector3::zeros(),
                gimbal_pitch: 0.0,
                frame: Frame::blank(752, 480),
                calls: Vec::new(),
                fail_next: None,
            }),
        }
    }

    pub fn at(x: f64, y: f64, z: f64) -> Arc<Self> {
        Arc::new(Self::new(Pose::at(x, y, z)))
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn velocity_commands(&self) -> Vec<VelocityCommand> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Velocity(cmd) => Some(cmd),
                _ => None,
            })
            .collect()
    }

    pub fn camera_commands(&self) -> Vec<f64> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::CameraPose(angles) => Some(angles.pitch),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn set_velocity(&self, velocity: Vector3<f64>) {
        self.state.lock().velocity = velocity;
    }

    pub fn set_gimbal_pitch(&self, pitch: f64) {
        self.state.lock().gimbal_pitch = pitch;
    }

    pub fn fail_next(&self, err: TransportError) {
        self.state.lock().fail_next = Some(err);
    }

    fn check(&self) -> TransportResult<()> {
        match self.state.lock().fail_next.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn body_pose(&self) -> TransportResult<Pose> {
        self.check()?;
        Ok(self.state.lock().body)
    }

    async fn body_velocity(&self) -> TransportResult<Vector3<f64>> {
        self.check()?;
        Ok(self.state.lock().velocity)
    }

    async fn camera_pose(&self) -> TransportResult<Pose> {
        self.check()?;
        let state = self.state.lock();
        let body = state.body.orientation;
        Ok(Pose::new(
            state.body.position,
            EulerAngles::new(body.pitch + state.gimbal_pitch, body.roll, body.yaw),
        ))
    }

    async fn command_velocity(&self, command: VelocityCommand) -> TransportResult<()> {
        self.check()?;
        self.state.lock().calls.push(Call::Velocity(command));
        Ok(())
    }

    async fn command_camera_pose(&self, orientation: EulerAngles) -> TransportResult<()> {
        self.check()?;
        let mut state = self.state.lock();
        state.gimbal_pitch = orientation.pitch;
        state.calls.push(Call::CameraPose(orientation));
        Ok(())
    }

    async fn capture_frame(&self) -> TransportResult<Frame> {
        self.check()?;
        Ok(self.state.lock().frame.clone())
    }

    async fn move_to_position(&self, position: Vector3<f64>, velocity: f64) -> TransportResult<()> {
        self.check()?;
        let mut state = self.state.lock();
        state.body.position = position;
        state.calls.push(Call::MoveTo(position, velocity));
        Ok(())
    }

    async fn set_vehicle_pose(&self, pose: Pose) -> TransportResult<()> {
        self.check()?;
        let mut state = self.state.lock();
        state.body = pose;
        state.calls.push(Call::SetPose(pose));
        Ok(())
    }
}

/// Detector returning whatever the test last put in its slot
#[derive(Clone, Default)]
pub struct ScriptedDetector(pub Arc<Mutex<Vec<Detection>>>);

impl ScriptedDetector {
    pub fn set(&self, detections: Vec<Detection>) {
        *self.0.lock() = detections;
    }
}

impl Detector for ScriptedDetector {
    fn infer(&mut self, _frame: &Frame, _confidence: f32) -> VisionResult<Vec<Detection>> {
        Ok(self.0.lock().clone())
    }
}

/// Tracker returning whatever the test last put in its slot
#[derive(Clone, Default)]
pub struct ScriptedTracker(pub Arc<Mutex<Vec<TrackedDetection>>>);

impl ScriptedTracker {
    pub fn set(&self, tracked: Vec<TrackedDetection>) {
        *self.0.lock() = tracked;
    }
}

impl Tracker for ScriptedTracker {
    fn update(&mut self, _detections: &[Detection], _frame: &Frame) -> VisionResult<Vec<TrackedDetection>> {
        Ok(self.0.lock().clone())
    }
}
