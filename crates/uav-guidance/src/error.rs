//! Error types for the guidance loop

use thiserror::Error;
use uav_vision::VisionError;

/// Failures reported by the vehicle/camera transport
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("RPC call failed: {0}")]
    Rpc(String),

    #[error("Transport disconnected")]
    Disconnected,

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl TransportError {
    pub fn rpc(msg: impl Into<String>) -> Self {
        Self::Rpc(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }
}

impl From<VisionError> for TransportError {
    fn from(err: VisionError) -> Self {
        Self::MalformedResponse(err.to_string())
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Guidance-level errors
#[derive(Error, Debug)]
pub enum GuidanceError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Guidance worker is not running")]
    WorkerStopped,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GuidanceError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

pub type GuidanceResult<T> = Result<T, GuidanceError>;
