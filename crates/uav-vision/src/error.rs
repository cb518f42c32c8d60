//! Error types for the vision module

use thiserror::Error;

/// Errors that can occur in vision operations
#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Frame buffer holds {actual} bytes, expected {expected} for {width}x{height} BGR")]
    FrameSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Tracking error: {0}")]
    Tracking(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl VisionError {
    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }

    pub fn tracking(msg: impl Into<String>) -> Self {
        Self::Tracking(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

pub type VisionResult<T> = Result<T, VisionError>;
