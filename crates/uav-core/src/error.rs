//! Error types for the guidance core

use thiserror::Error;

/// Core error type for the UAV guidance system
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Unknown work mode: {0}")]
    UnknownWorkMode(String),

    #[error("Invalid resolution: {width}x{height}")]
    InvalidResolution { width: u32, height: u32 },

    #[error("Invalid field of view: {0} degrees")]
    InvalidFieldOfView(f64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn unknown_work_mode(mode: impl Into<String>) -> Self {
        Self::UnknownWorkMode(mode.into())
    }

    pub fn invalid_resolution(width: u32, height: u32) -> Self {
        Self::InvalidResolution { width, height }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
