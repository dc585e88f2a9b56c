//! Error types shared across the viewer

use crate::session::registry::CameraId;
use thiserror::Error;

/// Errors surfaced by camera sessions, DIO arbitration and configuration.
///
/// None of these are fatal to the process; they are recorded per session and
/// the operation stays retryable from the UI.
#[derive(Debug, Error)]
pub enum ViewerError {
    /// Failure reported by the camera collaborator, with the operation that hit it.
    #[error("{context}: {message}")]
    Camera { context: String, message: String },

    /// An output bit is already claimed by another session.
    #[error("bit {bit} assigned to {owner}")]
    BitConflict { bit: u8, owner: CameraId },

    /// Session is not open for the requested operation.
    #[error("camera is not open")]
    NotOpen,

    /// Parameter writes are rejected while frames are being delivered.
    #[error("operation not allowed while capturing")]
    CaptureActive,

    /// Digital output hardware was not available at startup.
    #[error("digital output unavailable")]
    DioUnavailable,

    /// Windowing/render collaborator failure.
    #[error("display error: {0}")]
    Display(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ViewerError {
    /// Shorthand for collaborator failures.
    pub fn camera(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Camera {
            context: context.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ViewerError>;
