//! Error types for pcmkit

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Everything that can go wrong while reading, playing or transforming audio.
#[derive(Error, Debug)]
pub enum AudioError {
    /// The source path does not exist
    #[error("audio file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Container is not linear PCM, or its header is inconsistent
    #[error("format error: {0}")]
    Format(String),

    /// Requested start offset or frame range lies outside the stream
    #[error("out of range: {0}")]
    OutOfRange(String),

    /// Output stream open/write/close failure
    #[error("output device error: {0}")]
    Device(String),

    /// Invalid speed ratio or time-stretch/resample failure
    #[error("transform error: {0}")]
    Transform(String),

    /// Invalid playback configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O error while reading or writing a stream
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for pcmkit operations
pub type Result<T> = std::result::Result<T, AudioError>;

impl From<rubato::ResamplerConstructionError> for AudioError {
    fn from(e: rubato::ResamplerConstructionError) -> Self {
        AudioError::Transform(e.to_string())
    }
}

impl From<rubato::ResampleError> for AudioError {
    fn from(e: rubato::ResampleError) -> Self {
        AudioError::Transform(e.to_string())
    }
}

impl From<serde_json::Error> for AudioError {
    fn from(e: serde_json::Error) -> Self {
        AudioError::Config(e.to_string())
    }
}
