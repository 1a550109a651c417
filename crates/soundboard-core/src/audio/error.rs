//! Device and audio-server error types

use thiserror::Error;

/// Errors that can occur while setting up or running the virtual device
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The PulseAudio/PipeWire server did not answer
    #[error("Audio server is not available: {0}")]
    AudioServerUnavailable(String),

    /// No audio devices available
    #[error("No audio devices found")]
    NoDevices,

    /// Failed to get default device
    #[error("Failed to get default audio device: {0}")]
    NoDefaultDevice(String),

    /// Device not found
    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    /// Failed to get device configuration
    #[error("Failed to get device config: {0}")]
    ConfigError(String),

    /// Failed to build audio stream
    #[error("Failed to build audio stream: {0}")]
    StreamBuildError(String),

    /// Failed to start/play stream
    #[error("Failed to start audio stream: {0}")]
    StreamPlayError(String),

    /// Stream error during playback
    #[error("Audio stream error: {0}")]
    StreamError(String),

    /// Creating the virtual sink or one of its helper modules failed
    #[error("Failed to create virtual device: {0}")]
    SinkCreation(String),

    /// JACK client or port failure
    #[error("JACK error: {0}")]
    Jack(String),
}

/// Result type for device operations
pub type DeviceResult<T> = Result<T, DeviceError>;
