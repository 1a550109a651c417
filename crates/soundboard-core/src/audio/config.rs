//! Audio backend and virtual device configuration
//!
//! Defines device selection, buffer settings and how the virtual microphone
//! is exposed to the audio server.

use serde::{Deserialize, Serialize};

use crate::types::{MAX_BLOCK_FRAMES, SAMPLE_RATE};

/// Default buffer size when no preference is specified (frames)
/// 512 frames is a safe default that works on most systems
pub const DEFAULT_BUFFER_SIZE: u32 = 512;

/// Name of the null sink that carries the mix
pub const DEFAULT_SINK_NAME: &str = "soundboard_virtual_mic";

/// Description shown in other applications' device lists
pub const DEFAULT_SINK_DESCRIPTION: &str = "Soundboard Virtual Microphone";

/// Preferred buffer size for audio streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BufferSize {
    /// Use [`DEFAULT_BUFFER_SIZE`]
    #[default]
    Default,
    /// Request a specific buffer size in frames (clamped to 64..=8192)
    Fixed(u32),
    /// Small buffer for minimal hotkey-to-sound delay
    LowLatency,
}

impl BufferSize {
    /// Buffer size in frames to request from the device
    pub fn frames(&self) -> u32 {
        match self {
            BufferSize::Default => DEFAULT_BUFFER_SIZE,
            BufferSize::Fixed(frames) => (*frames).clamp(64, MAX_BLOCK_FRAMES as u32),
            BufferSize::LowLatency => 256,
        }
    }

    /// Calculate latency in milliseconds for a given sample rate
    pub fn latency_ms(&self, sample_rate: u32) -> f32 {
        (self.frames() as f32 / sample_rate as f32) * 1000.0
    }
}

/// Audio device identifier
///
/// Includes both the device name and the host backend (ALSA, JACK, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    /// Device name as reported by the system
    pub name: String,
    /// Audio host identifier (e.g., "ALSA", "JACK"). None searches all hosts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
        }
    }

    pub fn with_host(name: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            host: Some(host.to_string()),
        }
    }

    /// Get a display label that includes the host if available
    pub fn display_label(&self) -> String {
        match &self.host {
            Some(host) => format!("[{}] {}", host, self.name),
            None => self.name.clone(),
        }
    }
}

/// Configuration for the audio backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device (None = a device matching the sink name, else the default)
    pub output_device: Option<DeviceId>,

    /// Real microphone capture device (None = system default input)
    pub input_device: Option<DeviceId>,

    /// Preferred buffer size
    pub buffer_size: BufferSize,

    /// Preferred sample rate; falls back to the device maximum if unsupported
    pub sample_rate: u32,

    /// Client name used with the JACK backend
    pub client_name: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            output_device: None,
            input_device: None,
            buffer_size: BufferSize::default(),
            sample_rate: SAMPLE_RATE,
            client_name: "soundboard".to_string(),
        }
    }
}

impl AudioConfig {
    pub fn with_output_device(mut self, device: DeviceId) -> Self {
        self.output_device = Some(device);
        self
    }

    pub fn with_buffer_size(mut self, size: BufferSize) -> Self {
        self.buffer_size = size;
        self
    }
}

/// How the mix is exposed to the audio server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualDeviceConfig {
    /// Null sink the engine plays into; its monitor is the virtual microphone
    pub sink_name: String,
    pub description: String,
    /// Create the sink on start (disable if it is managed elsewhere)
    pub create_sink: bool,
    /// Also publish the monitor as a regular capture device
    ///
    /// Some applications hide monitor sources from their microphone list.
    pub expose_as_source: bool,
    /// Loop the mix back to the default speakers so the user hears it
    pub monitor_to_speakers: bool,
    pub monitor_latency_ms: u32,
    /// Capture the real microphone and mix it in
    pub mic_passthrough: bool,
}

impl Default for VirtualDeviceConfig {
    fn default() -> Self {
        Self {
            sink_name: DEFAULT_SINK_NAME.to_string(),
            description: DEFAULT_SINK_DESCRIPTION.to_string(),
            create_sink: true,
            expose_as_source: false,
            monitor_to_speakers: true,
            monitor_latency_ms: 50,
            mic_passthrough: true,
        }
    }
}

impl VirtualDeviceConfig {
    /// Name of the sink's monitor source
    pub fn monitor_source(&self) -> String {
        format!("{}.monitor", self.sink_name)
    }

    /// Name of the remapped capture source
    pub fn source_name(&self) -> String {
        format!("{}_source", self.sink_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_size_frames() {
        assert_eq!(BufferSize::Default.frames(), DEFAULT_BUFFER_SIZE);
        assert_eq!(BufferSize::Fixed(16).frames(), 64);
        assert_eq!(BufferSize::Fixed(100_000).frames(), MAX_BLOCK_FRAMES as u32);
        assert!((BufferSize::Fixed(480).latency_ms(48000) - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_virtual_device_names() {
        let config = VirtualDeviceConfig::default();
        assert_eq!(config.monitor_source(), "soundboard_virtual_mic.monitor");
        assert_eq!(config.source_name(), "soundboard_virtual_mic_source");
    }
}
