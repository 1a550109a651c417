//! Audio I/O - the virtual microphone and the backends feeding it
//!
//! - **Virtual sink**: a PulseAudio/PipeWire null sink whose monitor other
//!   applications record from, managed through `pactl`
//! - **Backends**: CPAL by default, native JACK on Linux with the
//!   `jack-backend` feature
//! - **Microphone**: optional capture of the real microphone, mixed in by the
//!   engine
//!
//! # Architecture
//!
//! The audio system follows a lock-free design for real-time safety:
//!
//! - **Control thread**: sends commands via lock-free ringbuffer
//! - **Audio thread**: owns the Mixer exclusively, processes commands
//! - **Atomics**: levels and voice counts are read via relaxed atomics
//!
//! [`VirtualDeviceBridge`] does all of the above in one call.

mod backend;
mod bridge;
mod config;
mod device;
mod error;
mod mic;
mod virtual_sink;

// Platform-specific backends
#[cfg(not(all(target_os = "linux", feature = "jack-backend")))]
mod cpal_backend;

#[cfg(all(target_os = "linux", feature = "jack-backend"))]
mod jack_backend;

pub use backend::{start_audio_system, AudioHandle, AudioSystem, RealtimeParts};
pub use bridge::{EngineControl, VirtualDeviceBridge};
pub use config::{
    AudioConfig, BufferSize, DeviceId, VirtualDeviceConfig, DEFAULT_BUFFER_SIZE,
    DEFAULT_SINK_DESCRIPTION, DEFAULT_SINK_NAME,
};
pub use device::{
    default_device, find_device, find_device_containing, get_input_devices, get_output_devices,
    AudioDevice, Direction,
};
pub use error::{DeviceError, DeviceResult};
pub use mic::{start_mic_capture, MicCapture};
pub use virtual_sink::{
    check_server, list_microphone_sources, move_own_streams, remove_stale_modules, VirtualSink,
};
