//! CPAL audio backend implementation
//!
//! The output stream is opened on the virtual sink when the host lists it as
//! a device (PipeWire's ALSA plugin usually does). Otherwise it is opened on
//! the default device and the bridge moves the stream to the sink afterwards.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐                     ┌─────────────────────┐
//! │  Control thread  │───push()───────────►│   Command Queue     │
//! │ (hotkeys, UI...) │                     │  (lock-free SPSC)   │
//! └──────────────────┘                     └──────────┬──────────┘
//!         ▲                                           │ pop()
//!         │ poll()                                    ▼
//! ┌──────────────────┐                     ┌─────────────────────┐
//! │  Status Queue    │◄────────────────────│  CPAL Audio Thread  │
//! │ (lock-free SPSC) │   finished voices   │    (owns Mixer)     │
//! └──────────────────┘                     └──────────▲──────────┘
//!                                                     │ mic ring
//!                                          ┌──────────┴──────────┐
//!                                          │ CPAL capture stream │
//!                                          └─────────────────────┘
//! ```

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, Stream, StreamConfig};
use crossbeam::channel::Sender;

use super::backend::{write_interleaved, AudioHandle, AudioSystem, RealtimeParts};
use super::config::{AudioConfig, VirtualDeviceConfig};
use super::device::{default_device, find_device, find_device_containing, Direction};
use super::error::{DeviceError, DeviceResult};
use super::mic::{start_mic_capture, MicCapture};
use crate::engine::Mixer;
use crate::types::MAX_BLOCK_FRAMES;

/// CPAL-specific audio handle
///
/// Keeps the audio streams alive. Drop this to stop audio.
pub struct CpalAudioHandle {
    _output_stream: Stream,
    /// Microphone capture, if it could be started
    mic: Option<MicCapture>,
    sample_rate: u32,
    /// Actual buffer size in frames (as negotiated with the device)
    buffer_size: u32,
}

impl CpalAudioHandle {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    /// Get the audio latency in milliseconds (one-way, output only)
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size as f32 / self.sample_rate as f32) * 1000.0
    }

    pub fn has_mic(&self) -> bool {
        self.mic.is_some()
    }
}

/// Start the CPAL output stream (and microphone capture)
pub fn start_audio_system<F>(
    config: &AudioConfig,
    virtual_device: &VirtualDeviceConfig,
    build: F,
) -> DeviceResult<AudioSystem>
where
    F: FnOnce(u32) -> RealtimeParts,
{
    let device = match &config.output_device {
        Some(id) => find_device(id, Direction::Output)?,
        None => match find_device_containing(&virtual_device.sink_name, Direction::Output) {
            Some(device) => device,
            None => {
                log::debug!(
                    "Host does not list {}, opening the default device",
                    virtual_device.sink_name
                );
                default_device(Direction::Output)?
            }
        },
    };

    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    let routed_to_sink = device_name.contains(&virtual_device.sink_name);
    log::info!("Using audio device: {}", device_name);

    let (supported_config, buffer_size) = get_output_config(&device, config)?;
    let sample_rate = supported_config.sample_rate().0;

    let stream_config = StreamConfig {
        channels: supported_config.channels(),
        sample_rate: supported_config.sample_rate(),
        buffer_size: CpalBufferSize::Fixed(buffer_size),
    };

    let latency_ms = config.buffer_size.latency_ms(sample_rate);
    log::info!(
        "Audio config: {} channels, {}Hz, {} frames (~{:.1}ms latency)",
        stream_config.channels,
        sample_rate,
        buffer_size,
        latency_ms
    );

    let RealtimeParts { mixer, mic, errors } = build(sample_rate);

    let stream = build_output_stream(&device, &stream_config, mixer, errors.clone())?;
    stream
        .play()
        .map_err(|e| DeviceError::StreamPlayError(e.to_string()))?;
    log::info!("Audio stream started");

    // A missing microphone leaves the board usable
    let mic = mic.and_then(|producer| {
        match start_mic_capture(config.input_device.as_ref(), sample_rate, producer, errors.clone()) {
            Ok(capture) => Some(capture),
            Err(e) => {
                log::warn!("Microphone pass-through disabled: {}", e);
                let _ = errors.try_send(e);
                None
            }
        }
    });

    let handle = CpalAudioHandle {
        _output_stream: stream,
        mic,
        sample_rate,
        buffer_size,
    };

    Ok(AudioSystem {
        handle: AudioHandle::Cpal(handle),
        sample_rate,
        buffer_size,
        latency_ms,
        routed_to_sink,
    })
}

/// Get the best output configuration for a device
///
/// Returns (SupportedStreamConfig, buffer_size_in_frames). Only `f32` configs
/// are considered since the mixer renders `f32`.
fn get_output_config(
    device: &cpal::Device,
    config: &AudioConfig,
) -> DeviceResult<(cpal::SupportedStreamConfig, u32)> {
    let supported_configs: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| DeviceError::ConfigError(e.to_string()))?
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .collect();

    let target_sample_rate = config.sample_rate;

    let best_config = supported_configs
        .iter()
        .filter(|c| c.channels() >= 2)
        .find(|c| {
            target_sample_rate >= c.min_sample_rate().0
                && target_sample_rate <= c.max_sample_rate().0
        })
        .or_else(|| supported_configs.iter().find(|c| c.channels() >= 2))
        .or_else(|| supported_configs.first())
        .ok_or_else(|| {
            DeviceError::ConfigError("No f32 output configuration available".to_string())
        })?;

    let sample_rate = if target_sample_rate >= best_config.min_sample_rate().0
        && target_sample_rate <= best_config.max_sample_rate().0
    {
        cpal::SampleRate(target_sample_rate)
    } else {
        let fallback = best_config.max_sample_rate();
        log::warn!(
            "Audio device doesn't support {}Hz, falling back to {}Hz (sounds will be resampled)",
            target_sample_rate,
            fallback.0
        );
        fallback
    };

    let buffer_size = config.buffer_size.frames();
    log::debug!(
        "Selected buffer size: {} frames for {:?} mode",
        buffer_size,
        config.buffer_size
    );

    Ok((best_config.clone().with_sample_rate(sample_rate), buffer_size))
}

/// Build the output stream; the mixer moves into the callback
fn build_output_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mut mixer: Mixer,
    errors: Sender<DeviceError>,
) -> DeviceResult<Stream> {
    let channels = config.channels as usize;

    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                // Devices may ask for more than one mixer block at once
                for chunk in data.chunks_mut(MAX_BLOCK_FRAMES * channels) {
                    let frames = chunk.len() / channels;
                    let block = mixer.process_block(frames);
                    write_interleaved(block, chunk, channels);
                }
            },
            move |err| {
                log::error!("Output stream error: {}", err);
                let _ = errors.try_send(DeviceError::StreamError(err.to_string()));
            },
            None,
        )
        .map_err(|e| DeviceError::StreamBuildError(e.to_string()))
}
