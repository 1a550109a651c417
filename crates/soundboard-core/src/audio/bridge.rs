//! Virtual device bridge - ties the virtual sink, the audio backend and the
//! mixer together
//!
//! ```ignore
//! let mut bridge = VirtualDeviceBridge::new(load_config(&default_config_path()));
//! let mut control = bridge.start()?;
//! let horn = control.sounds.load("horn.ogg")?;
//! control.commands.trigger(&horn, 1.0, OverlapPolicy::Independent)?;
//! ```

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::backend::{start_audio_system, AudioSystem, RealtimeParts};
use super::config::VirtualDeviceConfig;
use super::error::{DeviceError, DeviceResult};
use super::virtual_sink::{move_own_streams, VirtualSink};
use crate::config::EngineConfig;
use crate::decoder::SoundCache;
use crate::engine::{mic_ring, CommandSender, Mixer, MixerAtomics, StatusReceiver};

/// Delay before moving our playback stream, so the server has registered it
const STREAM_MOVE_DELAY: Duration = Duration::from_millis(500);

/// Control-side handles of a running engine
pub struct EngineControl {
    /// Commands into the audio thread
    pub commands: CommandSender,
    /// Voice completions, rejected triggers and device errors
    pub status: StatusReceiver,
    /// Lock-free levels and counters
    pub atomics: Arc<MixerAtomics>,
    /// Decoded sounds, already at the engine rate
    pub sounds: SoundCache,
    /// Rate the device runs at
    pub sample_rate: u32,
    /// Name other applications should record from, if a sink was created
    pub capture_source: Option<String>,
}

/// Owns the virtual sink and the running audio backend
pub struct VirtualDeviceBridge {
    config: EngineConfig,
    sink: Option<VirtualSink>,
    audio: Option<AudioSystem>,
    stream_mover: Option<JoinHandle<()>>,
}

impl VirtualDeviceBridge {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            sink: None,
            audio: None,
            stream_mover: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.audio.is_some()
    }

    /// Latency and rate of the running backend
    pub fn audio(&self) -> Option<&AudioSystem> {
        self.audio.as_ref()
    }

    /// Create the virtual device and start mixing into it
    ///
    /// A running bridge is stopped first. When the virtual sink cannot be
    /// created the engine still starts on the default output device; the
    /// sink failure is then the first [`StatusEvent::Device`] on the status
    /// queue and [`EngineControl::capture_source`] is `None`. Only a backend
    /// failure is returned as an error, and then nothing is left behind.
    ///
    /// [`StatusEvent::Device`]: crate::engine::StatusEvent::Device
    pub fn start(&mut self) -> DeviceResult<EngineControl> {
        if self.is_running() {
            self.stop();
        }

        let virtual_device = &self.config.virtual_device;
        let (sink, sink_error) = prepare_sink(virtual_device, self.config.audio.sample_rate);

        let settings = self.config.mixer.clone();
        let mic_passthrough = virtual_device.mic_passthrough;
        let mut control_side = None;

        let audio = start_audio_system(&self.config.audio, virtual_device, |sample_rate| {
            let (mut mixer, commands, status) = Mixer::new(&settings, sample_rate);
            let mic = mic_passthrough.then(|| {
                let (producer, consumer) = mic_ring();
                mixer.attach_mic(consumer);
                producer
            });
            let errors = status.device_error_sender();
            control_side = Some((commands, status, mixer.atomics()));
            RealtimeParts { mixer, mic, errors }
        })?;

        let (commands, status, atomics) = control_side.ok_or_else(|| {
            DeviceError::ConfigError("audio backend started without a mixer".to_string())
        })?;

        if let Some(err) = sink_error {
            let _ = status.device_error_sender().try_send(err);
        }

        log::info!(
            "Engine running at {} Hz, {} frames (~{:.1}ms), microphone {}",
            audio.sample_rate,
            audio.buffer_size,
            audio.latency_ms,
            if audio.handle.has_mic() { "on" } else { "off" }
        );

        if needs_stream_move(audio.routed_to_sink, virtual_device.create_sink, sink.is_some()) {
            let sink_name = virtual_device.sink_name.clone();
            let errors = status.device_error_sender();
            let mover = std::thread::Builder::new()
                .name("stream-mover".to_string())
                .spawn(move || {
                    std::thread::sleep(STREAM_MOVE_DELAY);
                    match move_own_streams(&sink_name) {
                        Ok(0) => {
                            log::warn!("No playback stream of ours found to move to {}", sink_name)
                        }
                        Ok(moved) => log::debug!("Moved {} stream(s) to {}", moved, sink_name),
                        Err(e) => {
                            log::error!("Could not route output to {}: {}", sink_name, e);
                            let _ = errors.try_send(e);
                        }
                    }
                })
                .map_err(|e| DeviceError::ConfigError(format!("could not spawn thread: {}", e)))?;
            self.stream_mover = Some(mover);
        }

        let capture_source = sink.as_ref().map(VirtualSink::capture_source);
        if let Some(source) = &capture_source {
            log::info!("Applications can record the soundboard from {}", source);
        }

        let control = EngineControl {
            commands,
            status,
            atomics,
            sounds: SoundCache::new(audio.sample_rate),
            sample_rate: audio.sample_rate,
            capture_source,
        };
        self.sink = sink;
        self.audio = Some(audio);
        Ok(control)
    }

    /// Stop the audio backend and remove the virtual device
    ///
    /// Sounds still referenced by the control side stay valid.
    pub fn stop(&mut self) {
        if let Some(audio) = self.audio.take() {
            drop(audio);
            log::info!("Audio stopped");
        }
        if let Some(mover) = self.stream_mover.take() {
            let _ = mover.join();
        }
        if let Some(mut sink) = self.sink.take() {
            sink.unload();
            log::info!("Removed virtual sink {}", sink.sink_name());
        }
    }
}

impl Drop for VirtualDeviceBridge {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Load the virtual sink if the config asks for one
///
/// A failure is logged and handed back instead of aborting the start.
fn prepare_sink(
    virtual_device: &VirtualDeviceConfig,
    sample_rate: u32,
) -> (Option<VirtualSink>, Option<DeviceError>) {
    if !virtual_device.create_sink {
        log::info!("Using existing sink {}", virtual_device.sink_name);
        return (None, None);
    }
    match VirtualSink::create(virtual_device, sample_rate) {
        Ok(sink) => (Some(sink), None),
        Err(e) => {
            log::error!("Virtual sink unavailable, playing on the default device: {}", e);
            (None, Some(e))
        }
    }
}

/// Whether our playback stream must be moved onto the sink after start
///
/// Only when the backend did not open the sink directly and a sink to move
/// to exists: either one we created or one the config says is already there.
fn needs_stream_move(routed_to_sink: bool, create_sink: bool, sink_created: bool) -> bool {
    !routed_to_sink && (sink_created || !create_sink)
}
