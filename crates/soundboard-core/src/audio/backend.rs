//! Audio backend selection
//!
//! - **Linux with `jack-backend`**: native JACK, ports wired straight into the
//!   virtual sink and the system capture ports
//! - **Everything else**: CPAL, output stream opened on the virtual sink
//!
//! Both backends follow the same lock-free layout: the control side sends
//! commands through a ring buffer and the audio thread owns the [`Mixer`]
//! outright.

use crossbeam::channel::Sender;

use super::config::{AudioConfig, VirtualDeviceConfig};
use super::error::{DeviceError, DeviceResult};
use crate::engine::Mixer;
use crate::types::StereoSample;

/// Everything the audio thread takes ownership of
///
/// Built by the caller once the device rate is known; see
/// [`start_audio_system`].
pub struct RealtimeParts {
    pub mixer: Mixer,
    /// Producer side of the mixer's microphone ring, if pass-through is on
    pub mic: Option<rtrb::Producer<StereoSample>>,
    /// Where stream errors are reported
    pub errors: Sender<DeviceError>,
}

/// Result of starting the audio system
pub struct AudioSystem {
    /// Handle to keep audio alive (drop to stop)
    pub handle: AudioHandle,
    pub sample_rate: u32,
    /// Actual buffer size in frames
    pub buffer_size: u32,
    /// One-way output latency in milliseconds
    pub latency_ms: f32,
    /// Whether the output already lands on the virtual sink
    ///
    /// When false the process's own stream has to be moved there.
    pub routed_to_sink: bool,
}

/// Handle to the active audio system
///
/// Keeps the audio streams/client alive. Drop this to stop audio.
pub enum AudioHandle {
    /// CPAL-based handle
    #[cfg(not(all(target_os = "linux", feature = "jack-backend")))]
    Cpal(super::cpal_backend::CpalAudioHandle),

    /// Native JACK handle (Linux with jack-backend feature)
    #[cfg(all(target_os = "linux", feature = "jack-backend"))]
    Jack(super::jack_backend::JackAudioHandle),
}

impl AudioHandle {
    pub fn sample_rate(&self) -> u32 {
        match self {
            #[cfg(not(all(target_os = "linux", feature = "jack-backend")))]
            AudioHandle::Cpal(h) => h.sample_rate(),
            #[cfg(all(target_os = "linux", feature = "jack-backend"))]
            AudioHandle::Jack(h) => h.sample_rate(),
        }
    }

    /// Get the actual buffer size in frames
    pub fn buffer_size(&self) -> u32 {
        match self {
            #[cfg(not(all(target_os = "linux", feature = "jack-backend")))]
            AudioHandle::Cpal(h) => h.buffer_size(),
            #[cfg(all(target_os = "linux", feature = "jack-backend"))]
            AudioHandle::Jack(h) => h.buffer_size(),
        }
    }

    pub fn latency_ms(&self) -> f32 {
        match self {
            #[cfg(not(all(target_os = "linux", feature = "jack-backend")))]
            AudioHandle::Cpal(h) => h.latency_ms(),
            #[cfg(all(target_os = "linux", feature = "jack-backend"))]
            AudioHandle::Jack(h) => h.latency_ms(),
        }
    }

    /// Whether real microphone frames are flowing into the mixer
    pub fn has_mic(&self) -> bool {
        match self {
            #[cfg(not(all(target_os = "linux", feature = "jack-backend")))]
            AudioHandle::Cpal(h) => h.has_mic(),
            #[cfg(all(target_os = "linux", feature = "jack-backend"))]
            AudioHandle::Jack(h) => h.has_mic(),
        }
    }
}

/// Start the audio system
///
/// The backend decides the sample rate; `build` receives it and returns the
/// mixer and friends, which are then moved into the audio thread.
///
/// Automatically selects the backend:
/// - **Linux with jack-backend feature**: native JACK
/// - **Other platforms**: CPAL
pub fn start_audio_system<F>(
    config: &AudioConfig,
    virtual_device: &VirtualDeviceConfig,
    build: F,
) -> DeviceResult<AudioSystem>
where
    F: FnOnce(u32) -> RealtimeParts,
{
    #[cfg(all(target_os = "linux", feature = "jack-backend"))]
    {
        super::jack_backend::start_audio_system(config, virtual_device, build)
    }

    #[cfg(not(all(target_os = "linux", feature = "jack-backend")))]
    {
        super::cpal_backend::start_audio_system(config, virtual_device, build)
    }
}

/// Copy a stereo block into an interleaved device buffer
///
/// Channels past the second get silence, as do frames past the end of
/// `samples`.
#[cfg_attr(all(target_os = "linux", feature = "jack-backend"), allow(dead_code))]
pub(crate) fn write_interleaved(samples: &[StereoSample], data: &mut [f32], channels: usize) {
    for (i, frame) in data.chunks_mut(channels).enumerate() {
        match samples.get(i) {
            Some(sample) => {
                frame[0] = sample.left;
                if channels > 1 {
                    frame[1] = sample.right;
                }
                for ch in frame.iter_mut().skip(2) {
                    *ch = 0.0;
                }
            }
            None => frame.fill(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_interleaved_layouts() {
        let block = [StereoSample::new(0.5, -0.5), StereoSample::new(0.25, -0.25)];

        let mut stereo = [9.0f32; 4];
        write_interleaved(&block, &mut stereo, 2);
        assert_eq!(stereo, [0.5, -0.5, 0.25, -0.25]);

        let mut mono = [9.0f32; 2];
        write_interleaved(&block, &mut mono, 1);
        assert_eq!(mono, [0.5, 0.25]);

        let mut quad = [9.0f32; 12];
        write_interleaved(&block, &mut quad, 4);
        assert_eq!(
            quad,
            [0.5, -0.5, 0.0, 0.0, 0.25, -0.25, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]
        );
    }
}
