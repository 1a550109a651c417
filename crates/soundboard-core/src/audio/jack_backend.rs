//! Native JACK audio backend for Linux
//!
//! Used when the `jack-backend` feature is enabled. Works with PipeWire's JACK
//! layer, where the virtual sink shows up as a regular client with playback
//! ports. The mix goes straight into those ports and the real microphone is
//! read from capture ports in the same process cycle, so no second stream or
//! `pactl move-sink-input` is needed.

use crossbeam::channel::Sender;
use jack::{AudioIn, AudioOut, Client, ClientOptions, Control, Port, PortFlags, ProcessScope};

use super::backend::{AudioHandle, AudioSystem, RealtimeParts};
use super::config::{AudioConfig, VirtualDeviceConfig};
use super::error::{DeviceError, DeviceResult};
use crate::engine::Mixer;
use crate::types::{StereoSample, MAX_BLOCK_FRAMES};

const OUT_LEFT: &str = "out_left";
const OUT_RIGHT: &str = "out_right";
const MIC_LEFT: &str = "mic_left";
const MIC_RIGHT: &str = "mic_right";

/// JACK-specific audio handle
///
/// Keeps the JACK client active. Drop this to disconnect from JACK.
pub struct JackAudioHandle {
    _async_client: jack::AsyncClient<JackNotifications, JackProcessor>,
    sample_rate: u32,
    buffer_size: u32,
    mic_connected: bool,
}

impl JackAudioHandle {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size as f32 / self.sample_rate as f32) * 1000.0
    }

    pub fn has_mic(&self) -> bool {
        self.mic_connected
    }
}

/// Microphone input ports and the ring they feed
struct MicPorts {
    left: Port<AudioIn>,
    right: Port<AudioIn>,
    ring: rtrb::Producer<StereoSample>,
}

/// JACK process handler
///
/// Owns the Mixer exclusively - no mutex needed.
struct JackProcessor {
    out_left: Port<AudioOut>,
    out_right: Port<AudioOut>,
    mic: Option<MicPorts>,
    mixer: Mixer,
}

impl jack::ProcessHandler for JackProcessor {
    fn process(&mut self, _client: &Client, ps: &ProcessScope) -> Control {
        if let Some(mic) = self.mic.as_mut() {
            let left = mic.left.as_slice(ps);
            let right = mic.right.as_slice(ps);
            for (l, r) in left.iter().zip(right) {
                if mic.ring.push(StereoSample::new(*l, *r)).is_err() {
                    break;
                }
            }
        }

        let out_left = self.out_left.as_mut_slice(ps);
        let out_right = self.out_right.as_mut_slice(ps);

        for (left, right) in out_left
            .chunks_mut(MAX_BLOCK_FRAMES)
            .zip(out_right.chunks_mut(MAX_BLOCK_FRAMES))
        {
            let block = self.mixer.process_block(left.len());
            for ((l, r), sample) in left.iter_mut().zip(right.iter_mut()).zip(block) {
                *l = sample.left;
                *r = sample.right;
            }
        }

        Control::Continue
    }
}

/// JACK notification handler
///
/// JACK2 calls the sample rate callback once at activation with the current
/// rate; only a rate different from the one the mixer was built for is
/// reported.
struct JackNotifications {
    errors: Sender<DeviceError>,
    sample_rate: u32,
}

impl JackNotifications {
    fn rate_changed(&mut self, srate: u32) {
        if srate == self.sample_rate {
            log::debug!("JACK sample rate confirmed: {}", srate);
            return;
        }
        log::info!("JACK sample rate changed from {} to {}", self.sample_rate, srate);
        self.sample_rate = srate;
        let _ = self.errors.try_send(DeviceError::Jack(format!(
            "sample rate changed to {} Hz, restart the engine",
            srate
        )));
    }
}

impl jack::NotificationHandler for JackNotifications {
    fn sample_rate(&mut self, _client: &Client, srate: jack::Frames) -> Control {
        self.rate_changed(srate);
        Control::Continue
    }

    fn xrun(&mut self, _client: &Client) -> Control {
        log::warn!("JACK xrun detected");
        Control::Continue
    }
}

fn jack_err(context: &str) -> impl Fn(jack::Error) -> DeviceError + '_ {
    move |e| DeviceError::Jack(format!("{}: {}", context, e))
}

/// Start the JACK client and connect it to the virtual sink
pub fn start_audio_system<F>(
    config: &AudioConfig,
    virtual_device: &VirtualDeviceConfig,
    build: F,
) -> DeviceResult<AudioSystem>
where
    F: FnOnce(u32) -> RealtimeParts,
{
    // JACK may rename if another client has the same name
    let (client, _status) = Client::new(&config.client_name, ClientOptions::NO_START_SERVER)
        .map_err(jack_err("failed to create client"))?;
    let client_name = client.name().to_string();

    let sample_rate = client.sample_rate() as u32;
    let buffer_size = client.buffer_size();
    let latency_ms = (buffer_size as f32 / sample_rate as f32) * 1000.0;

    log::info!(
        "JACK client '{}' created (sample rate: {}Hz, buffer: {} frames, latency: {:.1}ms)",
        client_name,
        sample_rate,
        buffer_size,
        latency_ms
    );

    let out_left = client
        .register_port(OUT_LEFT, AudioOut::default())
        .map_err(jack_err("failed to register port"))?;
    let out_right = client
        .register_port(OUT_RIGHT, AudioOut::default())
        .map_err(jack_err("failed to register port"))?;

    let RealtimeParts { mixer, mic, errors } = build(sample_rate);

    let mic = match mic {
        Some(ring) => Some(MicPorts {
            left: client
                .register_port(MIC_LEFT, AudioIn::default())
                .map_err(jack_err("failed to register port"))?,
            right: client
                .register_port(MIC_RIGHT, AudioIn::default())
                .map_err(jack_err("failed to register port"))?,
            ring,
        }),
        None => None,
    };
    let wants_mic = mic.is_some();

    // Port discovery has to happen before the client moves into activation
    let playback: Vec<String> = client
        .ports(Some(".*:playback_.*"), None, PortFlags::IS_INPUT)
        .into_iter()
        .filter(|p| {
            p.contains(&virtual_device.sink_name) || p.contains(&virtual_device.description)
        })
        .collect();
    let capture: Vec<String> = client
        .ports(
            Some(".*:capture_.*"),
            None,
            PortFlags::IS_OUTPUT | PortFlags::IS_PHYSICAL,
        )
        .into_iter()
        .filter(|p| !p.starts_with(&format!("{}:", client_name)))
        .collect();

    let processor = JackProcessor {
        out_left,
        out_right,
        mic,
        mixer,
    };
    let async_client = client
        .activate_async(JackNotifications { errors, sample_rate }, processor)
        .map_err(jack_err("failed to activate client"))?;
    log::info!("JACK client activated");

    let active = async_client.as_client();
    let own = |port: &str| format!("{}:{}", client_name, port);

    let routed_to_sink = match pick_stereo_pair(&playback) {
        Some((left, right)) => {
            connect(active, &own(OUT_LEFT), &left) && connect(active, &own(OUT_RIGHT), &right)
        }
        None => {
            log::warn!("No JACK playback ports found for {}", virtual_device.sink_name);
            false
        }
    };

    let mic_connected = wants_mic
        && match pick_stereo_pair(&capture) {
            Some((left, right)) => {
                connect(active, &left, &own(MIC_LEFT)) && connect(active, &right, &own(MIC_RIGHT))
            }
            None => {
                log::warn!("No JACK capture ports found, microphone pass-through disabled");
                false
            }
        };

    let handle = JackAudioHandle {
        _async_client: async_client,
        sample_rate,
        buffer_size,
        mic_connected,
    };

    Ok(AudioSystem {
        handle: AudioHandle::Jack(handle),
        sample_rate,
        buffer_size,
        latency_ms,
        routed_to_sink,
    })
}

fn connect(client: &Client, source: &str, destination: &str) -> bool {
    match client.connect_ports_by_name(source, destination) {
        Ok(()) => {
            log::info!("Connected {} to {}", source, destination);
            true
        }
        Err(e) => {
            log::warn!("Could not connect {} to {}: {}", source, destination, e);
            false
        }
    }
}

/// Choose a left/right pair from a list of port names
///
/// Prefers PipeWire's `_FL`/`_FR` naming, then the first two ports in sorted
/// order. A single port is used for both sides.
fn pick_stereo_pair(ports: &[String]) -> Option<(String, String)> {
    let fl = ports.iter().find(|p| p.ends_with("_FL"));
    let fr = ports.iter().find(|p| p.ends_with("_FR"));
    if let (Some(left), Some(right)) = (fl, fr) {
        return Some((left.clone(), right.clone()));
    }

    let mut sorted: Vec<&String> = ports.iter().collect();
    sorted.sort();
    match sorted.as_slice() {
        [] => None,
        [only] => Some(((*only).clone(), (*only).clone())),
        [left, right, ..] => Some(((*left).clone(), (*right).clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(ports: &[&str]) -> Vec<String> {
        ports.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_pick_stereo_pair() {
        let pipewire = names(&[
            "Soundboard Virtual Microphone:playback_FR",
            "Soundboard Virtual Microphone:playback_FL",
        ]);
        assert_eq!(
            pick_stereo_pair(&pipewire),
            Some((pipewire[1].clone(), pipewire[0].clone()))
        );

        let numbered = names(&["system:capture_2", "system:capture_1", "system:capture_3"]);
        assert_eq!(
            pick_stereo_pair(&numbered),
            Some(("system:capture_1".to_string(), "system:capture_2".to_string()))
        );

        let mono = names(&["usb_mic:capture_MONO"]);
        assert_eq!(
            pick_stereo_pair(&mono),
            Some((mono[0].clone(), mono[0].clone()))
        );

        assert_eq!(pick_stereo_pair(&[]), None);
    }

    #[test]
    fn test_only_real_rate_changes_are_reported() {
        let (tx, rx) = crossbeam::channel::unbounded();
        let mut notifications = JackNotifications {
            errors: tx,
            sample_rate: 48000,
        };

        // Initial callback at activation
        notifications.rate_changed(48000);
        assert!(rx.try_recv().is_err());

        notifications.rate_changed(44100);
        assert!(matches!(rx.try_recv(), Ok(DeviceError::Jack(_))));

        notifications.rate_changed(44100);
        assert!(rx.try_recv().is_err());
    }
}
