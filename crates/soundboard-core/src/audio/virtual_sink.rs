//! Virtual microphone management through the PulseAudio/PipeWire server
//!
//! The mix is played into a null sink. Its monitor source is what other
//! applications record from, so to them the sink *is* a microphone. Module
//! management goes through `pactl`, which works against both PulseAudio and
//! PipeWire's pulse layer.
//!
//! Loaded modules are tracked and unloaded on [`VirtualSink::unload`] or drop.
//! Modules left over from a crashed run are found by sink name and removed
//! before new ones are created.

use std::process::Command;

use super::config::VirtualDeviceConfig;
use super::error::{DeviceError, DeviceResult};
use crate::types::CHANNELS;

/// Run `pactl` and return its stdout
fn pactl<S: AsRef<std::ffi::OsStr>>(args: &[S]) -> DeviceResult<String> {
    let output = Command::new("pactl")
        .args(args)
        .output()
        .map_err(|e| DeviceError::AudioServerUnavailable(format!("could not run pactl: {}", e)))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        let first = args
            .first()
            .map(|a| a.as_ref().to_string_lossy().into_owned())
            .unwrap_or_default();
        Err(DeviceError::SinkCreation(format!(
            "pactl {} failed: {}",
            first,
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}

/// Check that a PulseAudio-compatible server is reachable
pub fn check_server() -> DeviceResult<()> {
    match pactl(&["info"]) {
        Ok(_) => Ok(()),
        Err(DeviceError::SinkCreation(msg)) => Err(DeviceError::AudioServerUnavailable(msg)),
        Err(e) => Err(e),
    }
}

/// Arguments for creating the null sink
pub fn null_sink_args(config: &VirtualDeviceConfig, sample_rate: u32) -> Vec<String> {
    vec![
        "load-module".to_string(),
        "module-null-sink".to_string(),
        format!("sink_name={}", config.sink_name),
        format!(
            "sink_properties=device.description=\"{}\" node.pause-on-idle=false",
            config.description
        ),
        format!("rate={}", sample_rate),
        format!("channels={}", CHANNELS),
        "format=float32le".to_string(),
    ]
}

/// Arguments for publishing the monitor as a regular capture device
pub fn remap_source_args(config: &VirtualDeviceConfig) -> Vec<String> {
    vec![
        "load-module".to_string(),
        "module-remap-source".to_string(),
        format!("master={}", config.monitor_source()),
        format!("source_name={}", config.source_name()),
        format!(
            "source_properties=device.description=\"{}\"",
            config.description
        ),
    ]
}

/// Arguments for looping the mix back to a speaker
pub fn loopback_args(config: &VirtualDeviceConfig, speaker: &str) -> Vec<String> {
    vec![
        "load-module".to_string(),
        "module-loopback".to_string(),
        format!("source={}", config.monitor_source()),
        format!("sink={}", speaker),
        format!("latency_msec={}", config.monitor_latency_ms),
    ]
}

/// Ids of loaded modules whose arguments mention `sink_name`
///
/// Parses `pactl list modules short`.
pub fn parse_module_ids(listing: &str, sink_name: &str) -> Vec<u32> {
    listing
        .lines()
        .filter(|line| line.contains(sink_name))
        .filter_map(|line| line.split_whitespace().next()?.parse().ok())
        .collect()
}

/// Second column of a `pactl list ... short` listing
pub fn parse_short_names(listing: &str) -> Vec<String> {
    listing
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(str::to_string)
        .collect()
}

/// Capture sources that are real microphones: no monitors, not our own sink
pub fn filter_microphones(sources: Vec<String>, sink_name: &str) -> Vec<String> {
    sources
        .into_iter()
        .filter(|name| !name.contains(".monitor") && !name.contains(sink_name))
        .collect()
}

/// Sink-input ids that belong to process `pid`
///
/// Parses the long form of `pactl list sink-inputs`.
pub fn parse_sink_inputs_for_pid(listing: &str, pid: u32) -> Vec<u32> {
    let needle = format!("application.process.id = \"{}\"", pid);
    let mut current = None;
    let mut ids = Vec::new();
    for line in listing.lines().map(str::trim) {
        if let Some(id) = line.strip_prefix("Sink Input #") {
            current = id.trim().parse().ok();
        } else if line.contains(&needle) {
            if let Some(id) = current.take() {
                ids.push(id);
            }
        }
    }
    ids
}

/// Real microphone sources known to the audio server
pub fn list_microphone_sources(sink_name: &str) -> DeviceResult<Vec<String>> {
    let listing = pactl(&["list", "sources", "short"])?;
    Ok(filter_microphones(parse_short_names(&listing), sink_name))
}

/// Move every playback stream of this process onto the sink
///
/// Needed when the output stream was opened on the default device because
/// the host does not expose the sink by name. Returns how many were moved.
pub fn move_own_streams(sink_name: &str) -> DeviceResult<usize> {
    let listing = pactl(&["list", "sink-inputs"])?;
    let ids = parse_sink_inputs_for_pid(&listing, std::process::id());
    for id in &ids {
        pactl(&["move-sink-input", id.to_string().as_str(), sink_name])?;
        log::info!("Moved sink-input {} to {}", id, sink_name);
    }
    Ok(ids.len())
}

/// Unload every module that references `sink_name`
pub fn remove_stale_modules(sink_name: &str) -> DeviceResult<usize> {
    let listing = pactl(&["list", "modules", "short"])?;
    let ids = parse_module_ids(&listing, sink_name);
    for id in &ids {
        if let Err(e) = pactl(&["unload-module", id.to_string().as_str()]) {
            log::warn!("Could not unload stale module {}: {}", id, e);
        } else {
            log::info!("Unloaded stale module {}", id);
        }
    }
    Ok(ids.len())
}

/// The null sink and its helper modules
pub struct VirtualSink {
    config: VirtualDeviceConfig,
    /// Loaded module ids, in load order
    modules: Vec<u32>,
    source_published: bool,
}

impl VirtualSink {
    /// Create the sink and the configured helper modules
    ///
    /// A failing helper (remap source, loopback) is logged and skipped; only
    /// a failing null sink is an error.
    pub fn create(config: &VirtualDeviceConfig, sample_rate: u32) -> DeviceResult<Self> {
        check_server()?;
        remove_stale_modules(&config.sink_name)?;

        let mut sink = Self {
            config: config.clone(),
            modules: Vec::new(),
            source_published: false,
        };

        let id = sink.load(&null_sink_args(config, sample_rate))?;
        log::info!(
            "Created virtual sink {} ({} Hz, module {})",
            config.sink_name,
            sample_rate,
            id
        );

        if config.expose_as_source {
            match sink.load(&remap_source_args(config)) {
                Ok(id) => {
                    sink.source_published = true;
                    log::info!("Published {} (module {})", config.source_name(), id);
                }
                Err(e) => log::warn!("Could not publish capture source: {}", e),
            }
        }

        if config.monitor_to_speakers {
            match default_speaker() {
                Some(speaker) if speaker != config.sink_name => {
                    match sink.load(&loopback_args(config, &speaker)) {
                        Ok(_) => log::info!("Monitoring virtual microphone on {}", speaker),
                        Err(e) => log::warn!("Could not create monitor loopback: {}", e),
                    }
                }
                _ => log::warn!("No default speaker to monitor on"),
            }
        }

        Ok(sink)
    }

    pub fn sink_name(&self) -> &str {
        &self.config.sink_name
    }

    /// Name other applications should record from
    pub fn capture_source(&self) -> String {
        if self.source_published {
            self.config.source_name()
        } else {
            self.config.monitor_source()
        }
    }

    pub fn module_ids(&self) -> &[u32] {
        &self.modules
    }

    /// Unload all modules, newest first
    pub fn unload(&mut self) {
        self.source_published = false;
        while let Some(id) = self.modules.pop() {
            match pactl(&["unload-module", id.to_string().as_str()]) {
                Ok(_) => log::debug!("Unloaded module {}", id),
                Err(e) => log::warn!("Could not unload module {}: {}", id, e),
            }
        }
    }

    fn load(&mut self, args: &[String]) -> DeviceResult<u32> {
        let stdout = pactl(args)?;
        let id = stdout.trim().parse().map_err(|_| {
            DeviceError::SinkCreation(format!("unexpected module id {:?}", stdout.trim()))
        })?;
        self.modules.push(id);
        Ok(id)
    }
}

impl Drop for VirtualSink {
    fn drop(&mut self) {
        self.unload();
    }
}

fn default_speaker() -> Option<String> {
    pactl(&["get-default-sink"])
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_sink_args() {
        let config = VirtualDeviceConfig::default();
        let args = null_sink_args(&config, 48000);
        assert_eq!(args[1], "module-null-sink");
        assert!(args.contains(&"sink_name=soundboard_virtual_mic".to_string()));
        assert!(args.contains(&"rate=48000".to_string()));
        assert!(args.contains(&"channels=2".to_string()));
        assert!(args.contains(&"format=float32le".to_string()));
        assert!(args[3].contains("device.description=\"Soundboard Virtual Microphone\""));
        assert!(args[3].contains("node.pause-on-idle=false"));
    }

    #[test]
    fn test_helper_module_args_reference_the_sink() {
        let config = VirtualDeviceConfig::default();
        let loopback = loopback_args(&config, "alsa_output.pci-0000_00_1f.3.analog-stereo");
        assert!(loopback.contains(&"source=soundboard_virtual_mic.monitor".to_string()));
        assert!(loopback.contains(&"latency_msec=50".to_string()));

        let remap = remap_source_args(&config);
        assert!(remap.contains(&"master=soundboard_virtual_mic.monitor".to_string()));

        // Both are found again by the stale-module sweep
        for args in [loopback, remap] {
            assert!(args.iter().any(|a| a.contains(&config.sink_name)));
        }
    }

    #[test]
    fn test_parse_module_ids() {
        let listing = "\
536870913\tmodule-null-sink\tsink_name=soundboard_virtual_mic rate=48000
536870914\tmodule-loopback\tsource=soundboard_virtual_mic.monitor sink=speakers
536870915\tmodule-bluetooth-policy\t
";
        assert_eq!(
            parse_module_ids(listing, "soundboard_virtual_mic"),
            vec![536870913, 536870914]
        );
        assert!(parse_module_ids("", "soundboard_virtual_mic").is_empty());
    }

    #[test]
    fn test_filter_microphones() {
        let listing = "\
57\talsa_output.pci.analog-stereo.monitor\tPipeWire\ts32le 2ch 48000Hz\tSUSPENDED
58\talsa_input.pci.analog-stereo\tPipeWire\ts32le 2ch 48000Hz\tRUNNING
90\tsoundboard_virtual_mic.monitor\tPipeWire\tfloat32le 2ch 48000Hz\tIDLE
91\tsoundboard_virtual_mic_source\tPipeWire\tfloat32le 2ch 48000Hz\tIDLE
";
        let mics = filter_microphones(parse_short_names(listing), "soundboard_virtual_mic");
        assert_eq!(mics, vec!["alsa_input.pci.analog-stereo".to_string()]);
    }

    #[test]
    fn test_parse_sink_inputs_for_pid() {
        let listing = r#"Sink Input #71
	Driver: PipeWire
	Properties:
		application.name = "Firefox"
		application.process.id = "1200"
Sink Input #83
	Driver: PipeWire
	Properties:
		application.name = "ALSA plug-in [soundboard]"
		application.process.id = "4242"
"#;
        assert_eq!(parse_sink_inputs_for_pid(listing, 4242), vec![83]);
        assert!(parse_sink_inputs_for_pid(listing, 1).is_empty());
    }
}
