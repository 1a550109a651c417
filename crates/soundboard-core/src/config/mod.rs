//! Engine configuration
//!
//! One YAML file holds everything the engine needs at start:
//!
//! ```yaml
//! audio:
//!   buffer_size: LowLatency
//!   sample_rate: 48000
//! mixer:
//!   max_voices: 32
//!   mute_mic_while_playing: true
//! virtual_device:
//!   sink_name: soundboard_virtual_mic
//!   monitor_to_speakers: true
//! ```
//!
//! Missing keys take their defaults, so an empty file is a valid config.

mod io;
mod paths;

use serde::{Deserialize, Serialize};

use crate::audio::{AudioConfig, VirtualDeviceConfig};
use crate::engine::MixerSettings;

pub use io::{load_config, save_config};
pub use paths::{default_config_dir, default_config_path, CONFIG_FILE_NAME};

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub audio: AudioConfig,
    pub mixer: MixerSettings,
    pub virtual_device: VirtualDeviceConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::BufferSize;
    use crate::engine::OverlapPolicy;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "\
audio:
  buffer_size: !Fixed 256
mixer:
  max_voices: 8
virtual_device:
  monitor_to_speakers: false
";
        let config: EngineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.audio.buffer_size, BufferSize::Fixed(256));
        assert_eq!(config.audio.sample_rate, 48000);
        assert_eq!(config.mixer.max_voices, 8);
        assert!(config.mixer.mute_mic_while_playing);
        assert!(!config.virtual_device.monitor_to_speakers);
        assert_eq!(config.virtual_device.sink_name, "soundboard_virtual_mic");
    }

    #[test]
    fn test_overlap_policy_names() {
        let policy: OverlapPolicy = serde_yaml::from_str("exclusive_per_sound").unwrap();
        assert_eq!(policy, OverlapPolicy::ExclusivePerSound);
        assert_eq!(serde_yaml::to_string(&OverlapPolicy::Independent).unwrap().trim(), "independent");
    }
}
