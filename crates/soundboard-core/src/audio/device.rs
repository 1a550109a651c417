//! Audio device enumeration
//!
//! Lists output and capture devices from every available cpal host so a UI
//! can offer them, and resolves configured [`DeviceId`]s back to devices.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Host, HostId};

use super::config::DeviceId;
use super::error::{DeviceError, DeviceResult};

/// Which side of a device to look at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Output,
    Input,
}

/// Get a human-readable name for a host ID
fn host_name(host_id: HostId) -> String {
    let name = format!("{:?}", host_id);
    match name.as_str() {
        "Alsa" => "ALSA".to_string(),
        "Jack" => "JACK".to_string(),
        "Wasapi" => "WASAPI".to_string(),
        _ => name,
    }
}

fn get_host_by_name(name: &str) -> Option<Host> {
    cpal::available_hosts()
        .into_iter()
        .find(|id| host_name(*id) == name)
        .and_then(|id| cpal::host_from_id(id).ok())
}

/// Information about an audio device
#[derive(Debug, Clone)]
pub struct AudioDevice {
    /// Device identifier for configuration (includes host info)
    pub id: DeviceId,
    pub name: String,
    /// Host backend name (e.g., "ALSA", "JACK")
    pub host: String,
    /// Whether this is the default device of its host
    pub is_default: bool,
    /// Common sample rates within the supported range
    pub sample_rates: Vec<u32>,
    pub max_channels: u16,
}

impl std::fmt::Display for AudioDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.host, self.name)
    }
}

fn devices_of(host: &Host, direction: Direction) -> Option<Vec<cpal::Device>> {
    let devices: Result<Vec<cpal::Device>, cpal::DevicesError> = match direction {
        Direction::Output => host.output_devices().map(|d| d.collect()),
        Direction::Input => host.input_devices().map(|d| d.collect()),
    };
    match devices {
        Ok(devices) => Some(devices),
        Err(e) => {
            log::debug!("Could not enumerate {:?} devices: {}", direction, e);
            None
        }
    }
}

fn default_of(host: &Host, direction: Direction) -> Option<cpal::Device> {
    match direction {
        Direction::Output => host.default_output_device(),
        Direction::Input => host.default_input_device(),
    }
}

/// Sample rates and channel count a device supports, `None` if it has no configs
fn capabilities(device: &cpal::Device, direction: Direction) -> Option<(Vec<u32>, u16)> {
    let ranges: Vec<(u32, u32, u16)> = match direction {
        Direction::Output => device
            .supported_output_configs()
            .ok()?
            .map(|c| (c.min_sample_rate().0, c.max_sample_rate().0, c.channels()))
            .collect(),
        Direction::Input => device
            .supported_input_configs()
            .ok()?
            .map(|c| (c.min_sample_rate().0, c.max_sample_rate().0, c.channels()))
            .collect(),
    };
    if ranges.is_empty() {
        return None;
    }

    let mut sample_rates: Vec<u32> = [44100, 48000, 88200, 96000, 176400, 192000]
        .into_iter()
        .filter(|rate| ranges.iter().any(|(min, max, _)| rate >= min && rate <= max))
        .collect();
    sample_rates.sort_unstable();
    let max_channels = ranges.iter().map(|(_, _, ch)| *ch).max().unwrap_or(0);
    Some((sample_rates, max_channels))
}

fn enumerate(direction: Direction) -> DeviceResult<Vec<AudioDevice>> {
    let mut all_devices = Vec::new();

    for host_id in cpal::available_hosts() {
        let host = match cpal::host_from_id(host_id) {
            Ok(h) => h,
            Err(e) => {
                log::debug!("Could not initialize host {:?}: {}", host_id, e);
                continue;
            }
        };
        let host_label = host_name(host_id);
        let default_name = default_of(&host, direction).and_then(|d| d.name().ok());

        for device in devices_of(&host, direction).unwrap_or_default() {
            let Ok(name) = device.name() else {
                continue;
            };
            let Some((sample_rates, max_channels)) = capabilities(&device, direction) else {
                continue;
            };
            all_devices.push(AudioDevice {
                id: DeviceId::with_host(&name, &host_label),
                is_default: default_name.as_ref() == Some(&name),
                name,
                host: host_label.clone(),
                sample_rates,
                max_channels,
            });
        }
    }

    if all_devices.is_empty() {
        return Err(DeviceError::NoDevices);
    }

    // Default devices first, then by host, then by name
    all_devices.sort_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then_with(|| a.host.cmp(&b.host))
            .then_with(|| a.name.cmp(&b.name))
    });

    log::debug!("Enumerated {} {:?} devices", all_devices.len(), direction);
    Ok(all_devices)
}

/// All output devices from all hosts
pub fn get_output_devices() -> DeviceResult<Vec<AudioDevice>> {
    enumerate(Direction::Output)
}

/// All capture devices from all hosts
pub fn get_input_devices() -> DeviceResult<Vec<AudioDevice>> {
    enumerate(Direction::Input)
}

/// Find a device by its ID
///
/// Uses the host named in the id if there is one, otherwise searches all hosts.
pub fn find_device(id: &DeviceId, direction: Direction) -> DeviceResult<cpal::Device> {
    let hosts: Vec<Host> = match id.host.as_deref().and_then(get_host_by_name) {
        Some(host) => vec![host],
        None => cpal::available_hosts()
            .into_iter()
            .filter_map(|h| cpal::host_from_id(h).ok())
            .collect(),
    };

    hosts
        .iter()
        .filter_map(|host| devices_of(host, direction))
        .flatten()
        .find(|d| d.name().ok().as_ref() == Some(&id.name))
        .ok_or_else(|| DeviceError::DeviceNotFound(id.display_label()))
}

/// First device of the default host whose name contains `fragment`
///
/// Used to pick the virtual sink directly when the host exposes it.
pub fn find_device_containing(fragment: &str, direction: Direction) -> Option<cpal::Device> {
    let host = cpal::default_host();
    devices_of(&host, direction)?
        .into_iter()
        .find(|d| d.name().map(|n| n.contains(fragment)).unwrap_or(false))
}

/// Default device of the default host
pub fn default_device(direction: Direction) -> DeviceResult<cpal::Device> {
    default_of(&cpal::default_host(), direction).ok_or_else(|| {
        DeviceError::NoDefaultDevice(format!("No default {:?} device", direction).to_lowercase())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_enumeration() {
        // This test may fail if no audio devices are available
        let listings = [
            (Direction::Output, get_output_devices()),
            (Direction::Input, get_input_devices()),
        ];
        for (direction, listing) in listings {
            match listing {
                Ok(devices) => {
                    assert!(!devices.is_empty());
                    // Defaults sort first
                    let first_non_default = devices.iter().position(|d| !d.is_default);
                    if let Some(i) = first_non_default {
                        assert!(devices[i..].iter().all(|d| !d.is_default));
                    }
                    for device in &devices {
                        println!("{:?}: {} rates {:?}", direction, device, device.sample_rates);
                    }
                }
                Err(DeviceError::NoDevices) => println!("No {:?} devices (expected in CI)", direction),
                Err(e) => println!("Error enumerating devices: {}", e),
            }
        }
    }

    #[test]
    fn test_unknown_device_is_not_found() {
        let id = DeviceId::with_host("no-such-device-xyz", "NoSuchHost");
        assert!(matches!(
            find_device(&id, Direction::Output),
            Err(DeviceError::DeviceNotFound(_))
        ));
    }
}
