//! Real microphone capture for pass-through into the mix
//!
//! A cpal input stream converts whatever the device delivers to stereo `f32`
//! and pushes it into the mixer's microphone ring. When the ring is full the
//! newest frames are dropped; the mixer keeps the ring short on its side.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use crossbeam::channel::Sender;

use super::config::DeviceId;
use super::device::{default_device, find_device, Direction};
use super::error::{DeviceError, DeviceResult};
use crate::types::StereoSample;

/// Running microphone capture. Drop to stop.
pub struct MicCapture {
    _stream: Stream,
    device_name: String,
    sample_rate: u32,
}

impl MicCapture {
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Open the capture device and start feeding `producer`
///
/// The device is opened at `sample_rate` so the mixer can add frames one to
/// one; a device that cannot run at that rate is an error.
pub fn start_mic_capture(
    device: Option<&DeviceId>,
    sample_rate: u32,
    producer: rtrb::Producer<StereoSample>,
    errors: Sender<DeviceError>,
) -> DeviceResult<MicCapture> {
    let device = match device {
        Some(id) => find_device(id, Direction::Input)?,
        None => default_device(Direction::Input)?,
    };
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    let supported = device
        .supported_input_configs()
        .map_err(|e| DeviceError::ConfigError(e.to_string()))?
        .filter(|c| sample_rate >= c.min_sample_rate().0 && sample_rate <= c.max_sample_rate().0)
        .min_by_key(|c| (format_rank(c.sample_format()), c.channels().abs_diff(2)))
        .ok_or_else(|| {
            DeviceError::ConfigError(format!("{} cannot capture at {} Hz", device_name, sample_rate))
        })?
        .with_sample_rate(cpal::SampleRate(sample_rate));

    let format = supported.sample_format();
    let config: StreamConfig = supported.into();
    log::info!(
        "Capturing microphone from {} ({} ch, {:?}, {} Hz)",
        device_name,
        config.channels,
        format,
        sample_rate
    );

    let stream = match format {
        SampleFormat::F32 => build_input_stream::<f32>(&device, &config, producer, errors),
        SampleFormat::I16 => build_input_stream::<i16>(&device, &config, producer, errors),
        SampleFormat::I32 => build_input_stream::<i32>(&device, &config, producer, errors),
        SampleFormat::U16 => build_input_stream::<u16>(&device, &config, producer, errors),
        other => Err(DeviceError::ConfigError(format!(
            "Unsupported capture sample format: {:?}",
            other
        ))),
    }?;

    stream
        .play()
        .map_err(|e| DeviceError::StreamPlayError(e.to_string()))?;

    Ok(MicCapture {
        _stream: stream,
        device_name,
        sample_rate,
    })
}

/// Preference order for capture formats
fn format_rank(format: SampleFormat) -> u8 {
    match format {
        SampleFormat::F32 => 0,
        SampleFormat::I32 => 1,
        SampleFormat::I16 => 2,
        SampleFormat::U16 => 3,
        _ => 4,
    }
}

fn build_input_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut producer: rtrb::Producer<StereoSample>,
    errors: Sender<DeviceError>,
) -> DeviceResult<Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels as usize;

    device
        .build_input_stream(
            config,
            move |data: &[T], _info: &cpal::InputCallbackInfo| {
                for frame in data.chunks_exact(channels) {
                    let left = f32::from_sample(frame[0]);
                    let right = if channels > 1 {
                        f32::from_sample(frame[1])
                    } else {
                        left
                    };
                    if producer.push(StereoSample::new(left, right)).is_err() {
                        break;
                    }
                }
            },
            move |err| {
                log::error!("Microphone stream error: {}", err);
                let _ = errors.try_send(DeviceError::StreamError(format!("microphone: {}", err)));
            },
            None,
        )
        .map_err(|e| DeviceError::StreamBuildError(e.to_string()))
}
