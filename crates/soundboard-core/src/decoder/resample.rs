//! Offline sample-rate conversion of decoded sounds
//!
//! Sounds are converted once at load time, never on the audio thread, so a
//! high-quality sinc resampler is affordable. The output length is exact:
//! `ceil(frames * to / from)`. `SincFixedIn` already lines its output up with
//! the input, so nothing is cut from the front; the tail is flushed until the
//! sound has its full duration.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use super::{DecodeError, DecodeResult};
use crate::types::{StereoBuffer, StereoSample};

/// Input frames fed to the resampler per call
const RESAMPLE_CHUNK: usize = 1024;

/// Upper bound on zero-input flush calls when draining the tail
const MAX_FLUSH_CALLS: usize = 16;

/// Number of frames a sound has after conversion from `from_rate` to `to_rate`
pub fn expected_output_frames(input_frames: usize, from_rate: u32, to_rate: u32) -> usize {
    if from_rate == to_rate || from_rate == 0 {
        return input_frames;
    }
    let scaled = input_frames as u128 * to_rate as u128;
    scaled.div_ceil(from_rate as u128) as usize
}

/// Convert a stereo buffer between sample rates
///
/// Equal rates return an identical copy without touching the resampler.
pub fn resample_stereo(
    input: &StereoBuffer,
    from_rate: u32,
    to_rate: u32,
) -> DecodeResult<StereoBuffer> {
    if from_rate == 0 || to_rate == 0 {
        return Err(DecodeError::Resample(format!(
            "invalid sample rate conversion {} -> {}",
            from_rate, to_rate
        )));
    }
    if from_rate == to_rate || input.is_empty() {
        return Ok(input.clone());
    }

    let expected = expected_output_frames(input.len(), from_rate, to_rate);
    let left: Vec<f32> = input.iter().map(|s| s.left).collect();
    let right: Vec<f32> = input.iter().map(|s| s.right).collect();

    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let ratio = to_rate as f64 / from_rate as f64;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, RESAMPLE_CHUNK, 2)
        .map_err(|e| DecodeError::Resample(e.to_string()))?;

    let wanted = expected;
    let mut out_left: Vec<f32> = Vec::with_capacity(wanted + resampler.output_frames_max());
    let mut out_right: Vec<f32> = Vec::with_capacity(wanted + resampler.output_frames_max());

    let mut pos = 0;
    while pos < left.len() && out_left.len() < wanted {
        let end = (pos + RESAMPLE_CHUNK).min(left.len());
        let block: [&[f32]; 2] = [&left[pos..end], &right[pos..end]];
        let produced = if end - pos == RESAMPLE_CHUNK {
            resampler.process(&block[..], None)
        } else {
            resampler.process_partial(Some(&block[..]), None)
        }
        .map_err(|e| DecodeError::Resample(e.to_string()))?;

        out_left.extend_from_slice(&produced[0]);
        out_right.extend_from_slice(&produced[1]);
        pos = end;
    }

    // Drain what is still inside the filter
    let mut flushes = 0;
    while out_left.len() < wanted && flushes < MAX_FLUSH_CALLS {
        let produced = resampler
            .process_partial(None::<&[&[f32]]>, None)
            .map_err(|e| DecodeError::Resample(e.to_string()))?;
        if produced[0].is_empty() {
            break;
        }
        out_left.extend_from_slice(&produced[0]);
        out_right.extend_from_slice(&produced[1]);
        flushes += 1;
    }

    let frames = (0..wanted)
        .map(|i| {
            StereoSample::new(
                out_left.get(i).copied().unwrap_or(0.0),
                out_right.get(i).copied().unwrap_or(0.0),
            )
        })
        .collect();

    Ok(StereoBuffer::from_vec(frames))
}
