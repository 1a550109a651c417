//! Common types for the soundboard engine
//!
//! Fundamental audio types shared by the decoder, the voices and the mixer:
//! stereo samples, pre-allocatable stereo buffers and the id newtypes used to
//! address sounds and voices from the control side.

use std::ops::{Index, IndexMut};

/// Internal engine sample rate (48kHz)
///
/// Decoded sounds are converted to the rate the audio device actually runs at;
/// this is the preferred rate requested from the device and the virtual sink.
pub const SAMPLE_RATE: u32 = 48000;

/// Internal channel count (interleaved stereo)
pub const CHANNELS: u16 = 2;

/// Maximum frames processed in one mixer block
///
/// Covers all common device configurations (64 .. 4096). Mixer buffers are
/// pre-allocated to this size so the audio callback never allocates; larger
/// device buffers are processed in several blocks.
pub const MAX_BLOCK_FRAMES: usize = 8192;

/// Upper bound for per-voice and master gain (+6 dB)
pub const MAX_GAIN: f32 = 2.0;

/// Audio sample type (32-bit float throughout the engine)
pub type Sample = f32;

/// A single stereo sample (left and right channels)
///
/// Uses `#[repr(C)]` to ensure predictable memory layout: [left, right].
/// This enables zero-copy conversion between `&[StereoSample]` and `&[f32]`
/// (interleaved format) using bytemuck.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    /// Create a new stereo sample
    #[inline]
    pub fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    /// Create a silent stereo sample
    #[inline]
    pub fn silence() -> Self {
        Self::default()
    }

    /// Create a mono sample (same value in both channels)
    #[inline]
    pub fn mono(value: Sample) -> Self {
        Self { left: value, right: value }
    }

    /// Get the peak amplitude (max of abs(left), abs(right))
    #[inline]
    pub fn peak(&self) -> Sample {
        self.left.abs().max(self.right.abs())
    }
}

impl std::ops::Add for StereoSample {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self {
            left: self.left + other.left,
            right: self.right + other.right,
        }
    }
}

impl std::ops::AddAssign for StereoSample {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.left += other.left;
        self.right += other.right;
    }
}

impl std::ops::Mul<Sample> for StereoSample {
    type Output = Self;

    #[inline]
    fn mul(self, factor: Sample) -> Self {
        Self {
            left: self.left * factor,
            right: self.right * factor,
        }
    }
}

impl std::ops::MulAssign<Sample> for StereoSample {
    #[inline]
    fn mul_assign(&mut self, factor: Sample) {
        self.left *= factor;
        self.right *= factor;
    }
}

/// A buffer of stereo samples
///
/// Used both for decoded sound data (fixed length, read-only once built) and
/// for the mixer's pre-allocated work buffers (working length changed with
/// [`set_len_from_capacity`](Self::set_len_from_capacity)).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StereoBuffer {
    samples: Vec<StereoSample>,
}

impl StereoBuffer {
    /// Create a new empty buffer with the specified capacity (in stereo samples)
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    /// Create a buffer filled with silence
    pub fn silence(len: usize) -> Self {
        Self {
            samples: vec![StereoSample::silence(); len],
        }
    }

    /// Create a buffer from interleaved samples [L, R, L, R, ...]
    ///
    /// A trailing odd sample is ignored.
    pub fn from_interleaved(interleaved: &[Sample]) -> Self {
        let samples = interleaved
            .chunks_exact(2)
            .map(|chunk| StereoSample::new(chunk[0], chunk[1]))
            .collect();
        Self { samples }
    }

    /// Create a buffer from an existing Vec of StereoSamples
    pub fn from_vec(samples: Vec<StereoSample>) -> Self {
        Self { samples }
    }

    /// Get the number of stereo samples in the buffer
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the buffer is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Allocated capacity in stereo samples
    #[inline]
    pub fn capacity(&self) -> usize {
        self.samples.capacity()
    }

    /// Set the working length of a pre-allocated buffer (real-time safe)
    ///
    /// The length is clamped to the allocated capacity so this never
    /// allocates. Newly exposed elements are silence. Returns the new length.
    #[inline]
    pub fn set_len_from_capacity(&mut self, new_len: usize) -> usize {
        let new_len = new_len.min(self.samples.capacity());
        if new_len > self.samples.len() {
            self.samples.resize(new_len, StereoSample::silence());
        } else {
            self.samples.truncate(new_len);
        }
        new_len
    }

    /// Fill the buffer with silence
    pub fn fill_silence(&mut self) {
        self.samples.fill(StereoSample::silence());
    }

    /// Get a slice of the samples
    #[inline]
    pub fn as_slice(&self) -> &[StereoSample] {
        &self.samples
    }

    /// Get a mutable slice of the samples
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [StereoSample] {
        &mut self.samples
    }

    /// Zero-copy view of samples as interleaved f32 [L, R, L, R, ...]
    #[inline]
    pub fn as_interleaved(&self) -> &[Sample] {
        bytemuck::cast_slice(&self.samples)
    }

    /// Add another slice of samples to this buffer, sample by sample
    ///
    /// Only the overlapping prefix is summed.
    pub fn add_slice(&mut self, other: &[StereoSample]) {
        for (dst, src) in self.samples.iter_mut().zip(other.iter()) {
            *dst += *src;
        }
    }

    /// Scale all samples by a factor
    pub fn scale(&mut self, factor: Sample) {
        for sample in &mut self.samples {
            *sample *= factor;
        }
    }

    /// Get an iterator over the samples
    pub fn iter(&self) -> impl Iterator<Item = &StereoSample> {
        self.samples.iter()
    }

    /// Get a mutable iterator over the samples
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut StereoSample> {
        self.samples.iter_mut()
    }

    /// Get the peak amplitude in the buffer
    pub fn peak(&self) -> Sample {
        self.samples.iter().map(|s| s.peak()).fold(0.0, Sample::max)
    }
}

impl Index<usize> for StereoBuffer {
    type Output = StereoSample;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.samples[index]
    }
}

impl IndexMut<usize> for StereoBuffer {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.samples[index]
    }
}

/// Identifier of a decoded sound in the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId(pub u64);

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sound#{}", self.0)
    }
}

/// Handle of one playing instance of a sound
///
/// Allocated by the control side when a trigger is sent, so the caller can
/// address the voice before the audio thread has even created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(pub u64);

impl std::fmt::Display for VoiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "voice#{}", self.0)
    }
}

/// Convert a frame count to seconds at the given sample rate
#[inline]
pub fn frames_to_secs(frames: usize, sample_rate: u32) -> f64 {
    frames as f64 / sample_rate as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stereo_sample_operations() {
        let a = StereoSample::new(1.0, 2.0);
        let b = StereoSample::new(0.5, 0.5);

        let sum = a + b;
        assert_eq!(sum.left, 1.5);
        assert_eq!(sum.right, 2.5);

        let scaled = a * 0.5;
        assert_eq!(scaled.left, 0.5);
        assert_eq!(scaled.right, 1.0);
    }

    #[test]
    fn test_stereo_buffer_from_interleaved() {
        let buffer = StereoBuffer::from_interleaved(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer[0], StereoSample::new(1.0, 2.0));
        assert_eq!(buffer[2], StereoSample::new(5.0, 6.0));
        assert_eq!(buffer.as_interleaved(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_set_len_never_exceeds_capacity() {
        let mut buffer = StereoBuffer::with_capacity(16);
        let cap = buffer.capacity();

        assert_eq!(buffer.set_len_from_capacity(8), 8);
        assert!(buffer.iter().all(|s| *s == StereoSample::silence()));

        // Asking for more than was allocated clamps instead of growing
        assert_eq!(buffer.set_len_from_capacity(cap + 100), cap);
        assert_eq!(buffer.capacity(), cap);

        assert_eq!(buffer.set_len_from_capacity(4), 4);
    }

    #[test]
    fn test_add_slice_sums_overlap() {
        let mut buffer = StereoBuffer::from_vec(vec![StereoSample::mono(0.25); 3]);
        buffer.add_slice(&[StereoSample::mono(0.5); 2]);

        assert_eq!(buffer[0], StereoSample::mono(0.75));
        assert_eq!(buffer[1], StereoSample::mono(0.75));
        assert_eq!(buffer[2], StereoSample::mono(0.25));
        assert_eq!(buffer.peak(), 0.75);
    }
}
