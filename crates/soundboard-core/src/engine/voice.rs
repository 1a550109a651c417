//! Playback voice - one playing instance of a sound
//!
//! A voice is a cursor into an immutable [`SoundAsset`](crate::decoder::SoundAsset)
//! plus a gain and a small state machine:
//!
//! ```text
//!   Playing ──pause──▶ Paused
//!      ▲                 │
//!      └─────resume──────┘
//!   Playing/Paused ──stop or end of sound──▶ Finished (terminal)
//! ```
//!
//! Voices live on the audio thread only. They never allocate: the asset is
//! reference counted and freed by the GC thread once the last voice lets go.

use crate::decoder::SharedAsset;
use crate::types::{AssetId, StereoSample, VoiceId, MAX_GAIN};

/// Lifecycle state of a voice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Playing,
    Paused,
    Finished,
}

/// How a new voice interacts with the voices already playing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Play alongside everything else, including earlier voices of the same sound
    #[default]
    Independent,
    /// Replace voices of the same sound
    ExclusivePerSound,
    /// Replace every active voice
    ExclusiveAll,
}

/// One active instance of a sound
pub struct Voice {
    id: VoiceId,
    asset: SharedAsset,
    /// Next frame to read
    position: usize,
    gain: f32,
    state: VoiceState,
    policy: OverlapPolicy,
}

impl Voice {
    /// Create a playing voice at the start of the sound
    ///
    /// A sound without frames produces a voice that is already finished.
    pub fn new(id: VoiceId, asset: SharedAsset, gain: f32, policy: OverlapPolicy) -> Self {
        let state = if asset.frame_count() == 0 {
            VoiceState::Finished
        } else {
            VoiceState::Playing
        };
        Self {
            id,
            asset,
            position: 0,
            gain: clamp_gain(gain),
            state,
            policy,
        }
    }

    #[inline]
    pub fn id(&self) -> VoiceId {
        self.id
    }

    #[inline]
    pub fn asset_id(&self) -> AssetId {
        self.asset.id
    }

    #[inline]
    pub fn state(&self) -> VoiceState {
        self.state
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    #[inline]
    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn policy(&self) -> OverlapPolicy {
        self.policy
    }

    pub fn is_playing(&self) -> bool {
        self.state == VoiceState::Playing
    }

    pub fn is_finished(&self) -> bool {
        self.state == VoiceState::Finished
    }

    /// Frames left until the end of the sound
    pub fn remaining(&self) -> usize {
        self.asset.frame_count().saturating_sub(self.position)
    }

    /// Fill `out` with the next frames of this voice, gain applied
    ///
    /// Always writes `out.len()` frames. Past the end of the sound the rest
    /// is silence and the voice becomes `Finished` in this same call. Paused
    /// and finished voices write silence and do not advance. Returns the
    /// number of sound frames consumed.
    pub fn advance(&mut self, out: &mut [StereoSample]) -> usize {
        if self.state != VoiceState::Playing {
            out.fill(StereoSample::silence());
            return 0;
        }

        let frames = self.asset.frames.as_slice();
        if self.position >= frames.len() {
            self.state = VoiceState::Finished;
            out.fill(StereoSample::silence());
            return 0;
        }

        let available = &frames[self.position..];
        let count = available.len().min(out.len());
        let gain = self.gain;
        for (dst, src) in out[..count].iter_mut().zip(&available[..count]) {
            *dst = *src * gain;
        }
        out[count..].fill(StereoSample::silence());

        self.position += count;
        if self.position >= frames.len() {
            self.state = VoiceState::Finished;
        }
        count
    }

    /// Freeze at the current position. No effect unless playing.
    pub fn pause(&mut self) {
        if self.state == VoiceState::Playing {
            self.state = VoiceState::Paused;
        }
    }

    /// Continue from the frozen position. No effect unless paused.
    pub fn resume(&mut self) {
        if self.state == VoiceState::Paused {
            self.state = VoiceState::Playing;
        }
    }

    pub fn toggle_pause(&mut self) {
        match self.state {
            VoiceState::Playing => self.state = VoiceState::Paused,
            VoiceState::Paused => self.state = VoiceState::Playing,
            VoiceState::Finished => {}
        }
    }

    pub fn stop(&mut self) {
        self.state = VoiceState::Finished;
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = clamp_gain(gain);
    }
}

/// Clamp a linear gain to `[0, MAX_GAIN]`, mapping NaN to silence
#[inline]
pub(crate) fn clamp_gain(gain: f32) -> f32 {
    if gain.is_nan() {
        0.0
    } else {
        gain.clamp(0.0, MAX_GAIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::SoundAsset;
    use crate::engine::gc_handle;
    use crate::types::StereoBuffer;
    use basedrop::Shared;

    fn ramp_asset(frames: usize) -> SharedAsset {
        let samples = (0..frames)
            .map(|i| StereoSample::mono(i as f32 / frames as f32))
            .collect();
        Shared::new(
            &gc_handle(),
            SoundAsset::from_frames(AssetId(1), "ramp", StereoBuffer::from_vec(samples), 48000),
        )
    }

    #[test]
    fn test_advance_applies_gain() {
        let mut voice = Voice::new(VoiceId(1), ramp_asset(100), 0.5, OverlapPolicy::Independent);
        let mut out = [StereoSample::silence(); 10];

        assert_eq!(voice.advance(&mut out), 10);
        assert_eq!(out[4], StereoSample::mono(0.04 * 0.5));
        assert_eq!(voice.position(), 10);
        assert!(voice.is_playing());
    }

    #[test]
    fn test_end_of_sound_pads_and_finishes() {
        let mut voice = Voice::new(VoiceId(1), ramp_asset(6), 1.0, OverlapPolicy::Independent);
        let mut out = [StereoSample::mono(9.0); 8];

        assert_eq!(voice.advance(&mut out), 6);
        assert_eq!(voice.state(), VoiceState::Finished);
        assert_eq!(out[6], StereoSample::silence());
        assert_eq!(out[7], StereoSample::silence());

        // Finished is terminal
        voice.resume();
        voice.toggle_pause();
        assert!(voice.is_finished());
        assert_eq!(voice.advance(&mut out), 0);
    }

    #[test]
    fn test_exact_end_finishes_in_same_call() {
        let mut voice = Voice::new(VoiceId(1), ramp_asset(8), 1.0, OverlapPolicy::Independent);
        let mut out = [StereoSample::silence(); 4];

        voice.advance(&mut out);
        assert!(voice.is_playing());
        voice.advance(&mut out);
        assert!(voice.is_finished());
        assert_eq!(voice.remaining(), 0);
    }

    #[test]
    fn test_pause_freezes_position() {
        let mut voice = Voice::new(VoiceId(1), ramp_asset(100), 1.0, OverlapPolicy::Independent);
        let mut out = [StereoSample::silence(); 16];

        voice.advance(&mut out);
        voice.pause();
        out.fill(StereoSample::mono(1.0));
        assert_eq!(voice.advance(&mut out), 0);
        assert!(out.iter().all(|s| *s == StereoSample::silence()));
        assert_eq!(voice.position(), 16);

        voice.resume();
        voice.advance(&mut out);
        assert_eq!(out[0], StereoSample::mono(0.16));
    }

    #[test]
    fn test_empty_asset_is_finished_immediately() {
        let mut voice = Voice::new(VoiceId(1), ramp_asset(0), 1.0, OverlapPolicy::Independent);
        let mut out = [StereoSample::mono(1.0); 4];

        assert!(voice.is_finished());
        assert_eq!(voice.advance(&mut out), 0);
        assert!(out.iter().all(|s| *s == StereoSample::silence()));
    }

    #[test]
    fn test_gain_is_clamped() {
        let mut voice = Voice::new(VoiceId(1), ramp_asset(10), 7.0, OverlapPolicy::Independent);
        assert_eq!(voice.gain(), MAX_GAIN);
        voice.set_gain(-1.0);
        assert_eq!(voice.gain(), 0.0);
        voice.set_gain(f32::NAN);
        assert_eq!(voice.gain(), 0.0);
    }
}
