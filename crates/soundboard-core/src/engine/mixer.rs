//! Voice pool and mixer - produces the virtual microphone signal
//!
//! The [`Mixer`] is owned by the audio callback. Every block it:
//! 1. applies queued commands (triggers, pause/stop, volumes)
//! 2. sums all playing voices, each with its own gain
//! 3. adds the real microphone unless it is muted or ducked
//! 4. applies master gain and clips to full scale
//! 5. removes voices that reached the end and reports them
//!
//! All buffers and the voice list are allocated up front; `process_block`
//! never allocates, locks or logs.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::clipper::OutputClipper;
use super::command::{
    command_channel, CommandReceiver, CommandSender, EngineCommand, VoiceSelector,
    COMMAND_QUEUE_CAPACITY,
};
use super::events::{
    status_channel, EngineEvent, FinishReason, StatusOutbox, StatusReceiver,
    STATUS_QUEUE_CAPACITY,
};
use super::voice::{clamp_gain, OverlapPolicy, Voice};
use crate::types::{StereoBuffer, StereoSample, MAX_BLOCK_FRAMES};

/// Default number of simultaneous voices
pub const DEFAULT_MAX_VOICES: usize = 32;

/// Size of the microphone ring between the capture stream and the mixer
pub const MIC_RING_FRAMES: usize = MAX_BLOCK_FRAMES * 2;

/// Microphone frames allowed to queue up beyond one block before the oldest
/// are skipped
const MAX_MIC_LAG_FRAMES: usize = 2048;

/// Mixer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerSettings {
    /// Upper bound on simultaneously active voices
    pub max_voices: usize,
    /// Linear gain applied to the whole mix, `0.0..=2.0`
    pub master_volume: f32,
    /// Silence the real microphone while any sound is playing
    pub mute_mic_while_playing: bool,
    /// Start with the real microphone muted
    pub mic_muted: bool,
    pub command_queue_capacity: usize,
    pub status_queue_capacity: usize,
}

impl Default for MixerSettings {
    fn default() -> Self {
        Self {
            max_voices: DEFAULT_MAX_VOICES,
            master_volume: 1.0,
            mute_mic_while_playing: true,
            mic_muted: false,
            command_queue_capacity: COMMAND_QUEUE_CAPACITY,
            status_queue_capacity: STATUS_QUEUE_CAPACITY,
        }
    }
}

/// Lock-free mixer state for the UI
///
/// Written by the audio thread once per block, read from anywhere.
#[derive(Debug)]
pub struct MixerAtomics {
    active_voices: AtomicUsize,
    /// Peak of the last block after clipping, as `f32` bits
    peak: AtomicU32,
    /// Whether the microphone was gated in the last block
    mic_gated: AtomicBool,
    blocks_processed: AtomicU64,
    clip: Arc<AtomicBool>,
    dropped_events: Arc<AtomicU64>,
}

impl MixerAtomics {
    fn new() -> Self {
        Self {
            active_voices: AtomicUsize::new(0),
            peak: AtomicU32::new(0.0f32.to_bits()),
            mic_gated: AtomicBool::new(false),
            blocks_processed: AtomicU64::new(0),
            clip: Arc::new(AtomicBool::new(false)),
            dropped_events: Arc::new(AtomicU64::new(0)),
        }
    }

    #[inline]
    pub fn active_voices(&self) -> usize {
        self.active_voices.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn peak(&self) -> f32 {
        f32::from_bits(self.peak.load(Ordering::Relaxed))
    }

    pub fn mic_gated(&self) -> bool {
        self.mic_gated.load(Ordering::Relaxed)
    }

    pub fn blocks_processed(&self) -> u64 {
        self.blocks_processed.load(Ordering::Relaxed)
    }

    /// Read and clear the clip indicator
    pub fn take_clip(&self) -> bool {
        self.clip.swap(false, Ordering::Relaxed)
    }

    /// Status events lost because the control side did not poll
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }
}

/// Ring buffer carrying microphone frames into the mixer
pub fn mic_ring() -> (rtrb::Producer<StereoSample>, rtrb::Consumer<StereoSample>) {
    rtrb::RingBuffer::new(MIC_RING_FRAMES)
}

/// Live voices plus the outbox their lifecycle events go to
struct VoicePool {
    voices: Vec<Voice>,
    max_voices: usize,
    outbox: StatusOutbox,
}

/// The audio-thread side of the engine
pub struct Mixer {
    pool: VoicePool,
    master_gain: f32,
    mic_muted: bool,
    mute_mic_while_playing: bool,

    /// Mix accumulator, also the output of `process_block`
    accum: StereoBuffer,
    /// Per-voice render target
    scratch: StereoBuffer,
    mic_input: Option<rtrb::Consumer<StereoSample>>,

    clipper: OutputClipper,
    commands: CommandReceiver,
    atomics: Arc<MixerAtomics>,
    sample_rate: u32,
}

impl Mixer {
    /// Create a mixer with its command sender and status receiver
    pub fn new(settings: &MixerSettings, sample_rate: u32) -> (Self, CommandSender, StatusReceiver) {
        let atomics = Arc::new(MixerAtomics::new());
        let (sender, commands) = command_channel(settings.command_queue_capacity);
        let (outbox, status) =
            status_channel(settings.status_queue_capacity, Arc::clone(&atomics.dropped_events));
        let max_voices = settings.max_voices.max(1);

        let mixer = Self {
            pool: VoicePool {
                voices: Vec::with_capacity(max_voices),
                max_voices,
                outbox,
            },
            master_gain: clamp_gain(settings.master_volume),
            mic_muted: settings.mic_muted,
            mute_mic_while_playing: settings.mute_mic_while_playing,
            accum: StereoBuffer::with_capacity(MAX_BLOCK_FRAMES),
            scratch: StereoBuffer::with_capacity(MAX_BLOCK_FRAMES),
            mic_input: None,
            clipper: OutputClipper::with_indicator(Arc::clone(&atomics.clip)),
            commands,
            atomics,
            sample_rate,
        };
        (mixer, sender, status)
    }

    /// Feed the real microphone into the mix
    pub fn attach_mic(&mut self, input: rtrb::Consumer<StereoSample>) {
        self.mic_input = Some(input);
    }

    pub fn has_mic(&self) -> bool {
        self.mic_input.is_some()
    }

    pub fn atomics(&self) -> Arc<MixerAtomics> {
        Arc::clone(&self.atomics)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn voices(&self) -> &[Voice] {
        &self.pool.voices
    }

    pub fn master_gain(&self) -> f32 {
        self.master_gain
    }

    pub fn mic_muted(&self) -> bool {
        self.mic_muted
    }

    pub fn mute_mic_while_playing(&self) -> bool {
        self.mute_mic_while_playing
    }

    /// Produce the next block of the virtual microphone signal
    ///
    /// `frames` is clamped to `MAX_BLOCK_FRAMES`; the returned slice has the
    /// clamped length. Real-time safe.
    pub fn process_block(&mut self, frames: usize) -> &[StereoSample] {
        self.pool.outbox.flush();
        self.apply_commands();

        let frames = self.accum.set_len_from_capacity(frames.min(MAX_BLOCK_FRAMES));
        self.scratch.set_len_from_capacity(frames);
        self.accum.fill_silence();

        let any_playing = self.pool.voices.iter().any(Voice::is_playing);
        for voice in self.pool.voices.iter_mut().filter(|v| v.is_playing()) {
            voice.advance(self.scratch.as_mut_slice());
            self.accum.add_slice(self.scratch.as_slice());
        }

        let mic_gated = self.mic_muted || (self.mute_mic_while_playing && any_playing);
        self.mix_mic(frames, mic_gated);

        if self.master_gain != 1.0 {
            self.accum.scale(self.master_gain);
        }
        self.clipper.process(self.accum.as_mut_slice());

        self.pool.reclaim_finished();

        self.atomics.active_voices.store(self.pool.voices.len(), Ordering::Relaxed);
        self.atomics.peak.store(self.accum.peak().to_bits(), Ordering::Relaxed);
        self.atomics.mic_gated.store(mic_gated, Ordering::Relaxed);
        self.atomics.blocks_processed.fetch_add(1, Ordering::Relaxed);

        self.accum.as_slice()
    }

    /// Apply every pending command in push order
    fn apply_commands(&mut self) {
        for cmd in self.commands.drain() {
            match cmd {
                EngineCommand::SetMasterVolume(gain) => self.master_gain = clamp_gain(gain),
                EngineCommand::SetMicMute(muted) => self.mic_muted = muted,
                EngineCommand::SetMuteMicWhilePlaying(enabled) => {
                    self.mute_mic_while_playing = enabled
                }
                cmd => self.pool.apply(cmd),
            }
        }
    }

    /// Add queued microphone frames to the mix
    ///
    /// A gated microphone is still read so that its latency does not grow.
    fn mix_mic(&mut self, frames: usize, gated: bool) {
        let Some(mic) = self.mic_input.as_mut() else {
            return;
        };

        let queued = mic.slots();
        if queued > frames + MAX_MIC_LAG_FRAMES {
            if let Ok(stale) = mic.read_chunk(queued - frames - MAX_MIC_LAG_FRAMES) {
                stale.commit_all();
            }
        }

        let take = mic.slots().min(frames);
        if let Ok(chunk) = mic.read_chunk(take) {
            if !gated {
                let (first, second) = chunk.as_slices();
                let out = self.accum.as_mut_slice();
                for (dst, src) in out.iter_mut().zip(first.iter().chain(second.iter())) {
                    *dst += *src;
                }
            }
            chunk.commit_all();
        }
    }
}

impl VoicePool {
    fn apply(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::Trigger {
                voice,
                asset,
                gain,
                policy,
            } => {
                match policy {
                    OverlapPolicy::Independent => {}
                    OverlapPolicy::ExclusivePerSound => {
                        self.remove_voices(VoiceSelector::Asset(asset.id), FinishReason::Replaced)
                    }
                    OverlapPolicy::ExclusiveAll => {
                        self.remove_voices(VoiceSelector::All, FinishReason::Replaced)
                    }
                }
                if self.voices.len() >= self.max_voices {
                    self.outbox.push(EngineEvent::CapacityExceeded {
                        voice,
                        asset: asset.id,
                    });
                    return;
                }
                self.voices.push(Voice::new(voice, asset, gain, policy));
            }
            EngineCommand::Pause(selector) => self.for_selected(selector, Voice::pause),
            EngineCommand::Resume(selector) => self.for_selected(selector, Voice::resume),
            EngineCommand::TogglePause(selector) => self.for_selected(selector, Voice::toggle_pause),
            EngineCommand::Stop(selector) => self.remove_voices(selector, FinishReason::Stopped),
            EngineCommand::SetVolume { selector, gain } => {
                self.for_selected(selector, |v| v.set_gain(gain))
            }
            // Mixer-wide settings are handled by the mixer itself
            EngineCommand::SetMasterVolume(_)
            | EngineCommand::SetMicMute(_)
            | EngineCommand::SetMuteMicWhilePlaying(_) => {}
        }
    }

    fn for_selected(&mut self, selector: VoiceSelector, mut f: impl FnMut(&mut Voice)) {
        for voice in self.voices.iter_mut().filter(|v| selects(selector, v)) {
            f(voice);
        }
    }

    /// Remove selected voices right away, keeping the order of the rest
    fn remove_voices(&mut self, selector: VoiceSelector, reason: FinishReason) {
        let outbox = &mut self.outbox;
        self.voices.retain(|v| {
            if !selects(selector, v) {
                return true;
            }
            outbox.push(EngineEvent::VoiceFinished {
                voice: v.id(),
                asset: v.asset_id(),
                reason,
            });
            false
        });
    }

    fn reclaim_finished(&mut self) {
        let outbox = &mut self.outbox;
        self.voices.retain(|v| {
            if !v.is_finished() {
                return true;
            }
            outbox.push(EngineEvent::VoiceFinished {
                voice: v.id(),
                asset: v.asset_id(),
                reason: FinishReason::Completed,
            });
            false
        });
    }
}

#[inline]
fn selects(selector: VoiceSelector, voice: &Voice) -> bool {
    match selector {
        VoiceSelector::Voice(id) => voice.id() == id,
        VoiceSelector::Asset(id) => voice.asset_id() == id,
        VoiceSelector::All => true,
    }
}
