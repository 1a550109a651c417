//! Lock-free command queue from the control side to the audio thread
//!
//! Hotkeys and UI actions become [`EngineCommand`]s pushed into a bounded
//! `rtrb` ring buffer. The mixer drains the queue at the start of every block,
//! so a command takes effect at the next block boundary and never mid-block.
//!
//! Pushing never blocks. When the ring is full a push fails and the caller
//! decides what to do, with one exception: volume changes are coalesced in a
//! small pending list (latest value per target wins) and retried before the
//! next command, so a fader dragged during a burst still lands on its final
//! value.
//!
//! ```ignore
//! let (mut commands, receiver) = command_channel(COMMAND_QUEUE_CAPACITY);
//!
//! // Control thread
//! let voice = commands.trigger(&airhorn, 1.0, OverlapPolicy::ExclusivePerSound)?;
//! commands.pause(VoiceSelector::Voice(voice))?;
//!
//! // Audio thread
//! for cmd in receiver.drain() { /* apply */ }
//! ```

use thiserror::Error;

use super::voice::OverlapPolicy;
use crate::decoder::SharedAsset;
use crate::types::{AssetId, VoiceId};

/// Default capacity of the command ring buffer
pub const COMMAND_QUEUE_CAPACITY: usize = 256;

/// Maximum number of volume changes held back while the queue is full
const MAX_PENDING_VOLUMES: usize = 16;

/// Which voices a command applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoiceSelector {
    /// A single voice
    Voice(VoiceId),
    /// Every voice playing the given sound
    Asset(AssetId),
    /// Every active voice
    All,
}

/// Commands sent from the control side to the audio thread
///
/// Each command is applied exactly once, in push order, at a block boundary.
pub enum EngineCommand {
    /// Start a new voice
    ///
    /// The voice id is allocated by the sender so the caller can address the
    /// voice right away.
    Trigger {
        voice: VoiceId,
        asset: SharedAsset,
        gain: f32,
        policy: OverlapPolicy,
    },
    Pause(VoiceSelector),
    Resume(VoiceSelector),
    TogglePause(VoiceSelector),
    /// Stop and remove the selected voices
    Stop(VoiceSelector),
    /// Set per-voice gain (linear, clamped to `[0, MAX_GAIN]`)
    SetVolume { selector: VoiceSelector, gain: f32 },
    /// Set the gain applied to the whole mix (linear, clamped to `[0, MAX_GAIN]`)
    SetMasterVolume(f32),
    /// Mute or unmute the real microphone in the mix
    SetMicMute(bool),
    /// Duck the real microphone while any sound is playing
    SetMuteMicWhilePlaying(bool),
}

impl std::fmt::Debug for EngineCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineCommand::Trigger {
                voice,
                asset,
                gain,
                policy,
            } => f
                .debug_struct("Trigger")
                .field("voice", voice)
                .field("asset", &asset.id)
                .field("gain", gain)
                .field("policy", policy)
                .finish(),
            EngineCommand::Pause(sel) => f.debug_tuple("Pause").field(sel).finish(),
            EngineCommand::Resume(sel) => f.debug_tuple("Resume").field(sel).finish(),
            EngineCommand::TogglePause(sel) => f.debug_tuple("TogglePause").field(sel).finish(),
            EngineCommand::Stop(sel) => f.debug_tuple("Stop").field(sel).finish(),
            EngineCommand::SetVolume { selector, gain } => f
                .debug_struct("SetVolume")
                .field("selector", selector)
                .field("gain", gain)
                .finish(),
            EngineCommand::SetMasterVolume(gain) => {
                f.debug_tuple("SetMasterVolume").field(gain).finish()
            }
            EngineCommand::SetMicMute(muted) => f.debug_tuple("SetMicMute").field(muted).finish(),
            EngineCommand::SetMuteMicWhilePlaying(enabled) => {
                f.debug_tuple("SetMuteMicWhilePlaying").field(enabled).finish()
            }
        }
    }
}

/// The command ring buffer was full
///
/// Carries the rejected command back so the caller can retry or drop it.
#[derive(Error, Debug)]
#[error("Command queue is full, dropped {0:?}")]
pub struct QueueFull(pub EngineCommand);

/// Target of a coalescable volume command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VolumeTarget {
    Voice(VoiceSelector),
    Master,
}

/// Control-side end of the command queue
pub struct CommandSender {
    producer: rtrb::Producer<EngineCommand>,
    next_voice_id: u64,
    /// Volume changes that did not fit, oldest first
    pending_volumes: Vec<(VolumeTarget, f32)>,
}

/// Audio-side end of the command queue
pub struct CommandReceiver {
    consumer: rtrb::Consumer<EngineCommand>,
}

/// Create a bounded command queue
pub fn command_channel(capacity: usize) -> (CommandSender, CommandReceiver) {
    let (producer, consumer) = rtrb::RingBuffer::new(capacity.max(1));
    (
        CommandSender {
            producer,
            next_voice_id: 1,
            pending_volumes: Vec::with_capacity(MAX_PENDING_VOLUMES),
        },
        CommandReceiver { consumer },
    )
}

impl CommandSender {
    /// Push a command. Returns `false` if the queue was full.
    pub fn push(&mut self, cmd: EngineCommand) -> bool {
        self.send(cmd).is_ok()
    }

    /// Push a command, handing it back if the queue is full
    ///
    /// Held-back volume changes are flushed first so commands stay in order.
    /// A full queue while volume changes are still pending rejects the command.
    pub fn send(&mut self, cmd: EngineCommand) -> Result<(), QueueFull> {
        if !self.flush_pending() {
            return Err(QueueFull(cmd));
        }
        self.producer.push(cmd).map_err(|err| match err {
            rtrb::PushError::Full(cmd) => QueueFull(cmd),
        })
    }

    /// Retry held-back volume changes. Returns `true` when none are left.
    pub fn flush_pending(&mut self) -> bool {
        while let Some(&(target, gain)) = self.pending_volumes.first() {
            let cmd = match target {
                VolumeTarget::Voice(selector) => EngineCommand::SetVolume { selector, gain },
                VolumeTarget::Master => EngineCommand::SetMasterVolume(gain),
            };
            if self.producer.push(cmd).is_err() {
                return false;
            }
            self.pending_volumes.remove(0);
        }
        true
    }

    /// Number of volume changes waiting for queue space
    pub fn pending_len(&self) -> usize {
        self.pending_volumes.len()
    }

    /// Free slots in the ring buffer
    pub fn slots(&self) -> usize {
        self.producer.slots()
    }

    /// Start a new voice of `asset`
    ///
    /// Returns the id the voice will have once the audio thread creates it.
    /// The id is used up even when the queue is full, so a trigger handed
    /// back in [`QueueFull`] can be pushed again later without clashing.
    pub fn trigger(
        &mut self,
        asset: &SharedAsset,
        gain: f32,
        policy: OverlapPolicy,
    ) -> Result<VoiceId, QueueFull> {
        let voice = VoiceId(self.next_voice_id);
        self.next_voice_id += 1;
        self.send(EngineCommand::Trigger {
            voice,
            asset: asset.clone(),
            gain,
            policy,
        })?;
        Ok(voice)
    }

    pub fn pause(&mut self, selector: VoiceSelector) -> Result<(), QueueFull> {
        self.send(EngineCommand::Pause(selector))
    }

    pub fn resume(&mut self, selector: VoiceSelector) -> Result<(), QueueFull> {
        self.send(EngineCommand::Resume(selector))
    }

    pub fn toggle_pause(&mut self, selector: VoiceSelector) -> Result<(), QueueFull> {
        self.send(EngineCommand::TogglePause(selector))
    }

    pub fn stop(&mut self, selector: VoiceSelector) -> Result<(), QueueFull> {
        self.send(EngineCommand::Stop(selector))
    }

    pub fn stop_all(&mut self) -> Result<(), QueueFull> {
        self.stop(VoiceSelector::All)
    }

    /// Set per-voice gain. Coalesced instead of failing when the queue is full.
    pub fn set_volume(&mut self, selector: VoiceSelector, gain: f32) {
        self.send_volume(VolumeTarget::Voice(selector), gain);
    }

    /// Set the master gain. Coalesced instead of failing when the queue is full.
    pub fn set_master_volume(&mut self, gain: f32) {
        self.send_volume(VolumeTarget::Master, gain);
    }

    pub fn set_mic_mute(&mut self, muted: bool) -> Result<(), QueueFull> {
        self.send(EngineCommand::SetMicMute(muted))
    }

    pub fn set_mute_mic_while_playing(&mut self, enabled: bool) -> Result<(), QueueFull> {
        self.send(EngineCommand::SetMuteMicWhilePlaying(enabled))
    }

    fn send_volume(&mut self, target: VolumeTarget, gain: f32) {
        let cmd = match target {
            VolumeTarget::Voice(selector) => EngineCommand::SetVolume { selector, gain },
            VolumeTarget::Master => EngineCommand::SetMasterVolume(gain),
        };
        if self.send(cmd).is_ok() {
            return;
        }

        // Latest value wins; the target moves to the back to keep change order
        self.pending_volumes.retain(|(t, _)| *t != target);
        if self.pending_volumes.len() >= MAX_PENDING_VOLUMES {
            let (dropped, _) = self.pending_volumes.remove(0);
            log::warn!("Command queue saturated, dropping volume change for {:?}", dropped);
        }
        self.pending_volumes.push((target, gain));
    }
}

impl CommandReceiver {
    /// Pop every queued command in push order
    ///
    /// Real-time safe: no allocation, no locking.
    pub fn drain(&mut self) -> impl Iterator<Item = EngineCommand> + '_ {
        std::iter::from_fn(move || self.consumer.pop().ok())
    }

    pub fn is_empty(&self) -> bool {
        self.consumer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_arrive_in_order() {
        let (mut tx, mut rx) = command_channel(8);
        tx.pause(VoiceSelector::All).unwrap();
        tx.set_mic_mute(true).unwrap();
        tx.stop(VoiceSelector::Voice(VoiceId(3))).unwrap();

        let received: Vec<_> = rx.drain().collect();
        assert_eq!(received.len(), 3);
        assert!(matches!(received[0], EngineCommand::Pause(VoiceSelector::All)));
        assert!(matches!(received[1], EngineCommand::SetMicMute(true)));
        assert!(matches!(
            received[2],
            EngineCommand::Stop(VoiceSelector::Voice(VoiceId(3)))
        ));
        assert!(rx.is_empty());
    }

    #[test]
    fn test_full_queue_returns_command() {
        let (mut tx, _rx) = command_channel(1);
        tx.set_mic_mute(true).unwrap();

        let err = tx.set_mic_mute(false).unwrap_err();
        assert!(matches!(err.0, EngineCommand::SetMicMute(false)));
        assert!(!tx.push(EngineCommand::Stop(VoiceSelector::All)));
    }

    #[test]
    fn test_volume_coalesces_when_full() {
        let (mut tx, mut rx) = command_channel(1);
        tx.set_mic_mute(true).unwrap();

        // Queue full: only the last master value and voice value are kept
        tx.set_master_volume(0.2);
        tx.set_master_volume(0.4);
        tx.set_volume(VoiceSelector::Voice(VoiceId(1)), 0.9);
        tx.set_master_volume(0.6);
        assert_eq!(tx.pending_len(), 2);

        assert_eq!(rx.drain().count(), 1);
        // One slot free: the voice volume goes out, master still waits
        assert!(!tx.flush_pending());
        assert_eq!(tx.pending_len(), 1);

        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.extend(rx.drain().map(|c| format!("{:?}", c)));
            tx.flush_pending();
        }
        assert_eq!(tx.pending_len(), 0);
        assert_eq!(
            seen,
            vec![
                "SetVolume { selector: Voice(VoiceId(1)), gain: 0.9 }".to_string(),
                "SetMasterVolume(0.6)".to_string(),
            ]
        );
    }

    #[test]
    fn test_pending_volumes_go_before_new_commands() {
        let (mut tx, mut rx) = command_channel(1);
        tx.set_mic_mute(true).unwrap();
        tx.set_master_volume(0.5);

        rx.drain().for_each(drop);
        // The stop must wait until the volume change is out
        assert!(tx.stop_all().is_err());
        assert!(matches!(
            rx.drain().next(),
            Some(EngineCommand::SetMasterVolume(v)) if v == 0.5
        ));
        tx.stop_all().unwrap();
        assert!(matches!(rx.drain().next(), Some(EngineCommand::Stop(VoiceSelector::All))));
    }

    #[test]
    fn test_command_size() {
        // Commands are moved through the ring by value; keep them small
        let size = std::mem::size_of::<EngineCommand>();
        assert!(size <= 32, "EngineCommand is {} bytes, expected <= 32", size);
    }
}
