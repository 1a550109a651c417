//! Real-time engine - voices, mixer, command and status queues
//!
//! This module contains everything that runs on or talks to the audio thread:
//! - Voice: one playing instance of a decoded sound
//! - Mixer: owns the voices, sums them with the microphone, clips
//! - Command queue: control side to audio thread, lock-free
//! - Status queue: audio thread to control side, lock-free
//! - GC: deferred freeing of sounds dropped on the audio thread

mod clipper;
mod command;
mod events;
mod gc;
mod mixer;
mod voice;

pub use clipper::*;
pub use command::*;
pub use events::*;
pub use gc::gc_handle;
pub use mixer::*;
pub use voice::{OverlapPolicy, Voice, VoiceState};
