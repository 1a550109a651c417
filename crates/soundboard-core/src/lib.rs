//! Soundboard Core - real-time mixing engine behind a virtual microphone
//!
//! Sounds are decoded once into memory ([`decoder`]), triggered from any
//! control thread through a lock-free command queue and mixed by the audio
//! thread ([`engine`]) into a virtual sink that other applications record
//! from as a microphone ([`audio`]).

pub mod audio;
pub mod config;
pub mod decoder;
pub mod engine;
pub mod types;

pub use audio::{DeviceError, EngineControl, VirtualDeviceBridge};
pub use config::EngineConfig;
pub use decoder::{DecodeError, SharedAsset, SoundAsset, SoundCache};
pub use engine::{CommandSender, EngineEvent, OverlapPolicy, StatusEvent, VoiceSelector};
pub use types::*;
