//! Soundboard - terminal front-end for the virtual microphone engine
//!
//! Loads the sounds given on the command line, creates the virtual microphone
//! and reads commands from stdin (`help` lists them).
//!
//! ## Command line flags
//!
//! - `--exclusive`: a sound restarts instead of layering when played again
//! - `--solo`: playing a sound stops every other sound
//! - `--no-mic`: do not mix the real microphone into the virtual one
//! - `--config PATH`: engine config file (default: the user config dir)

mod commands;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use crossbeam::channel::{Receiver, RecvTimeoutError};

use commands::{parse_line, CliCommand, HELP};
use soundboard_core::audio::{get_input_devices, get_output_devices};
use soundboard_core::config::{default_config_path, load_config};
use soundboard_core::engine::{FinishReason, QueueFull};
use soundboard_core::{
    EngineConfig, EngineControl, EngineEvent, OverlapPolicy, SharedAsset, StatusEvent,
    VirtualDeviceBridge, VoiceSelector,
};

/// How often status events are polled while waiting for input
const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(50);

struct Options {
    policy: OverlapPolicy,
    mic: bool,
    config_path: PathBuf,
    files: Vec<PathBuf>,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Options> {
    let mut options = Options {
        policy: OverlapPolicy::Independent,
        mic: true,
        config_path: default_config_path(),
        files: Vec::new(),
    };
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--exclusive" => options.policy = OverlapPolicy::ExclusivePerSound,
            "--solo" => options.policy = OverlapPolicy::ExclusiveAll,
            "--no-mic" => options.mic = false,
            "--config" => {
                options.config_path = args
                    .next()
                    .map(PathBuf::from)
                    .context("--config needs a path")?;
            }
            flag if flag.starts_with("--") => bail!("unknown flag {}", flag),
            file => options.files.push(PathBuf::from(file)),
        }
    }
    Ok(options)
}

fn main() -> Result<()> {
    // Set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let options = parse_args(std::env::args().skip(1))?;
    let mut config: EngineConfig = load_config(&options.config_path);
    if !options.mic {
        config.virtual_device.mic_passthrough = false;
    }

    let mut session = Session::new(VirtualDeviceBridge::new(config), options.files);
    session.start();
    println!("Type `help` for commands.");

    let input = spawn_stdin_reader();
    loop {
        match input.recv_timeout(STATUS_POLL_INTERVAL) {
            Ok(line) => match parse_line(&line) {
                Ok(Some(CliCommand::Quit)) => break,
                Ok(Some(command)) => {
                    if let Err(e) = session.run(command, options.policy) {
                        println!("{}", e);
                    }
                }
                Ok(None) => {}
                Err(e) => println!("{}", e),
            },
            Err(RecvTimeoutError::Timeout) => {}
            // stdin closed
            Err(RecvTimeoutError::Disconnected) => break,
        }
        session.report_status();
    }

    session.shutdown();
    log::info!("Soundboard stopped");
    Ok(())
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = crossbeam::channel::unbounded();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// The bridge plus whatever is loaded into it
///
/// `control` is `None` while the engine is not running. Sound paths are
/// kept so a restart can decode them again at the new device rate.
struct Session {
    bridge: VirtualDeviceBridge,
    control: Option<EngineControl>,
    paths: Vec<PathBuf>,
    sounds: Vec<SharedAsset>,
}

impl Session {
    fn new(bridge: VirtualDeviceBridge, paths: Vec<PathBuf>) -> Self {
        Self {
            bridge,
            control: None,
            paths,
            sounds: Vec::new(),
        }
    }

    /// Start (or restart) the engine and reload every known sound
    ///
    /// A failure is printed and leaves the session idle.
    fn start(&mut self) {
        if let Some(control) = self.control.as_mut() {
            let _ = control.commands.stop_all();
        }
        self.control = None;
        self.sounds.clear();

        let mut control = match self.bridge.start() {
            Ok(control) => control,
            Err(e) => {
                println!("Could not start the audio engine: {}", e);
                println!("Type `start` to try again, `devices` to see what is available.");
                return;
            }
        };

        for path in &self.paths {
            load_sound(&mut control, &mut self.sounds, path);
        }

        println!("Soundboard running at {} Hz", control.sample_rate);
        match &control.capture_source {
            Some(source) => println!("Select \"{}\" as the microphone in your voice chat", source),
            None if self.bridge.config().virtual_device.create_sink => {
                println!("No virtual microphone, playing on the default output device")
            }
            None => {}
        }
        print_sounds(&self.sounds);
        self.control = Some(control);
    }

    fn shutdown(&mut self) {
        if let Some(control) = self.control.as_mut() {
            let _ = control.commands.stop_all();
        }
        self.control = None;
        self.bridge.stop();
    }

    fn engine(&mut self) -> Result<&mut EngineControl> {
        self.control
            .as_mut()
            .context("audio engine is not running (type `start`)")
    }

    fn run(&mut self, command: CliCommand, policy: OverlapPolicy) -> Result<()> {
        match command {
            CliCommand::Play(n) => {
                let asset = sound(&self.sounds, n)?.clone();
                self.engine()?
                    .commands
                    .trigger(&asset, 1.0, policy)
                    .map_err(queue_full)?;
            }
            CliCommand::Pause(n) => {
                let selector = selector(&self.sounds, n)?;
                self.engine()?.commands.pause(selector).map_err(queue_full)?
            }
            CliCommand::Resume(n) => {
                let selector = selector(&self.sounds, n)?;
                self.engine()?.commands.resume(selector).map_err(queue_full)?
            }
            CliCommand::Toggle(n) => {
                let selector = selector(&self.sounds, n)?;
                self.engine()?.commands.toggle_pause(selector).map_err(queue_full)?
            }
            CliCommand::Stop(n) => {
                let selector = selector(&self.sounds, n)?;
                self.engine()?.commands.stop(selector).map_err(queue_full)?
            }
            CliCommand::Volume(n, gain) => {
                let selector = selector(&self.sounds, Some(n))?;
                self.engine()?.commands.set_volume(selector, gain)
            }
            CliCommand::Master(gain) => self.engine()?.commands.set_master_volume(gain),
            CliCommand::Mute => self.engine()?.commands.set_mic_mute(true).map_err(queue_full)?,
            CliCommand::Unmute => self.engine()?.commands.set_mic_mute(false).map_err(queue_full)?,
            CliCommand::Duck(on) => self
                .engine()?
                .commands
                .set_mute_mic_while_playing(on)
                .map_err(queue_full)?,
            CliCommand::Load(path) => {
                if !self.paths.contains(&path) {
                    self.paths.push(path.clone());
                }
                match self.control.as_mut() {
                    Some(control) => {
                        load_sound(control, &mut self.sounds, &path);
                        print_sounds(&self.sounds);
                    }
                    None => println!("{} will be loaded once the engine starts", path.display()),
                }
            }
            CliCommand::List => print_sounds(&self.sounds),
            CliCommand::Devices => print_devices(),
            CliCommand::Start => self.start(),
            CliCommand::Status => {
                let atomics = &self.engine()?.atomics;
                println!(
                    "{} voice(s), peak {:.2}{}, microphone {}, {} event(s) dropped",
                    atomics.active_voices(),
                    atomics.peak(),
                    if atomics.take_clip() { " (clipped)" } else { "" },
                    if atomics.mic_gated() { "gated" } else { "open" },
                    atomics.dropped_events()
                );
            }
            CliCommand::Help => println!("{}", HELP),
            CliCommand::Quit => {}
        }
        Ok(())
    }

    fn report_status(&mut self) {
        let Some(control) = self.control.as_mut() else {
            return;
        };
        while let Some(event) = control.status.poll() {
            match event {
                StatusEvent::Engine(EngineEvent::VoiceFinished {
                    asset,
                    reason: FinishReason::Completed,
                    ..
                }) => log::debug!("{} finished", sound_name(&self.sounds, asset)),
                StatusEvent::Engine(EngineEvent::VoiceFinished { asset, reason, .. }) => {
                    log::debug!("{} ended ({:?})", sound_name(&self.sounds, asset), reason)
                }
                StatusEvent::Engine(EngineEvent::CapacityExceeded { asset, .. }) => println!(
                    "Too many sounds playing, {} was not started",
                    sound_name(&self.sounds, asset)
                ),
                StatusEvent::Device(e) => println!("Audio problem: {}", e),
            }
        }
    }
}

fn load_sound(control: &mut EngineControl, sounds: &mut Vec<SharedAsset>, path: &Path) {
    match control.sounds.load(path) {
        Ok(asset) => {
            log::info!(
                "Loaded {} ({:.2}s, {} Hz source)",
                asset.name,
                asset.duration_secs(),
                asset.source_sample_rate
            );
            if !sounds.iter().any(|s| s.id == asset.id) {
                sounds.push(asset);
            }
        }
        Err(e) => log::error!("Could not load {:?}: {}", path, e),
    }
}

fn print_sounds(sounds: &[SharedAsset]) {
    if sounds.is_empty() {
        println!("No sounds loaded (use `load PATH`).");
    }
    for (i, sound) in sounds.iter().enumerate() {
        println!("  {:>2}  {} ({:.2}s)", i + 1, sound.name, sound.duration_secs());
    }
}

fn print_devices() {
    for (label, devices) in [("Playback", get_output_devices()), ("Capture", get_input_devices())] {
        println!("{}:", label);
        match devices {
            Ok(devices) if devices.is_empty() => println!("  (none)"),
            Ok(devices) => {
                for device in devices {
                    let mark = if device.is_default { "*" } else { " " };
                    println!("  {} {}", mark, device);
                }
            }
            Err(e) => println!("  {}", e),
        }
    }
}

fn sound(sounds: &[SharedAsset], n: usize) -> Result<&SharedAsset> {
    sounds
        .get(n - 1)
        .with_context(|| format!("no sound {} (see `list`)", n))
}

fn selector(sounds: &[SharedAsset], n: Option<usize>) -> Result<VoiceSelector> {
    Ok(match n {
        Some(n) => VoiceSelector::Asset(sound(sounds, n)?.id),
        None => VoiceSelector::All,
    })
}

fn queue_full(e: QueueFull) -> anyhow::Error {
    anyhow::anyhow!("engine busy, try again ({})", e)
}

fn sound_name(sounds: &[SharedAsset], id: soundboard_core::AssetId) -> &str {
    sounds
        .iter()
        .find(|s| s.id == id)
        .map(|s| s.name.as_str())
        .unwrap_or("?")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter().map(|s| s.to_string()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn test_parse_args() {
        let options = parse_args(args(&["--exclusive", "horn.wav", "--no-mic", "clap.ogg"])).unwrap();
        assert_eq!(options.policy, OverlapPolicy::ExclusivePerSound);
        assert!(!options.mic);
        assert_eq!(
            options.files,
            vec![PathBuf::from("horn.wav"), PathBuf::from("clap.ogg")]
        );

        let options = parse_args(args(&["--config", "/tmp/board.yaml", "--solo"])).unwrap();
        assert_eq!(options.config_path, PathBuf::from("/tmp/board.yaml"));
        assert_eq!(options.policy, OverlapPolicy::ExclusiveAll);

        assert!(parse_args(args(&["--loud"])).is_err());
        assert!(parse_args(args(&["--config"])).is_err());
    }

    #[test]
    fn test_idle_session_keeps_accepting_commands() {
        let mut session = Session::new(VirtualDeviceBridge::new(EngineConfig::default()), Vec::new());

        let err = session.run(CliCommand::Master(0.5), OverlapPolicy::Independent).unwrap_err();
        assert!(err.to_string().contains("not running"));

        // Sound lookups fail first when nothing is loaded
        assert!(session.run(CliCommand::Play(1), OverlapPolicy::Independent).is_err());

        // Paths are remembered for the next start
        session
            .run(CliCommand::Load(PathBuf::from("horn.wav")), OverlapPolicy::Independent)
            .unwrap();
        session
            .run(CliCommand::Load(PathBuf::from("horn.wav")), OverlapPolicy::Independent)
            .unwrap();
        assert_eq!(session.paths, vec![PathBuf::from("horn.wav")]);

        session.run(CliCommand::List, OverlapPolicy::Independent).unwrap();
        session.run(CliCommand::Help, OverlapPolicy::Independent).unwrap();
        session.report_status();
        session.shutdown();
    }
}
