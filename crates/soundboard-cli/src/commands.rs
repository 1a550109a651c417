//! Parsing of the interactive commands typed on stdin

use std::path::PathBuf;

/// One line of user input
#[derive(Debug, Clone, PartialEq)]
pub enum CliCommand {
    /// Trigger sound N (1-based)
    Play(usize),
    /// Pause sound N, or everything
    Pause(Option<usize>),
    Resume(Option<usize>),
    Toggle(Option<usize>),
    Stop(Option<usize>),
    /// Set the gain of every voice of sound N
    Volume(usize, f32),
    Master(f32),
    Mute,
    Unmute,
    /// Enable or disable muting the microphone while sounds play
    Duck(bool),
    Load(PathBuf),
    List,
    /// List playback and capture devices
    Devices,
    /// Start the engine, or restart it if it is running
    Start,
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  play N          trigger sound N
  pause [N]       pause sound N (or everything)
  resume [N]      resume sound N (or everything)
  toggle [N]      toggle pause of sound N (or everything)
  stop [N]        stop sound N (or everything)
  vol N GAIN      set the gain of sound N (0.0 - 2.0)
  master GAIN     set the master gain (0.0 - 2.0)
  mute | unmute   mute the real microphone
  duck on|off     mute the microphone while sounds play
  load PATH       decode another sound
  list            show loaded sounds
  devices         list audio devices
  start           (re)start the audio engine
  status          show engine state
  quit";

/// Parse one input line; blank lines give `Ok(None)`
pub fn parse_line(line: &str) -> Result<Option<CliCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let command = match (verb.to_lowercase().as_str(), args.as_slice()) {
        ("play" | "p", [n]) => CliCommand::Play(sound_index(n)?),
        ("pause", rest) => CliCommand::Pause(optional_index(rest)?),
        ("resume", rest) => CliCommand::Resume(optional_index(rest)?),
        ("toggle", rest) => CliCommand::Toggle(optional_index(rest)?),
        ("stop" | "s", rest) => CliCommand::Stop(optional_index(rest)?),
        ("vol" | "volume", [n, gain]) => CliCommand::Volume(sound_index(n)?, parse_gain(gain)?),
        ("master", [gain]) => CliCommand::Master(parse_gain(gain)?),
        ("mute", []) => CliCommand::Mute,
        ("unmute", []) => CliCommand::Unmute,
        ("duck", ["on"]) => CliCommand::Duck(true),
        ("duck", ["off"]) => CliCommand::Duck(false),
        ("load", [_, ..]) => CliCommand::Load(PathBuf::from(args.join(" "))),
        ("list" | "ls", []) => CliCommand::List,
        ("devices", []) => CliCommand::Devices,
        ("start" | "restart", []) => CliCommand::Start,
        ("status", []) => CliCommand::Status,
        ("help" | "?", _) => CliCommand::Help,
        ("quit" | "exit" | "q", []) => CliCommand::Quit,
        _ => return Err(format!("unknown command: {} (try `help`)", line.trim())),
    };
    Ok(Some(command))
}

fn sound_index(word: &str) -> Result<usize, String> {
    match word.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("not a sound number: {}", word)),
    }
}

fn optional_index(args: &[&str]) -> Result<Option<usize>, String> {
    match args {
        [] => Ok(None),
        [n] => sound_index(n).map(Some),
        _ => Err("expected at most one sound number".to_string()),
    }
}

fn parse_gain(word: &str) -> Result<f32, String> {
    word.parse::<f32>()
        .ok()
        .filter(|g| g.is_finite())
        .ok_or_else(|| format!("not a gain: {}", word))
}
