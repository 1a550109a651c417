//! Standard location of the engine config

use std::path::PathBuf;

/// File name of the engine config inside [`default_config_dir`]
pub const CONFIG_FILE_NAME: &str = "engine.yaml";

/// Returns: `<config dir>/virtual-mic-soundboard`, e.g.
/// `~/.config/virtual-mic-soundboard` on Linux
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("virtual-mic-soundboard")
}

pub fn default_config_path() -> PathBuf {
    default_config_dir().join(CONFIG_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_layout() {
        let path = default_config_path();
        assert!(path.ends_with("virtual-mic-soundboard/engine.yaml"));
    }
}
