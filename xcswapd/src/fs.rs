use anyhow::Context;
use std::path::{Path, PathBuf};

const APPLICATION: &str = "xcswapd";

/// Location of the configuration file.
// Linux: /home/<user>/.config/xcswapd/
// OSX: /Users/<user>/Library/Preferences/xcswapd/
fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APPLICATION)
        .map(|proj_dirs| proj_dirs.config_dir().to_path_buf())
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    config_dir()
        .map(|dir| Path::join(&dir, "config.toml"))
        .context("could not generate default configuration path")
}

/// Location of the swap database.
// Linux: /home/<user>/.local/share/xcswapd/
// OSX: /Users/<user>/Library/Application Support/xcswapd/
pub fn data_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APPLICATION)
        .map(|proj_dirs| proj_dirs.data_dir().to_path_buf())
}

pub fn ensure_directory_exists(file: &Path) -> Result<(), std::io::Error> {
    if let Some(path) = file.parent() {
        if !path.exists() {
            tracing::info!(
                "parent directory does not exist, creating recursively: {}",
                file.display()
            );
            return std::fs::create_dir_all(path);
        }
    }
    Ok(())
}
