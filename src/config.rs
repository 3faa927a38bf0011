use log::{debug, info};
use serde::{Deserialize, Serialize};

use std::fs::{create_dir_all, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::error::{AudioError, Result};

/// Tunables shared by the players and the speed transforms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Seconds of audio per chunk written by the file player.
    pub chunk_duration: f64,
    /// Target number of chunks for the scaled player.
    pub scaled_chunks: usize,
    /// Amplitude multiplier for float buffers in the scaled player.
    /// `None` means `2^(8 * sample_width - 1)`.
    pub dmax: Option<f64>,
    pub show_progress: bool,
    /// Phase vocoder frame length.
    pub stretch_fft_size: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        PlaybackConfig {
            chunk_duration: 0.05,
            scaled_chunks: 20,
            dmax: None,
            show_progress: true,
            stretch_fft_size: 2048,
        }
    }
}

impl PlaybackConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.chunk_duration.is_finite() && self.chunk_duration > 0.0) {
            return Err(AudioError::Config(format!(
                "chunk_duration must be positive, got {}",
                self.chunk_duration
            )));
        }
        if self.scaled_chunks == 0 {
            return Err(AudioError::Config("scaled_chunks must be at least 1".into()));
        }
        if let Some(dmax) = self.dmax {
            if !(dmax.is_finite() && dmax > 0.0) {
                return Err(AudioError::Config(format!(
                    "dmax must be positive, got {dmax}"
                )));
            }
        }
        if !self.stretch_fft_size.is_power_of_two() || self.stretch_fft_size < 256 {
            return Err(AudioError::Config(format!(
                "stretch_fft_size must be a power of two >= 256, got {}",
                self.stretch_fft_size
            )));
        }
        Ok(())
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("org", "pcmkit", "pcmkit")
        .ok_or_else(|| AudioError::Config("no home directory to keep the config in".into()))
}

pub fn config_path() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().join("config.json"))
}

/// Loads the user config, writing the defaults out on first run.
pub fn load_config() -> Result<PlaybackConfig> {
    let path = config_path()?;
    match load_config_from(&path) {
        Err(AudioError::NotFound(_)) => {
            info!("creating and saving default config");
            let config = PlaybackConfig::default();
            save_config_to(&path, &config)?;
            Ok(config)
        }
        other => other,
    }
}

pub fn load_config_from(path: &Path) -> Result<PlaybackConfig> {
    let file = File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => AudioError::NotFound(path.to_path_buf()),
        _ => AudioError::Io(e),
    })?;
    let config: PlaybackConfig = serde_json::from_reader(file)?;
    config.validate()?;
    info!("loaded config from {}", path.display());
    Ok(config)
}

pub fn save_config_to(path: &Path, config: &PlaybackConfig) -> Result<()> {
    if let Some(dir) = path.parent() {
        create_dir_all(dir)?;
    }
    debug!("saving config to {}", path.display());
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, config)?;
    Ok(())
}
