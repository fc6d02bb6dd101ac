//! Configuration file loading and live reloading.

use crate::error::ConfigError;
use crate::host::RenderSettings;
use crate::sink::SubmitConfig;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use tracing::{error, info, warn};

/// Top-level configuration file.
///
/// ```yaml
/// capture:
///   resize_mode: linear_resize
///   mirror_mode: horizontal
///   double_buffering: false
/// render:
///   target_frame_rate: 30
///   vsync: false
/// suppress_repeats: true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: SubmitConfig,
    pub render: RenderSettings,
    /// Log an unsupported graphics device only once
    pub suppress_repeats: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture: SubmitConfig::default(),
            render: RenderSettings::default(),
            suppress_repeats: true,
        }
    }
}

impl Config {
    /// Reads and parses a YAML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Parses a `WIDTHxHEIGHT` size.
pub fn parse_size(s: &str) -> Result<(u32, u32), ConfigError> {
    let invalid = || ConfigError::InvalidSize(s.to_string());
    let (w, h) = s.split_once(|c| c == 'x' || c == 'X').ok_or_else(invalid)?;
    let width = w.trim().parse().map_err(|_| invalid())?;
    let height = h.trim().parse().map_err(|_| invalid())?;
    if width == 0 || height == 0 {
        return Err(invalid());
    }
    Ok((width, height))
}

/// Watches a config file and reloads it when it changes.
pub struct ConfigWatcher {
    path: PathBuf,
    _watcher: RecommendedWatcher,
    rx: Receiver<Result<Event, notify::Error>>,
    current: Config,
}

impl ConfigWatcher {
    /// Starts watching `path`. Returns None if the watch cannot be set up.
    pub fn new(path: PathBuf, current: Config) -> Option<Self> {
        let (tx, rx) = channel();

        match RecommendedWatcher::new(tx, notify::Config::default()) {
            Ok(mut watcher) => {
                if let Err(e) = watcher.watch(&path, RecursiveMode::NonRecursive) {
                    warn!("Failed to watch config file {:?}: {}", path, e);
                    return None;
                }
                info!("Watching config file {:?} for changes", path);
                Some(Self {
                    path,
                    _watcher: watcher,
                    rx,
                    current,
                })
            }
            Err(e) => {
                warn!("Failed to create config watcher: {}", e);
                None
            }
        }
    }

    /// Last config successfully loaded.
    pub fn current(&self) -> &Config {
        &self.current
    }

    /// Drains pending file events and returns the new config if it changed.
    ///
    /// A file that fails to parse is logged and the previous config kept.
    pub fn check_for_changes(&mut self) -> Option<Config> {
        let mut needs_reload = false;
        while let Ok(res) = self.rx.try_recv() {
            if let Ok(event) = res {
                if matches!(event.kind, notify::EventKind::Modify(_) | notify::EventKind::Create(_)) {
                    needs_reload = true;
                }
            }
        }
        if !needs_reload {
            return None;
        }

        match Config::load(&self.path) {
            Ok(config) if config != self.current => {
                info!("Config file {:?} reloaded", self.path);
                self.current = config.clone();
                Some(config)
            }
            Ok(_) => None,
            Err(e) => {
                error!("Keeping previous config: {}", e);
                None
            }
        }
    }
}
