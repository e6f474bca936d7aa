use std::path::PathBuf;

use directories::ProjectDirs;
use serde::Deserialize;

/// Application configuration loaded from TOML config file.
/// All fields have defaults; the config file is optional.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Directories to scan for MIDI files (used when `scan` has no CLI args).
    pub midi_dirs: Vec<PathBuf>,
    /// Custom database path (overrides XDG default).
    pub db_path: Option<PathBuf>,
    /// Number of parallel workers. 0 = auto-detect (cores / 2, min 1).
    pub workers: usize,
    /// Feature-extraction tunables.
    pub analysis: AnalysisConfig,
}

/// Thresholds used by the feature extractors.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Notes lasting at least this long (seconds) count as legato.
    pub legato_threshold_secs: f64,
    /// Shortest interval run reported as a motif.
    pub motif_min_length: usize,
    /// Tracks with fewer notes are ignored for root-note detection.
    pub root_note_min_notes: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            legato_threshold_secs: 0.5,
            motif_min_length: 3,
            root_note_min_notes: 3,
        }
    }
}

impl AppConfig {
    /// Load config from `~/.config/midilens/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) if path.exists() => match std::fs::read_to_string(&path) {
                Ok(contents) => Self::parse(&contents).unwrap_or_else(|e| {
                    log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }),
                Err(e) => {
                    log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        let config: AppConfig = toml::from_str(contents)?;
        log::info!(
            "Loaded config: {} midi dir(s), legato threshold {}s",
            config.midi_dirs.len(),
            config.analysis.legato_threshold_secs
        );
        Ok(config)
    }

    /// Resolve worker count: 0 → auto-detect (cores / 2, min 1).
    pub fn resolve_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            let cores = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2);
            (cores / 2).max(1)
        }
    }

    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// Resolve the default database path using XDG data directory.
pub fn default_db_path() -> PathBuf {
    if let Some(dirs) = ProjectDirs::from("", "", crate::APP_NAME) {
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir).ok();
        data_dir.join("midilens.db")
    } else {
        // Fallback: current directory
        PathBuf::from("midilens.db")
    }
}
