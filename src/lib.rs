pub mod analyzer;
pub mod config;
pub mod db;
pub mod scanner;

/// Standard MIDI file extensions we pick up when scanning
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mid", "midi"];

/// Application name for XDG paths
pub const APP_NAME: &str = "midilens";
