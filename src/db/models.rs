use crate::analyzer::features::FileMetadata;
use std::path::Path;

/// Data for inserting or updating a MIDI file (scan phase).
#[derive(Debug, Clone)]
pub struct NewMidiFile {
    pub file_path: String,
    pub file_size: i64,
    pub file_modified: String,

    pub key_signature: Option<String>,
    pub instrument_role: Option<String>,
    pub filename_tempo: Option<u32>,
    pub filename_chord: Option<String>,
    pub filename_mode: Option<String>,
}

/// A MIDI file row read from the database.
#[derive(Debug, Clone)]
pub struct MidiFile {
    pub id: i64,
    pub file_path: String,
    pub key_signature: Option<String>,
    pub instrument_role: Option<String>,
    pub filename_tempo: Option<u32>,
    pub filename_chord: Option<String>,
    pub filename_mode: Option<String>,
}

impl MidiFile {
    /// Metadata handed to the feature extractor for this file.
    pub fn metadata(&self) -> FileMetadata {
        FileMetadata {
            file_name: Path::new(&self.file_path)
                .file_name()
                .map(|f| f.to_string_lossy().to_string())
                .unwrap_or_default(),
            key_signature: self.key_signature.clone(),
            instrument_role: self.instrument_role.clone(),
            filename_tempo: self.filename_tempo,
            filename_chord: self.filename_chord.clone(),
            filename_mode: self.filename_mode.clone(),
        }
    }
}

/// A stored feature row, decoded back to JSON values keyed by column.
#[derive(Debug, Clone)]
pub struct StoredFeatures {
    pub file_path: String,
    pub analyzed_at: String,
    pub features: serde_json::Map<String, serde_json::Value>,
}

pub struct LibraryStats {
    pub total_files: i64,
    pub analyzed_files: i64,
    pub unreadable_files: i64,
    pub total_duration_mins: f64,
    /// (role, file count), most common first
    pub roles: Vec<(String, i64)>,
    /// (contour, analysed file count), most common first
    pub contours: Vec<(String, i64)>,
}
