pub mod models;
pub mod queries;

use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Migration failed: {0}")]
    Migration(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// How a feature column is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Real,
    Text,
    /// Structured value encoded as JSON in a TEXT column.
    Json,
}

impl ColumnKind {
    fn sql_type(self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Text | Self::Json => "TEXT",
        }
    }
}

/// Columns of `midi_features`, named after the flattened feature-record
/// fields they hold.
pub const FEATURE_COLUMNS: &[(&str, ColumnKind)] = &[
    // File context
    ("file_name", ColumnKind::Text),
    ("key_signature", ColumnKind::Text),
    ("key_scale", ColumnKind::Text),
    ("modality", ColumnKind::Text),
    ("instrument_role", ColumnKind::Text),
    ("tempo", ColumnKind::Integer),
    ("filename_chord", ColumnKind::Text),
    ("filename_mode", ColumnKind::Text),
    ("duration", ColumnKind::Real),
    ("time_signature", ColumnKind::Text),
    ("midi_tempo_bpm", ColumnKind::Real),
    ("track_count", ColumnKind::Integer),
    ("primary_track_index", ColumnKind::Integer),
    ("instrument_type", ColumnKind::Text),
    ("polyphonic_density", ColumnKind::Integer),
    // Harmonic
    ("pitch_classes", ColumnKind::Json),
    ("harmonic_role", ColumnKind::Json),
    ("chord_outline", ColumnKind::Json),
    ("harmonic_complexity", ColumnKind::Json),
    ("mode_or_scale", ColumnKind::Text),
    ("scale_usage", ColumnKind::Json),
    ("unique_pitch_classes", ColumnKind::Integer),
    ("root_notes", ColumnKind::Json),
    ("harmony_complexity", ColumnKind::Integer),
    // Melodic
    ("contour", ColumnKind::Text),
    ("note_intervals", ColumnKind::Json),
    ("melodic_intervals", ColumnKind::Json),
    ("interval_histogram", ColumnKind::Json),
    ("melodic_peaks", ColumnKind::Integer),
    ("melodic_troughs", ColumnKind::Integer),
    ("melodic_range", ColumnKind::Integer),
    ("repetitive_patterns", ColumnKind::Json),
    ("pitch_trigrams", ColumnKind::Json),
    // Rhythmic and dynamics
    ("total_notes", ColumnKind::Integer),
    ("unique_notes", ColumnKind::Integer),
    ("note_length_mean", ColumnKind::Real),
    ("note_length_std", ColumnKind::Real),
    ("velocity_mean", ColumnKind::Real),
    ("velocity_std", ColumnKind::Real),
    ("start_time_mean", ColumnKind::Real),
    ("start_time_std", ColumnKind::Real),
    ("end_time_mean", ColumnKind::Real),
    ("end_time_std", ColumnKind::Real),
    ("syncopation_count", ColumnKind::Integer),
    ("late_onset_count", ColumnKind::Integer),
    ("legato_ratio", ColumnKind::Json),
    ("rest_durations", ColumnKind::Json),
    ("groove_patterns", ColumnKind::Json),
    ("dynamics", ColumnKind::Json),
    ("dynamic_range", ColumnKind::Integer),
    ("note_density", ColumnKind::Real),
    ("is_polyphonic", ColumnKind::Integer),
    // Ornamentation
    ("vibrato_patterns", ColumnKind::Integer),
];

pub struct Database {
    pub conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        // WAL mode for better concurrent read performance
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        self.migrate()?;
        Ok(())
    }

    fn migrate(&self) -> Result<()> {
        let version: i32 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);

        if version > SCHEMA_VERSION {
            return Err(DbError::Migration(format!(
                "database schema v{version} is newer than supported v{SCHEMA_VERSION}"
            )));
        }
        if version < 1 {
            self.migrate_v1()?;
        }

        self.conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(())
    }

    /// V1: registered files + one feature row per analysed file
    fn migrate_v1(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS midi_files (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                file_path       TEXT NOT NULL UNIQUE,
                file_size       INTEGER NOT NULL,
                file_modified   TEXT NOT NULL,

                -- Inferred from <root>/<key>/<role>/<name>
                key_signature   TEXT,
                instrument_role TEXT,
                filename_tempo  INTEGER,
                filename_chord  TEXT,
                filename_mode   TEXT,

                -- Set when the file could not be decoded
                analysis_error  TEXT,

                created_at      TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_files_role ON midi_files(instrument_role);
            CREATE INDEX IF NOT EXISTS idx_files_key ON midi_files(key_signature);
            ",
        )?;

        let columns: Vec<String> = FEATURE_COLUMNS
            .iter()
            .map(|(name, kind)| format!("    {name} {},", kind.sql_type()))
            .collect();
        self.conn.execute_batch(&format!(
            "
            CREATE TABLE IF NOT EXISTS midi_features (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                file_id     INTEGER NOT NULL UNIQUE REFERENCES midi_files(id) ON DELETE CASCADE,
            {}
                analyzed_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_features_file ON midi_features(file_id);
            CREATE INDEX IF NOT EXISTS idx_features_contour ON midi_features(contour);
            CREATE INDEX IF NOT EXISTS idx_features_scale ON midi_features(mode_or_scale);
            ",
            columns.join("\n")
        ))?;
        Ok(())
    }
}

const SCHEMA_VERSION: i32 = 1;
