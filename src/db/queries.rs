use super::models::{LibraryStats, MidiFile, NewMidiFile, StoredFeatures};
use super::{ColumnKind, Database, FEATURE_COLUMNS, Result};
use crate::analyzer::features::FeatureRecord;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter};
use serde_json::Value as JsonValue;
use std::sync::LazyLock;

static STORE_FEATURES_SQL: LazyLock<String> = LazyLock::new(|| {
    let names: Vec<&str> = FEATURE_COLUMNS.iter().map(|(name, _)| *name).collect();
    let placeholders: Vec<String> = (2..=names.len() + 1).map(|i| format!("?{i}")).collect();
    let updates: Vec<String> = names
        .iter()
        .map(|name| format!("{name} = excluded.{name}"))
        .collect();
    format!(
        "INSERT INTO midi_features (file_id, {}, analyzed_at)
         VALUES (?1, {}, datetime('now'))
         ON CONFLICT(file_id) DO UPDATE SET
            {},
            analyzed_at = datetime('now')",
        names.join(", "),
        placeholders.join(", "),
        updates.join(",\n            ")
    )
});

static QUERY_FEATURES_SQL: LazyLock<String> = LazyLock::new(|| {
    let columns: Vec<String> = FEATURE_COLUMNS
        .iter()
        .map(|(name, _)| format!("a.{name}"))
        .collect();
    format!(
        "SELECT f.file_path, a.analyzed_at, {}
         FROM midi_features a
         JOIN midi_files f ON f.id = a.file_id
         WHERE f.file_path LIKE ?1
         ORDER BY f.file_path",
        columns.join(", ")
    )
});

const FILE_COLUMNS: &str = "id, file_path, key_signature, instrument_role,
    filename_tempo, filename_chord, filename_mode";

fn file_from_row(row: &rusqlite::Row) -> rusqlite::Result<MidiFile> {
    Ok(MidiFile {
        id: row.get(0)?,
        file_path: row.get(1)?,
        key_signature: row.get(2)?,
        instrument_role: row.get(3)?,
        filename_tempo: row.get(4)?,
        filename_chord: row.get(5)?,
        filename_mode: row.get(6)?,
    })
}

/// Convert one flattened feature value to its column representation.
fn json_to_sql(value: &JsonValue, kind: ColumnKind) -> Result<SqlValue> {
    Ok(match (value, kind) {
        (JsonValue::Null, _) => SqlValue::Null,
        (_, ColumnKind::Json) => SqlValue::Text(serde_json::to_string(value)?),
        (JsonValue::Bool(b), _) => SqlValue::Integer(i64::from(*b)),
        (JsonValue::Number(n), _) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) if kind != ColumnKind::Real => SqlValue::Integer(i),
            (_, Some(f)) => SqlValue::Real(f),
            _ => SqlValue::Null,
        },
        (JsonValue::String(s), _) => SqlValue::Text(s.clone()),
        (other, _) => SqlValue::Text(serde_json::to_string(other)?),
    })
}

/// Inverse of `json_to_sql`; JSON columns are parsed back to structure.
fn sql_to_json(value: SqlValue, kind: ColumnKind) -> JsonValue {
    match value {
        SqlValue::Null | SqlValue::Blob(_) => JsonValue::Null,
        SqlValue::Integer(i) => JsonValue::from(i),
        SqlValue::Real(f) => serde_json::Number::from_f64(f).map_or(JsonValue::Null, JsonValue::Number),
        SqlValue::Text(s) if kind == ColumnKind::Json => {
            serde_json::from_str(&s).unwrap_or(JsonValue::String(s))
        }
        SqlValue::Text(s) => JsonValue::String(s),
    }
}

impl Database {
    /// Insert or update a MIDI file. Returns the file id.
    pub fn upsert_file(&self, f: &NewMidiFile) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO midi_files (
                file_path, file_size, file_modified,
                key_signature, instrument_role,
                filename_tempo, filename_chord, filename_mode,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, datetime('now'))
            ON CONFLICT(file_path) DO UPDATE SET
                file_size = excluded.file_size,
                file_modified = excluded.file_modified,
                key_signature = excluded.key_signature,
                instrument_role = excluded.instrument_role,
                filename_tempo = excluded.filename_tempo,
                filename_chord = excluded.filename_chord,
                filename_mode = excluded.filename_mode,
                analysis_error = NULL,
                updated_at = datetime('now')
            ",
            params![
                f.file_path, f.file_size, f.file_modified,
                f.key_signature, f.instrument_role,
                f.filename_tempo, f.filename_chord, f.filename_mode,
            ],
        )?;

        let id: i64 = self.conn.query_row(
            "SELECT id FROM midi_files WHERE file_path = ?1",
            params![f.file_path],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Stored (size, mtime) of a file, if it has been registered.
    pub fn file_signature(&self, file_path: &str) -> Result<Option<(i64, String)>> {
        let result = self.conn.query_row(
            "SELECT file_size, file_modified FROM midi_files WHERE file_path = ?1",
            params![file_path],
            |row| Ok((row.get(0)?, row.get(1)?)),
        );
        match result {
            Ok(sig) => Ok(Some(sig)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Files with no feature row that have not been marked unreadable.
    pub fn get_unanalyzed_files(&self) -> Result<Vec<MidiFile>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {FILE_COLUMNS}
             FROM midi_files
             WHERE analysis_error IS NULL
               AND id NOT IN (SELECT file_id FROM midi_features)
             ORDER BY id"
        ))?;
        let files = stmt
            .query_map([], file_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(files)
    }

    /// Get all files (for --force re-analysis).
    pub fn get_all_files(&self) -> Result<Vec<MidiFile>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {FILE_COLUMNS} FROM midi_files ORDER BY id"))?;
        let files = stmt
            .query_map([], file_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(files)
    }

    /// Store the feature record for a file, replacing any previous one,
    /// and clear its unreadable mark.
    pub fn store_features(&self, file_id: i64, record: &FeatureRecord) -> Result<()> {
        let map = record.to_flat_map()?;
        let mut values = Vec::with_capacity(FEATURE_COLUMNS.len() + 1);
        values.push(SqlValue::Integer(file_id));
        for &(name, kind) in FEATURE_COLUMNS {
            values.push(json_to_sql(map.get(name).unwrap_or(&JsonValue::Null), kind)?);
        }

        let tx = self.conn.unchecked_transaction()?;
        tx.prepare_cached(&STORE_FEATURES_SQL)?
            .execute(params_from_iter(values))?;
        tx.execute(
            "UPDATE midi_files SET analysis_error = NULL WHERE id = ?1",
            params![file_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Record why a file could not be analysed so later runs skip it.
    pub fn mark_unreadable(&self, file_id: i64, reason: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE midi_files SET analysis_error = ?2, updated_at = datetime('now') WHERE id = ?1",
            params![file_id, reason],
        )?;
        Ok(())
    }

    /// Stored features for every file whose path contains `pattern`.
    pub fn query_features(&self, pattern: &str) -> Result<Vec<StoredFeatures>> {
        let mut stmt = self.conn.prepare(&QUERY_FEATURES_SQL)?;
        let rows = stmt
            .query_map(params![format!("%{pattern}%")], |row| {
                let mut features = serde_json::Map::new();
                for (i, &(name, kind)) in FEATURE_COLUMNS.iter().enumerate() {
                    let value: SqlValue = row.get(i + 2)?;
                    features.insert(name.to_string(), sql_to_json(value, kind));
                }
                Ok(StoredFeatures {
                    file_path: row.get(0)?,
                    analyzed_at: row.get(1)?,
                    features,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Get library statistics.
    pub fn stats(&self) -> Result<LibraryStats> {
        let total_files: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM midi_files", [], |row| row.get(0))?;

        let analyzed_files: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM midi_features", [], |row| row.get(0))?;

        let unreadable_files: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM midi_files WHERE analysis_error IS NOT NULL",
            [],
            |row| row.get(0),
        )?;

        let total_duration_mins: f64 = self.conn.query_row(
            "SELECT COALESCE(SUM(duration), 0.0) / 60.0 FROM midi_features",
            [],
            |row| row.get(0),
        )?;

        let mut role_stmt = self.conn.prepare(
            "SELECT COALESCE(instrument_role, 'Unknown'), COUNT(*)
             FROM midi_files
             GROUP BY COALESCE(instrument_role, 'Unknown')
             ORDER BY COUNT(*) DESC",
        )?;
        let roles: Vec<(String, i64)> = role_stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut contour_stmt = self.conn.prepare(
            "SELECT contour, COUNT(*) FROM midi_features
             WHERE contour IS NOT NULL
             GROUP BY contour ORDER BY COUNT(*) DESC",
        )?;
        let contours: Vec<(String, i64)> = contour_stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(LibraryStats {
            total_files,
            analyzed_files,
            unreadable_files,
            total_duration_mins,
            roles,
            contours,
        })
    }
}
