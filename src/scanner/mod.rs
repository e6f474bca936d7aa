pub mod filename;

use crate::db::models::NewMidiFile;
use crate::db::Database;
use crate::SUPPORTED_EXTENSIONS;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database error: {0}")]
    Db(#[from] crate::db::DbError),
}

#[derive(Debug, Default, PartialEq)]
pub struct ScanResult {
    pub scanned: u64,
    pub new: u64,
    pub updated: u64,
    pub skipped: u64,
    pub errors: u64,
}

/// Whether a path has one of the MIDI extensions, case-insensitively.
pub fn is_midi_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Walk each root for MIDI files and register them in the database.
pub fn scan(db: &Database, roots: &[PathBuf], force: bool) -> Result<ScanResult, ScanError> {
    // First pass: collect (root, file) pairs so metadata can be read relative to the root
    let mut midi_files: Vec<(&Path, PathBuf)> = Vec::new();
    for root in roots {
        for entry in WalkDir::new(root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.file_type().is_file() && is_midi_file(entry.path()) {
                midi_files.push((root.as_path(), entry.into_path()));
            }
        }
    }

    let pb = ProgressBar::new(midi_files.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}) ({eta}) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-"),
    );
    pb.set_message("Scanning...");

    let mut result = ScanResult::default();

    // One transaction for the whole scan
    let tx = db.conn.unchecked_transaction().map_err(crate::db::DbError::from)?;

    for (root, path) in &midi_files {
        result.scanned += 1;

        match process_file(db, root, path, force) {
            Ok(FileAction::New) => result.new += 1,
            Ok(FileAction::Updated) => result.updated += 1,
            Ok(FileAction::Skipped) => result.skipped += 1,
            Err(e) => {
                log::warn!("Error scanning {}: {}", path.display(), e);
                result.errors += 1;
            }
        }

        pb.inc(1);
    }

    tx.commit().map_err(crate::db::DbError::from)?;

    pb.finish_with_message(format!(
        "Done: {} new, {} updated, {} skipped, {} errors",
        result.new, result.updated, result.skipped, result.errors
    ));

    Ok(result)
}

enum FileAction {
    New,
    Updated,
    Skipped,
}

fn process_file(
    db: &Database,
    root: &Path,
    path: &Path,
    force: bool,
) -> Result<FileAction, ScanError> {
    let meta = std::fs::metadata(path)?;
    let file_size = meta.len() as i64;
    let file_modified = format_mtime(&meta);
    let file_path = path.to_string_lossy().to_string();

    let existing = db.file_signature(&file_path)?;
    if !force && existing.as_ref() == Some(&(file_size, file_modified.clone())) {
        return Ok(FileAction::Skipped);
    }

    let parsed = filename::parse_path(root, path);
    log::debug!(
        "Registering {} (key {:?}, role {:?})",
        file_path,
        parsed.key_signature,
        parsed.instrument_role
    );

    db.upsert_file(&NewMidiFile {
        file_path,
        file_size,
        file_modified,
        key_signature: parsed.key_signature,
        instrument_role: parsed.instrument_role,
        filename_tempo: parsed.tempo,
        filename_chord: parsed.chord,
        filename_mode: parsed.mode,
    })?;

    if existing.is_none() {
        Ok(FileAction::New)
    } else {
        Ok(FileAction::Updated)
    }
}

fn format_mtime(meta: &std::fs::Metadata) -> String {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"MThd").unwrap();
    }

    #[test]
    fn test_extension_filter() {
        assert!(is_midi_file(Path::new("a/b.mid")));
        assert!(is_midi_file(Path::new("a/b.MIDI")));
        assert!(!is_midi_file(Path::new("a/b.wav")));
        assert!(!is_midi_file(Path::new("a/mid")));
    }

    #[test]
    fn test_scan_registers_and_skips_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        touch(&root.join("C_major/Arp/arp_120bpm_Cmaj.mid"));
        touch(&root.join("C_major/Bass/bass.MID"));
        touch(&root.join("C_major/Bass/notes.txt"));

        let db = Database::open_in_memory().unwrap();
        let first = scan(&db, std::slice::from_ref(&root), false).unwrap();
        assert_eq!(first.scanned, 2);
        assert_eq!(first.new, 2);

        let second = scan(&db, std::slice::from_ref(&root), false).unwrap();
        assert_eq!(second.skipped, 2);
        assert_eq!(second.new, 0);

        let forced = scan(&db, std::slice::from_ref(&root), true).unwrap();
        assert_eq!(forced.updated, 2);

        let files = db.get_all_files().unwrap();
        assert_eq!(files.len(), 2);
        let arp = files
            .iter()
            .find(|f| f.file_path.ends_with("arp_120bpm_Cmaj.mid"))
            .unwrap();
        assert_eq!(arp.key_signature.as_deref(), Some("C_major"));
        assert_eq!(arp.instrument_role.as_deref(), Some("Arp"));
        assert_eq!(arp.filename_tempo, Some(120));
        assert_eq!(arp.filename_chord.as_deref(), Some("C"));
    }

    #[test]
    fn test_scan_missing_root_is_empty() {
        let db = Database::open_in_memory().unwrap();
        let result = scan(&db, &[PathBuf::from("/definitely/not/here")], false).unwrap();
        assert_eq!(result, ScanResult::default());
    }
}
