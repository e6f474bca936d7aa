pub mod decode;
pub mod events;
pub mod features;
pub mod harmonic;
pub mod melodic;
pub mod ornament;
pub mod rhythmic;
pub mod stats;

use crate::config::AnalysisConfig;
use crate::db::models::MidiFile;
use crate::db::Database;
use features::{FeatureRecord, FileMetadata};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("Decode error: {0}")]
    Decode(#[from] decode::DecodeError),
    #[error("Database error: {0}")]
    Db(#[from] crate::db::DbError),
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Debug, Default, PartialEq)]
pub struct AnalyzeResult {
    pub analyzed: u64,
    pub unreadable: u64,
    pub failed: u64,
}

/// Decode one file and extract its feature record.
pub fn analyze_path(
    path: &Path,
    meta: &FileMetadata,
    config: &AnalysisConfig,
) -> Result<FeatureRecord, decode::DecodeError> {
    let score = decode::load_score(path)?;
    log::debug!(
        "Decoded {}: {} tracks, {:.2}s",
        meta.file_name,
        score.tracks.len(),
        score.end_time()
    );
    Ok(features::extract(&score, meta, config))
}

/// Result of analysing one file. A corrupt file becomes `Unreadable`
/// instead of an error so it cannot abort a batch.
#[derive(Debug)]
pub enum FileOutcome {
    Analyzed(Box<FeatureRecord>),
    Unreadable { reason: String },
}

pub fn analyze_file(path: &Path, meta: &FileMetadata, config: &AnalysisConfig) -> FileOutcome {
    match analyze_path(path, meta, config) {
        Ok(record) => FileOutcome::Analyzed(Box::new(record)),
        Err(e) => FileOutcome::Unreadable {
            reason: e.to_string(),
        },
    }
}

/// Analyze registered files in parallel with rayon.
///
/// Files are processed in chunks: each chunk is analysed in parallel, then
/// its records are written to the DB before the next chunk starts, so
/// progress survives a crash and only one chunk of records is in memory.
/// Files that fail to decode are marked unreadable and skipped by later
/// runs unless `force` is set.
pub fn analyze_files(
    db: &Database,
    force: bool,
    jobs: usize,
    filter: Option<&str>,
    config: &AnalysisConfig,
) -> Result<AnalyzeResult, AnalyzeError> {
    let files = if force {
        db.get_all_files()?
    } else {
        db.get_unanalyzed_files()?
    };

    let files: Vec<MidiFile> = match filter {
        Some(pattern) => {
            let pattern_lower = pattern.to_lowercase();
            files
                .into_iter()
                .filter(|f| f.file_path.to_lowercase().contains(&pattern_lower))
                .collect()
        }
        None => files,
    };

    if files.is_empty() {
        log::info!("No files to analyze");
        return Ok(AnalyzeResult::default());
    }

    let jobs = jobs.max(1);
    log::info!("Analyzing {} files with {} workers", files.len(), jobs);

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-"),
    );

    let pool = rayon::ThreadPoolBuilder::new().num_threads(jobs).build()?;

    let mut result = AnalyzeResult::default();

    for chunk in files.chunks(jobs * 2) {
        let outcomes: Vec<_> = pool.install(|| {
            use rayon::prelude::*;
            chunk
                .par_iter()
                .map(|file| {
                    let outcome = analyze_file(Path::new(&file.file_path), &file.metadata(), config);
                    pb.inc(1);
                    (file, outcome)
                })
                .collect()
        });

        // Write this chunk's results in file order
        for (file, outcome) in outcomes {
            match outcome {
                FileOutcome::Analyzed(record) => match db.store_features(file.id, &record) {
                    Ok(()) => result.analyzed += 1,
                    Err(e) => {
                        log::error!("DB error storing features for {}: {}", file.file_path, e);
                        result.failed += 1;
                    }
                },
                FileOutcome::Unreadable { reason } => {
                    log::warn!("Unreadable MIDI file {}: {}", file.file_path, reason);
                    match db.mark_unreadable(file.id, &reason) {
                        Ok(()) => result.unreadable += 1,
                        Err(e) => {
                            log::error!("DB error marking {} unreadable: {}", file.file_path, e);
                            result.failed += 1;
                        }
                    }
                }
            }
        }

        pb.set_message(format!(
            "{} stored, {} unreadable",
            result.analyzed, result.unreadable
        ));
    }

    pb.finish_with_message(format!(
        "Done: {} analyzed, {} unreadable, {} failed",
        result.analyzed, result.unreadable, result.failed
    ));
    log::info!(
        "Analysis finished: {} analyzed, {} unreadable, {} failed",
        result.analyzed,
        result.unreadable,
        result.failed
    );

    Ok(result)
}
