use super::events::Score;
use super::harmonic::{self, HarmonicFeatures};
use super::melodic::{self, MelodicFeatures};
use super::ornament::{self, OrnamentFeatures};
use super::rhythmic::{self, RhythmicFeatures};
use crate::config::AnalysisConfig;
use serde::Serialize;

/// Instrument label used when a file has no pitched track with notes.
pub const NO_INSTRUMENT: &str = "No String";

/// Metadata resolved outside the engine (folder layout, file name).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FileMetadata {
    pub file_name: String,
    /// Folder key label such as `C_major`.
    pub key_signature: Option<String>,
    pub instrument_role: Option<String>,
    pub filename_tempo: Option<u32>,
    pub filename_chord: Option<String>,
    pub filename_mode: Option<String>,
}

/// Every descriptor extracted from one file, flattened to one level when
/// serialized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRecord {
    pub file_name: String,
    pub key_signature: Option<String>,
    pub key_scale: Option<String>,
    pub modality: Option<String>,
    pub instrument_role: Option<String>,
    pub tempo: Option<u32>,
    pub filename_chord: Option<String>,
    pub filename_mode: Option<String>,

    pub duration: f64,
    pub time_signature: Option<String>,
    pub midi_tempo_bpm: Option<f64>,
    pub track_count: usize,
    pub primary_track_index: Option<usize>,
    pub instrument_type: String,
    pub polyphonic_density: usize,

    #[serde(flatten)]
    pub harmonic: HarmonicFeatures,
    #[serde(flatten)]
    pub melodic: MelodicFeatures,
    #[serde(flatten)]
    pub rhythmic: RhythmicFeatures,
    #[serde(flatten)]
    pub ornament: OrnamentFeatures,
}

impl FeatureRecord {
    /// Flat name → value view of the record.
    pub fn to_flat_map(&self) -> serde_json::Result<serde_json::Map<String, serde_json::Value>> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            other => Ok(std::iter::once(("value".to_string(), other)).collect()),
        }
    }
}

/// Split a `C_major`-style label into scale and modality on the first `_`.
fn split_key_label(label: Option<&str>) -> (Option<String>, Option<String>) {
    match label {
        Some(l) => match l.split_once('_') {
            Some((scale, mode)) => (Some(scale.to_string()), Some(mode.to_string())),
            None => (Some(l.to_string()), None),
        },
        None => (None, None),
    }
}

/// Run every analyzer over the score and merge the results.
///
/// Never fails: a score with no primary track still yields a record, with
/// each analyzer's empty defaults.
pub fn extract(score: &Score, meta: &FileMetadata, config: &AnalysisConfig) -> FeatureRecord {
    let duration = score.end_time();
    let root_notes = harmonic::root_notes(score, config.root_note_min_notes);
    let primary = score.primary_track();

    let (harmonic, melodic, rhythmic, ornament) = match primary {
        Some((_, track)) => (
            harmonic::analyze(track.notes(), root_notes),
            melodic::analyze(track.notes(), config.motif_min_length),
            rhythmic::analyze(track.notes(), duration, config.legato_threshold_secs),
            ornament::analyze(track.pitch_bends()),
        ),
        None => (
            HarmonicFeatures::empty(root_notes),
            MelodicFeatures::empty(),
            RhythmicFeatures::empty(),
            OrnamentFeatures::empty(),
        ),
    };

    let instrument_type = match primary {
        Some((idx, track)) => track
            .name
            .clone()
            .unwrap_or_else(|| format!("Track {}", idx + 1)),
        None => NO_INSTRUMENT.to_string(),
    };

    let (key_scale, modality) = split_key_label(meta.key_signature.as_deref());

    FeatureRecord {
        file_name: meta.file_name.clone(),
        key_signature: meta.key_signature.clone(),
        key_scale,
        modality,
        instrument_role: meta.instrument_role.clone(),
        tempo: meta.filename_tempo,
        filename_chord: meta.filename_chord.clone(),
        filename_mode: meta.filename_mode.clone(),
        duration,
        time_signature: score
            .time_signatures
            .first()
            .map(|ts| format!("{}/{}", ts.numerator, ts.denominator)),
        midi_tempo_bpm: score.tempo_changes.first().map(|t| t.bpm),
        track_count: score.tracks.len(),
        primary_track_index: primary.map(|(idx, _)| idx),
        instrument_type,
        polyphonic_density: rhythmic::polyphonic_density(score.pitched_notes()),
        harmonic,
        melodic,
        rhythmic,
        ornament,
    }
}
