use super::events::{NoteEvent, Score};
use super::stats::Histogram;
use serde::Serialize;

/// Set of pitch classes as a 12-bit mask (bit n = pitch class n).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PitchClassSet(u16);

impl PitchClassSet {
    pub const fn from_classes(classes: &[u8]) -> Self {
        let mut bits = 0u16;
        let mut i = 0;
        while i < classes.len() {
            bits |= 1 << (classes[i] % 12);
            i += 1;
        }
        Self(bits)
    }

    pub fn from_notes(notes: &[NoteEvent]) -> Self {
        notes.iter().map(NoteEvent::pitch_class).collect()
    }

    pub fn contains(&self, pitch_class: u8) -> bool {
        self.0 & (1 << (pitch_class % 12)) != 0
    }

    pub fn len(&self) -> u32 {
        self.0.count_ones()
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// |self − other| + |other − self|
    pub fn symmetric_distance(&self, other: &Self) -> u32 {
        (self.0 ^ other.0).count_ones()
    }

    /// Members in ascending order.
    pub fn to_vec(&self) -> Vec<u8> {
        (0..12).filter(|&pc| self.contains(pc)).collect()
    }
}

impl FromIterator<u8> for PitchClassSet {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        Self(iter.into_iter().fold(0, |bits, pc| bits | 1 << (pc % 12)))
    }
}

pub struct ChordTemplate {
    pub name: &'static str,
    pub classes: PitchClassSet,
}

pub struct ScaleTemplate {
    pub name: &'static str,
    pub classes: PitchClassSet,
}

/// Chord catalog in tie-break order: on equal distance the earlier entry wins.
pub const CHORD_TEMPLATES: [ChordTemplate; 4] = [
    ChordTemplate { name: "Major", classes: PitchClassSet::from_classes(&[0, 4, 7]) },
    ChordTemplate { name: "Minor", classes: PitchClassSet::from_classes(&[0, 3, 7]) },
    ChordTemplate { name: "Diminished", classes: PitchClassSet::from_classes(&[0, 3, 6]) },
    ChordTemplate { name: "Augmented", classes: PitchClassSet::from_classes(&[0, 4, 8]) },
];

/// Scales recognised by exact match.
pub const SCALE_TEMPLATES: [ScaleTemplate; 2] = [
    ScaleTemplate { name: "Major", classes: PitchClassSet::from_classes(&[0, 2, 4, 5, 7, 9, 11]) },
    ScaleTemplate {
        name: "Natural Minor",
        classes: PitchClassSet::from_classes(&[0, 2, 3, 5, 7, 8, 10]),
    },
];

/// C-rooted diatonic modes used for scale-usage counts.
pub const MODE_TEMPLATES: [ScaleTemplate; 7] = [
    ScaleTemplate { name: "major", classes: PitchClassSet::from_classes(&[0, 2, 4, 5, 7, 9, 11]) },
    ScaleTemplate { name: "minor", classes: PitchClassSet::from_classes(&[0, 2, 3, 5, 7, 8, 10]) },
    ScaleTemplate { name: "dorian", classes: PitchClassSet::from_classes(&[0, 2, 3, 5, 7, 9, 10]) },
    ScaleTemplate {
        name: "mixolydian",
        classes: PitchClassSet::from_classes(&[0, 2, 4, 5, 7, 9, 10]),
    },
    ScaleTemplate { name: "lydian", classes: PitchClassSet::from_classes(&[0, 2, 4, 6, 7, 9, 11]) },
    ScaleTemplate {
        name: "phrygian",
        classes: PitchClassSet::from_classes(&[0, 1, 3, 5, 7, 8, 10]),
    },
    ScaleTemplate { name: "locrian", classes: PitchClassSet::from_classes(&[0, 1, 3, 5, 6, 8, 10]) },
];

pub const UNKNOWN_SCALE: &str = "Unknown";

/// Nearest chord template by symmetric set difference.
///
/// A perfect match is reported with distance 1, never 0, so downstream
/// complexity scores always carry some weight.
pub fn closest_chord(classes: PitchClassSet) -> (&'static str, u32) {
    let mut best = &CHORD_TEMPLATES[0];
    let mut best_distance = classes.symmetric_distance(&best.classes);
    for template in &CHORD_TEMPLATES[1..] {
        let distance = classes.symmetric_distance(&template.classes);
        if distance < best_distance {
            best = template;
            best_distance = distance;
        }
    }
    (best.name, best_distance.max(1))
}

/// Scale name on exact set equality, otherwise `"Unknown"`.
pub fn closest_scale(classes: PitchClassSet) -> &'static str {
    SCALE_TEMPLATES
        .iter()
        .find(|t| t.classes == classes)
        .map_or(UNKNOWN_SCALE, |t| t.name)
}

/// Frequency of each pitch class (pitch mod 12).
pub fn pitch_class_histogram(notes: &[NoteEvent]) -> Histogram<u8> {
    notes.iter().map(NoteEvent::pitch_class).collect()
}

/// For each mode in `MODE_TEMPLATES`, how many notes fall inside it.
pub fn scale_usage(notes: &[NoteEvent]) -> Histogram<&'static str> {
    Histogram::from_counts(MODE_TEMPLATES.iter().map(|mode| {
        let count = notes.iter().filter(|n| mode.classes.contains(n.pitch_class())).count();
        (mode.name, count)
    }))
}

/// Lowest pitch class of every pitched track with at least `min_notes` notes.
pub fn root_notes(score: &Score, min_notes: usize) -> Histogram<u8> {
    score
        .tracks
        .iter()
        .filter(|t| !t.is_percussive && t.notes().len() >= min_notes)
        .filter_map(|t| t.notes().iter().map(|n| n.pitch).min())
        .map(|p| p % 12)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChordMatch {
    pub chord: String,
    pub complexity: u32,
}

/// Harmonic descriptors of the primary track plus file-wide root notes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HarmonicFeatures {
    pub pitch_classes: Histogram<u8>,
    /// Same counts as `pitch_classes`, under the bass-table column name.
    pub harmonic_role: Histogram<u8>,
    pub chord_outline: Vec<u8>,
    pub harmonic_complexity: Option<ChordMatch>,
    pub mode_or_scale: String,
    pub scale_usage: Histogram<&'static str>,
    pub unique_pitch_classes: usize,
    pub root_notes: Histogram<u8>,
    pub harmony_complexity: usize,
}

impl HarmonicFeatures {
    pub fn empty(root_notes: Histogram<u8>) -> Self {
        Self {
            pitch_classes: Histogram::default(),
            harmonic_role: Histogram::default(),
            chord_outline: Vec::new(),
            harmonic_complexity: None,
            mode_or_scale: UNKNOWN_SCALE.to_string(),
            scale_usage: Histogram::from_counts(MODE_TEMPLATES.iter().map(|m| (m.name, 0))),
            unique_pitch_classes: 0,
            harmony_complexity: root_notes.len(),
            root_notes,
        }
    }
}

pub fn analyze(notes: &[NoteEvent], root_notes: Histogram<u8>) -> HarmonicFeatures {
    let classes = PitchClassSet::from_notes(notes);
    let (chord, complexity) = closest_chord(classes);
    let pitch_classes = pitch_class_histogram(notes);
    HarmonicFeatures {
        harmonic_role: pitch_classes.clone(),
        pitch_classes,
        chord_outline: classes.to_vec(),
        harmonic_complexity: Some(ChordMatch {
            chord: chord.to_string(),
            complexity,
        }),
        mode_or_scale: closest_scale(classes).to_string(),
        scale_usage: scale_usage(notes),
        unique_pitch_classes: classes.len() as usize,
        harmony_complexity: root_notes.len(),
        root_notes,
    }
}
