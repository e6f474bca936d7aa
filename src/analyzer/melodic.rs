use super::events::NoteEvent;
use super::stats::Histogram;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Net direction of a melodic line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Contour {
    Ascending,
    Descending,
    Random,
    NoArp,
}

impl fmt::Display for Contour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ascending => "Ascending",
            Self::Descending => "Descending",
            Self::Random => "Random",
            Self::NoArp => "NoArp",
        })
    }
}

/// Signed semitone steps between consecutive notes.
pub fn interval_sequence(notes: &[NoteEvent]) -> Vec<i32> {
    notes
        .windows(2)
        .map(|w| w[1].pitch as i32 - w[0].pitch as i32)
        .collect()
}

/// Majority direction of adjacent steps. Equal counts give `Random`;
/// an empty line gives `NoArp`.
pub fn classify_contour(notes: &[NoteEvent]) -> Contour {
    if notes.is_empty() {
        return Contour::NoArp;
    }
    let (mut up, mut down) = (0usize, 0usize);
    for w in notes.windows(2) {
        if w[1].pitch > w[0].pitch {
            up += 1;
        } else if w[1].pitch < w[0].pitch {
            down += 1;
        }
    }
    match up.cmp(&down) {
        std::cmp::Ordering::Greater => Contour::Ascending,
        std::cmp::Ordering::Less => Contour::Descending,
        std::cmp::Ordering::Equal => Contour::Random,
    }
}

/// Strict local maxima and minima. Plateaus count as neither.
pub fn peaks_and_troughs(notes: &[NoteEvent]) -> (usize, usize) {
    let (mut peaks, mut troughs) = (0, 0);
    for w in notes.windows(3) {
        let (prev, cur, next) = (w[0].pitch, w[1].pitch, w[2].pitch);
        if cur > prev && cur > next {
            peaks += 1;
        } else if cur < prev && cur < next {
            troughs += 1;
        }
    }
    (peaks, troughs)
}

/// A recurring interval pattern and how many windows contained it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Motif {
    pub intervals: Vec<i32>,
    pub count: usize,
}

/// Every contiguous run of at least `min_length` intervals that occurs more
/// than once (overlapping occurrences included), in order of first
/// appearance.
///
/// Enumerates all O(n²) windows. Loop tracks are a few hundred notes; a
/// suffix-array approach would be needed for much longer input.
pub fn detect_motifs(intervals: &[i32], min_length: usize) -> Vec<Motif> {
    let min_length = min_length.max(1);
    let mut index: HashMap<&[i32], usize> = HashMap::new();
    let mut counted: Vec<(&[i32], usize)> = Vec::new();

    for start in 0..intervals.len() {
        for end in (start + min_length)..=intervals.len() {
            let window = &intervals[start..end];
            match index.get(window) {
                Some(&slot) => counted[slot].1 += 1,
                None => {
                    index.insert(window, counted.len());
                    counted.push((window, 1));
                }
            }
        }
    }

    counted
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(window, count)| Motif {
            intervals: window.to_vec(),
            count,
        })
        .collect()
}

/// Counts of each run of three consecutive pitches, keyed `"a,b,c"`.
pub fn pitch_trigrams(notes: &[NoteEvent]) -> Vec<(String, usize)> {
    let mut order: Vec<(String, usize)> = Vec::new();
    let mut index: HashMap<[u8; 3], usize> = HashMap::new();
    for w in notes.windows(3) {
        let key = [w[0].pitch, w[1].pitch, w[2].pitch];
        match index.get(&key) {
            Some(&slot) => order[slot].1 += 1,
            None => {
                index.insert(key, order.len());
                order.push((format!("{},{},{}", key[0], key[1], key[2]), 1));
            }
        }
    }
    order
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MelodicFeatures {
    pub contour: Contour,
    pub note_intervals: Vec<i32>,
    pub melodic_intervals: Vec<i32>,
    pub interval_histogram: Histogram<i32>,
    pub melodic_peaks: usize,
    pub melodic_troughs: usize,
    pub melodic_range: Option<i32>,
    pub repetitive_patterns: Vec<Motif>,
    pub pitch_trigrams: Vec<(String, usize)>,
}

impl MelodicFeatures {
    pub fn empty() -> Self {
        Self {
            contour: Contour::NoArp,
            note_intervals: Vec::new(),
            melodic_intervals: Vec::new(),
            interval_histogram: Histogram::default(),
            melodic_peaks: 0,
            melodic_troughs: 0,
            melodic_range: None,
            repetitive_patterns: Vec::new(),
            pitch_trigrams: Vec::new(),
        }
    }
}

pub fn analyze(notes: &[NoteEvent], motif_min_length: usize) -> MelodicFeatures {
    let note_intervals = interval_sequence(notes);
    let melodic_intervals: Vec<i32> = note_intervals.iter().map(|i| i.abs()).collect();
    let (melodic_peaks, melodic_troughs) = peaks_and_troughs(notes);
    let melodic_range = match (
        notes.iter().map(|n| n.pitch).max(),
        notes.iter().map(|n| n.pitch).min(),
    ) {
        (Some(hi), Some(lo)) => Some(hi as i32 - lo as i32),
        _ => None,
    };

    MelodicFeatures {
        contour: classify_contour(notes),
        interval_histogram: note_intervals.iter().copied().collect(),
        repetitive_patterns: detect_motifs(&melodic_intervals, motif_min_length),
        pitch_trigrams: pitch_trigrams(notes),
        note_intervals,
        melodic_intervals,
        melodic_peaks,
        melodic_troughs,
        melodic_range,
    }
}
