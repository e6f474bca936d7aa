use super::events::NoteEvent;
use super::stats::{self, Histogram};
use serde::{Serialize, Serializer};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Count of notes whose start, rounded half-to-even to whole seconds,
/// lands on phase 1 or 3 of a four-phase cycle.
///
/// An ordinal displacement signal only; it does not consult the meter.
pub fn syncopation_count(notes: &[NoteEvent]) -> usize {
    notes
        .iter()
        .filter(|n| {
            let phase = (n.start.round_ties_even() as i64).rem_euclid(4);
            phase == 1 || phase == 3
        })
        .count()
}

/// Count of notes starting in the second half of a second.
pub fn late_onset_count(notes: &[NoteEvent]) -> usize {
    notes
        .iter()
        .filter(|n| n.start.rem_euclid(1.0) > 0.5)
        .count()
}

/// Balance between held and detached notes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LegatoBalance {
    OnlyLegato,
    OnlyStaccato,
    NoNotes,
    /// legato count / staccato count
    Ratio(f64),
}

impl LegatoBalance {
    pub fn label(&self) -> Option<&'static str> {
        match self {
            Self::OnlyLegato => Some("Only Legato"),
            Self::OnlyStaccato => Some("Only Staccato"),
            Self::NoNotes => Some("No Notes"),
            Self::Ratio(_) => None,
        }
    }
}

impl Serialize for LegatoBalance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match (self, self.label()) {
            (Self::Ratio(r), _) => serializer.serialize_f64(*r),
            (_, Some(label)) => serializer.serialize_str(label),
            (_, None) => serializer.serialize_none(),
        }
    }
}

/// Notes lasting at least `threshold_secs` are legato, the rest staccato.
pub fn legato_staccato_ratio(notes: &[NoteEvent], threshold_secs: f64) -> LegatoBalance {
    let legato = notes.iter().filter(|n| n.duration() >= threshold_secs).count();
    let staccato = notes.len() - legato;
    match (legato, staccato) {
        (0, 0) => LegatoBalance::NoNotes,
        (_, 0) => LegatoBalance::OnlyLegato,
        (0, _) => LegatoBalance::OnlyStaccato,
        (l, s) => LegatoBalance::Ratio(l as f64 / s as f64),
    }
}

/// Ordering wrapper so note end times can live in a `BinaryHeap`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct EndTime(f64);

impl Eq for EndTime {}

impl PartialOrd for EndTime {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EndTime {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Maximum number of notes sounding at once across `notes`.
///
/// Sweeps intervals by start time with a min-heap of active end times;
/// a note ending exactly when another starts does not overlap it.
pub fn polyphonic_density<'a>(notes: impl IntoIterator<Item = &'a NoteEvent>) -> usize {
    let mut intervals: Vec<(f64, f64)> = notes.into_iter().map(|n| (n.start, n.end)).collect();
    intervals.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut active: BinaryHeap<Reverse<EndTime>> = BinaryHeap::new();
    let mut max_active = 0;
    for (start, end) in intervals {
        while active.peek().is_some_and(|Reverse(EndTime(e))| *e <= start) {
            active.pop();
        }
        active.push(Reverse(EndTime(end)));
        max_active = max_active.max(active.len());
    }
    max_active
}

/// Gap from each note's end to the next note's start. Negative values
/// mean the notes overlap and are kept as-is.
pub fn rest_durations(notes: &[NoteEvent]) -> Vec<f64> {
    notes.windows(2).map(|w| w[1].start - w[0].end).collect()
}

/// Frequency of each exact note duration.
pub fn groove_histogram(notes: &[NoteEvent]) -> Histogram<f64> {
    notes.iter().map(NoteEvent::duration).collect()
}

/// Rhythm, timing and dynamics descriptors of the primary track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RhythmicFeatures {
    pub total_notes: usize,
    pub unique_notes: usize,
    pub note_length_mean: Option<f64>,
    pub note_length_std: Option<f64>,
    pub velocity_mean: Option<f64>,
    pub velocity_std: Option<f64>,
    pub start_time_mean: Option<f64>,
    pub start_time_std: Option<f64>,
    pub end_time_mean: Option<f64>,
    pub end_time_std: Option<f64>,
    pub syncopation_count: usize,
    pub late_onset_count: usize,
    pub legato_ratio: LegatoBalance,
    pub rest_durations: Vec<f64>,
    pub groove_patterns: Histogram<f64>,
    pub dynamics: Histogram<i32>,
    pub dynamic_range: Option<i32>,
    pub note_density: Option<f64>,
    pub is_polyphonic: bool,
}

impl RhythmicFeatures {
    pub fn empty() -> Self {
        Self {
            total_notes: 0,
            unique_notes: 0,
            note_length_mean: None,
            note_length_std: None,
            velocity_mean: None,
            velocity_std: None,
            start_time_mean: None,
            start_time_std: None,
            end_time_mean: None,
            end_time_std: None,
            syncopation_count: 0,
            late_onset_count: 0,
            legato_ratio: LegatoBalance::NoNotes,
            rest_durations: Vec::new(),
            groove_patterns: Histogram::default(),
            dynamics: Histogram::default(),
            dynamic_range: None,
            note_density: None,
            is_polyphonic: false,
        }
    }
}

pub fn analyze(notes: &[NoteEvent], file_duration: f64, legato_threshold: f64) -> RhythmicFeatures {
    let lengths: Vec<f64> = notes.iter().map(NoteEvent::duration).collect();
    let velocities: Vec<f64> = notes.iter().map(|n| n.velocity as f64).collect();
    let starts: Vec<f64> = notes.iter().map(|n| n.start).collect();
    let ends: Vec<f64> = notes.iter().map(|n| n.end).collect();

    let mut pitches: Vec<u8> = notes.iter().map(|n| n.pitch).collect();
    pitches.sort_unstable();
    pitches.dedup();

    // Notes are start-sorted, so shared onsets are adjacent
    let is_polyphonic = notes.windows(2).any(|w| w[0].start == w[1].start);

    let dynamic_range = match (
        notes.iter().map(|n| n.velocity).max(),
        notes.iter().map(|n| n.velocity).min(),
    ) {
        (Some(hi), Some(lo)) => Some(hi as i32 - lo as i32),
        _ => None,
    };

    let note_density = if file_duration > 0.0 {
        Some(notes.len() as f64 / file_duration)
    } else {
        None
    };

    RhythmicFeatures {
        total_notes: notes.len(),
        unique_notes: pitches.len(),
        note_length_mean: stats::mean(&lengths),
        note_length_std: stats::std_dev(&lengths),
        velocity_mean: stats::mean(&velocities),
        velocity_std: stats::std_dev(&velocities),
        start_time_mean: stats::mean(&starts),
        start_time_std: stats::std_dev(&starts),
        end_time_mean: stats::mean(&ends),
        end_time_std: stats::std_dev(&ends),
        syncopation_count: syncopation_count(notes),
        late_onset_count: late_onset_count(notes),
        legato_ratio: legato_staccato_ratio(notes, legato_threshold),
        rest_durations: rest_durations(notes),
        groove_patterns: groove_histogram(notes),
        dynamics: notes.iter().map(|n| n.velocity as i32).collect(),
        dynamic_range,
        note_density,
        is_polyphonic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(start: f64, end: f64) -> NoteEvent {
        NoteEvent::new(60, 100, start, end)
    }

    #[test]
    fn test_polyphony_overlap() {
        let notes = [span(0.0, 2.0), span(1.0, 3.0), span(2.0, 4.0)];
        assert_eq!(polyphonic_density(&notes), 2);
    }

    #[test]
    fn test_polyphony_touching_intervals_do_not_overlap() {
        assert_eq!(polyphonic_density(&[span(0.0, 1.0), span(1.0, 2.0)]), 1);
    }

    #[test]
    fn test_polyphony_chord_and_unsorted_input() {
        let notes = [
            span(4.0, 5.0),
            span(0.0, 1.0),
            span(0.0, 1.0),
            span(0.5, 4.5),
            span(0.0, 0.25),
        ];
        // The short note ends before the long one starts, so at most three overlap
        assert_eq!(polyphonic_density(&notes), 3);
        let none: [NoteEvent; 0] = [];
        assert_eq!(polyphonic_density(&none), 0);
    }

    #[test]
    fn test_syncopation_rounds_half_to_even() {
        // round: 1.0→1 (hit), 2.5→2, 3.4→3 (hit), 0.5→0, 1.5→2, 5.2→5 (hit)
        let notes: Vec<NoteEvent> = [1.0, 2.5, 3.4, 0.5, 1.5, 5.2]
            .iter()
            .map(|&s| span(s, s + 0.1))
            .collect();
        assert_eq!(syncopation_count(&notes), 3);
    }

    #[test]
    fn test_late_onsets() {
        let notes: Vec<NoteEvent> = [0.5, 0.75, 1.9, 2.0].iter().map(|&s| span(s, s + 0.1)).collect();
        assert_eq!(late_onset_count(&notes), 2);
    }

    #[test]
    fn test_legato_sentinels_and_ratio() {
        assert_eq!(legato_staccato_ratio(&[], 0.5), LegatoBalance::NoNotes);
        assert_eq!(
            legato_staccato_ratio(&[span(0.0, 0.5), span(1.0, 2.0)], 0.5),
            LegatoBalance::OnlyLegato
        );
        assert_eq!(
            legato_staccato_ratio(&[span(0.0, 0.1)], 0.5),
            LegatoBalance::OnlyStaccato
        );
        let notes = [span(0.0, 1.0), span(1.0, 2.0), span(2.0, 2.1), span(3.0, 3.2)];
        assert_eq!(legato_staccato_ratio(&notes, 0.5), LegatoBalance::Ratio(1.0));
    }

    #[test]
    fn test_legato_serialization() {
        assert_eq!(serde_json::to_string(&LegatoBalance::OnlyLegato).unwrap(), r#""Only Legato""#);
        assert_eq!(serde_json::to_string(&LegatoBalance::Ratio(2.5)).unwrap(), "2.5");
    }

    #[test]
    fn test_rest_durations_keep_negative_gaps() {
        let notes = [span(0.0, 1.0), span(1.5, 2.0), span(1.75, 3.0)];
        assert_eq!(rest_durations(&notes), vec![0.5, -0.25]);
        assert!(rest_durations(&notes[..1]).is_empty());
    }

    #[test]
    fn test_groove_histogram() {
        let notes = [span(0.0, 0.5), span(1.0, 1.5), span(2.0, 2.25)];
        let h = groove_histogram(&notes);
        assert_eq!(h.get(0.5), 2);
        assert_eq!(h.get(0.25), 1);
    }

    #[test]
    fn test_analyze_statistics() {
        let notes = [
            NoteEvent::new(60, 80, 0.0, 0.5),
            NoteEvent::new(64, 100, 0.0, 0.5),
            NoteEvent::new(60, 120, 1.0, 2.0),
        ];
        let f = analyze(&notes, 4.0, 0.5);
        assert_eq!(f.total_notes, 3);
        assert_eq!(f.unique_notes, 2);
        assert_eq!(f.velocity_mean, Some(100.0));
        assert_eq!(f.dynamic_range, Some(40));
        assert_eq!(f.note_density, Some(0.75));
        assert!(f.is_polyphonic);
        assert_eq!(f.dynamics.get(80), 1);
        assert_eq!(f.legato_ratio, LegatoBalance::OnlyLegato);
    }

    #[test]
    fn test_single_note_has_no_spread() {
        let f = analyze(&[span(0.0, 1.0)], 0.0, 0.5);
        assert_eq!(f.note_length_mean, Some(1.0));
        assert_eq!(f.note_length_std, None);
        assert_eq!(f.note_density, None);
        assert!(!f.is_polyphonic);
    }
}
