use serde::Serialize;

/// A single sounding note, timed in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NoteEvent {
    pub pitch: u8,
    pub velocity: u8,
    pub start: f64,
    pub end: f64,
}

impl NoteEvent {
    pub fn new(pitch: u8, velocity: u8, start: f64, end: f64) -> Self {
        Self {
            pitch,
            velocity,
            start,
            end,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn pitch_class(&self) -> u8 {
        self.pitch % 12
    }
}

/// A pitch-wheel change. `value` is signed, centred on 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PitchBendEvent {
    pub time: f64,
    pub value: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TempoChange {
    pub time: f64,
    pub bpm: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeSignatureChange {
    pub time: f64,
    pub numerator: u8,
    pub denominator: u8,
}

/// One instrument track. Notes are kept sorted by start time and
/// pitch bends by time, whatever order they were supplied in.
#[derive(Debug, Clone)]
pub struct Track {
    pub name: Option<String>,
    pub is_percussive: bool,
    notes: Vec<NoteEvent>,
    pitch_bends: Vec<PitchBendEvent>,
}

impl Track {
    pub fn new(
        name: Option<String>,
        is_percussive: bool,
        mut notes: Vec<NoteEvent>,
        mut pitch_bends: Vec<PitchBendEvent>,
    ) -> Self {
        // Stable sort: notes sharing a start keep their file order
        notes.sort_by(|a, b| a.start.total_cmp(&b.start));
        pitch_bends.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self {
            name,
            is_percussive,
            notes,
            pitch_bends,
        }
    }

    pub fn notes(&self) -> &[NoteEvent] {
        &self.notes
    }

    pub fn pitch_bends(&self) -> &[PitchBendEvent] {
        &self.pitch_bends
    }

    fn last_event_time(&self) -> f64 {
        let note_end = self.notes.iter().map(|n| n.end).fold(0.0, f64::max);
        let bend_end = self.pitch_bends.iter().map(|b| b.time).fold(0.0, f64::max);
        note_end.max(bend_end)
    }
}

/// Decoded contents of one MIDI file: tracks in file order plus the
/// tempo and meter context.
#[derive(Debug, Clone, Default)]
pub struct Score {
    pub tracks: Vec<Track>,
    pub tempo_changes: Vec<TempoChange>,
    pub time_signatures: Vec<TimeSignatureChange>,
}

impl Score {
    /// First non-percussive track that has at least one note.
    pub fn primary_track(&self) -> Option<(usize, &Track)> {
        self.tracks
            .iter()
            .enumerate()
            .find(|(_, t)| !t.is_percussive && !t.notes.is_empty())
    }

    /// Every note of every non-percussive track, in no particular order.
    pub fn pitched_notes(&self) -> impl Iterator<Item = &NoteEvent> {
        self.tracks
            .iter()
            .filter(|t| !t.is_percussive)
            .flat_map(|t| t.notes.iter())
    }

    /// Time of the latest event in the file, in seconds.
    pub fn end_time(&self) -> f64 {
        let tracks = self.tracks.iter().map(Track::last_event_time).fold(0.0, f64::max);
        let tempo = self.tempo_changes.iter().map(|t| t.time).fold(0.0, f64::max);
        let meter = self.time_signatures.iter().map(|t| t.time).fold(0.0, f64::max);
        tracks.max(tempo).max(meter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pitched(notes: Vec<NoteEvent>) -> Track {
        Track::new(None, false, notes, Vec::new())
    }

    #[test]
    fn test_track_sorts_notes_by_start() {
        let t = pitched(vec![
            NoteEvent::new(67, 90, 2.0, 2.5),
            NoteEvent::new(60, 90, 0.0, 0.5),
            NoteEvent::new(64, 90, 1.0, 1.5),
        ]);
        let pitches: Vec<u8> = t.notes().iter().map(|n| n.pitch).collect();
        assert_eq!(pitches, vec![60, 64, 67]);
    }

    #[test]
    fn test_track_sort_is_stable_for_equal_starts() {
        let t = pitched(vec![
            NoteEvent::new(64, 90, 0.0, 1.0),
            NoteEvent::new(60, 90, 0.0, 1.0),
        ]);
        assert_eq!(t.notes()[0].pitch, 64);
        assert_eq!(t.notes()[1].pitch, 60);
    }

    #[test]
    fn test_pitch_bends_sorted_by_time() {
        let t = Track::new(
            None,
            false,
            Vec::new(),
            vec![
                PitchBendEvent { time: 0.3, value: 10 },
                PitchBendEvent { time: 0.1, value: -10 },
            ],
        );
        assert_eq!(t.pitch_bends()[0].value, -10);
    }

    #[test]
    fn test_primary_track_skips_drums_and_empty_tracks() {
        let score = Score {
            tracks: vec![
                Track::new(None, false, Vec::new(), Vec::new()),
                Track::new(None, true, vec![NoteEvent::new(36, 100, 0.0, 0.1)], Vec::new()),
                Track::new(
                    Some("Lead".to_string()),
                    false,
                    vec![NoteEvent::new(72, 100, 0.0, 0.5)],
                    Vec::new(),
                ),
                Track::new(None, false, vec![NoteEvent::new(48, 100, 0.0, 0.5)], Vec::new()),
            ],
            ..Default::default()
        };
        let (idx, track) = score.primary_track().unwrap();
        assert_eq!(idx, 2);
        assert_eq!(track.name.as_deref(), Some("Lead"));
    }

    #[test]
    fn test_primary_track_absent() {
        let score = Score {
            tracks: vec![Track::new(
                None,
                true,
                vec![NoteEvent::new(36, 100, 0.0, 0.1)],
                Vec::new(),
            )],
            ..Default::default()
        };
        assert!(score.primary_track().is_none());
        assert_eq!(score.pitched_notes().count(), 0);
    }

    #[test]
    fn test_end_time_covers_all_events() {
        let score = Score {
            tracks: vec![Track::new(
                None,
                false,
                vec![NoteEvent::new(60, 100, 0.0, 1.5)],
                vec![PitchBendEvent { time: 2.25, value: 0 }],
            )],
            ..Default::default()
        };
        assert_eq!(score.end_time(), 2.25);
        assert_eq!(Score::default().end_time(), 0.0);
    }
}
