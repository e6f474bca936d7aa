use super::events::{NoteEvent, PitchBendEvent, Score, TempoChange, TimeSignatureChange, Track};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// MIDI channel 10 (zero-based 9) is reserved for General MIDI percussion.
const PERCUSSION_CHANNEL: u8 = 9;

/// 120 BPM, the SMF default until the first tempo event.
const DEFAULT_USEC_PER_BEAT: u32 = 500_000;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("MIDI parse error: {0}")]
    MidiParse(String),
}

/// Read and decode a Standard MIDI File.
pub fn load_score(path: &Path) -> Result<Score, DecodeError> {
    let bytes = std::fs::read(path)?;
    decode_score(&bytes)
}

/// Notes and bends gathered from one channel of one SMF track.
struct ChannelPart {
    channel: u8,
    notes: Vec<NoteEvent>,
    pitch_bends: Vec<PitchBendEvent>,
}

/// Part for `channel`, created on first use so parts keep first-event order.
fn part_for(parts: &mut Vec<ChannelPart>, channel: u8) -> &mut ChannelPart {
    let idx = match parts.iter().position(|p| p.channel == channel) {
        Some(idx) => idx,
        None => {
            parts.push(ChannelPart {
                channel,
                notes: Vec::new(),
                pitch_bends: Vec::new(),
            });
            parts.len() - 1
        }
    };
    &mut parts[idx]
}

/// Decode SMF bytes into a `Score` with all times converted to seconds.
///
/// Each channel used in an SMF track becomes its own `Track`, so a
/// format 0 file mixing drums and keys yields a percussive track and a
/// pitched one. SMF tracks without channel events (conductor tracks)
/// produce no `Track`.
pub fn decode_score(bytes: &[u8]) -> Result<Score, DecodeError> {
    let smf = Smf::parse(bytes).map_err(|e| DecodeError::MidiParse(e.to_string()))?;
    let clock = TempoMap::from_smf(&smf);

    let mut tracks = Vec::with_capacity(smf.tracks.len());
    let mut tempo_changes = Vec::new();
    let mut time_signatures = Vec::new();

    for track in &smf.tracks {
        let mut tick: u64 = 0;
        let mut name = None;
        let mut parts: Vec<ChannelPart> = Vec::new();
        // (channel, key) -> open (onset_tick, velocity), most recent last
        let mut pending: HashMap<(u8, u8), Vec<(u64, u8)>> = HashMap::new();

        for event in track {
            tick += event.delta.as_int() as u64;

            match event.kind {
                TrackEventKind::Meta(MetaMessage::TrackName(bytes)) => {
                    name = Some(String::from_utf8_lossy(bytes).trim().to_string())
                        .filter(|n| !n.is_empty());
                }
                TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => {
                    tempo_changes.push(TempoChange {
                        time: clock.seconds(tick),
                        bpm: 60_000_000.0 / tempo.as_int() as f64,
                    });
                }
                TrackEventKind::Meta(MetaMessage::TimeSignature(num, denom_pow, _, _)) => {
                    time_signatures.push(TimeSignatureChange {
                        time: clock.seconds(tick),
                        numerator: num,
                        denominator: 1u8.checked_shl(denom_pow as u32).unwrap_or(0),
                    });
                }
                TrackEventKind::Midi { channel, message } => {
                    let ch = channel.as_int();
                    match message {
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            part_for(&mut parts, ch);
                            pending
                                .entry((ch, key.as_int()))
                                .or_default()
                                .push((tick, vel.as_int()));
                        }
                        // NoteOn with velocity 0 is a note-off
                        MidiMessage::NoteOff { key, .. } | MidiMessage::NoteOn { key, .. } => {
                            let pitch = key.as_int();
                            if let Some((onset, velocity)) =
                                pending.get_mut(&(ch, pitch)).and_then(|stack| stack.pop())
                            {
                                part_for(&mut parts, ch).notes.push(NoteEvent::new(
                                    pitch,
                                    velocity,
                                    clock.seconds(onset),
                                    clock.seconds(tick),
                                ));
                            }
                        }
                        MidiMessage::PitchBend { bend } => {
                            part_for(&mut parts, ch).pitch_bends.push(PitchBendEvent {
                                time: clock.seconds(tick),
                                value: bend.as_int(),
                            });
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        // Close notes still sounding when the track ends
        let mut unclosed: Vec<(u64, u8, u8, u8)> = pending
            .into_iter()
            .flat_map(|((ch, pitch), stack)| {
                stack.into_iter().map(move |(onset, vel)| (onset, ch, pitch, vel))
            })
            .collect();
        unclosed.sort_unstable();
        for (onset, ch, pitch, velocity) in unclosed {
            part_for(&mut parts, ch).notes.push(NoteEvent::new(
                pitch,
                velocity,
                clock.seconds(onset),
                clock.seconds(tick),
            ));
        }

        for part in parts {
            tracks.push(Track::new(
                name.clone(),
                part.channel == PERCUSSION_CHANNEL,
                part.notes,
                part.pitch_bends,
            ));
        }
    }

    // Format 1 files may repeat the conductor events in several tracks
    tempo_changes.sort_by(|a, b| a.time.total_cmp(&b.time));
    tempo_changes.dedup_by(|a, b| a.time == b.time && a.bpm == b.bpm);
    time_signatures.sort_by(|a, b| a.time.total_cmp(&b.time));
    time_signatures.dedup_by(|a, b| a.time == b.time);

    Ok(Score {
        tracks,
        tempo_changes,
        time_signatures,
    })
}

/// Piecewise-linear tick → seconds conversion built from every tempo
/// event in the file.
struct TempoMap {
    /// (start_tick, seconds_at_start_tick, seconds_per_tick), ascending by tick
    segments: Vec<(u64, f64, f64)>,
}

impl TempoMap {
    fn from_smf(smf: &Smf) -> Self {
        let ppq = match smf.header.timing {
            Timing::Metrical(ticks) => ticks.as_int().max(1) as f64,
            Timing::Timecode(fps, subframes) => {
                let ticks_per_sec = fps.as_f32() as f64 * subframes.max(1) as f64;
                return Self {
                    segments: vec![(0, 0.0, 1.0 / ticks_per_sec)],
                };
            }
        };

        let mut tempos: Vec<(u64, u32)> = Vec::new();
        for track in &smf.tracks {
            let mut tick: u64 = 0;
            for event in track {
                tick += event.delta.as_int() as u64;
                if let TrackEventKind::Meta(MetaMessage::Tempo(t)) = event.kind {
                    tempos.push((tick, t.as_int()));
                }
            }
        }
        tempos.sort_by_key(|&(tick, _)| tick);

        let sec_per_tick = |usec: u32| usec as f64 / 1_000_000.0 / ppq;
        let mut segments = vec![(0u64, 0.0, sec_per_tick(DEFAULT_USEC_PER_BEAT))];
        for (tick, usec) in tempos {
            let &(last_tick, last_secs, last_rate) = segments
                .last()
                .unwrap_or(&(0, 0.0, sec_per_tick(DEFAULT_USEC_PER_BEAT)));
            let secs = last_secs + (tick - last_tick) as f64 * last_rate;
            if tick == last_tick {
                segments.pop();
            }
            segments.push((tick, secs, sec_per_tick(usec)));
        }

        Self { segments }
    }

    fn seconds(&self, tick: u64) -> f64 {
        let idx = self.segments.partition_point(|&(start, _, _)| start <= tick);
        match idx.checked_sub(1).and_then(|i| self.segments.get(i)) {
            Some(&(start, secs, rate)) => secs + (tick - start) as f64 * rate,
            None => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::features::{extract, FileMetadata};
    use crate::config::AnalysisConfig;
    use midly::num::{u4, u7, u15, u24, u28};
    use midly::{Format, Header, PitchBend, TrackEvent};

    fn ev(delta: u32, kind: TrackEventKind<'static>) -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(delta),
            kind,
        }
    }

    fn note_on(delta: u32, channel: u8, key: u8, vel: u8) -> TrackEvent<'static> {
        ev(
            delta,
            TrackEventKind::Midi {
                channel: u4::new(channel),
                message: MidiMessage::NoteOn {
                    key: u7::new(key),
                    vel: u7::new(vel),
                },
            },
        )
    }

    fn note_off(delta: u32, channel: u8, key: u8) -> TrackEvent<'static> {
        ev(
            delta,
            TrackEventKind::Midi {
                channel: u4::new(channel),
                message: MidiMessage::NoteOff {
                    key: u7::new(key),
                    vel: u7::new(0),
                },
            },
        )
    }

    fn end() -> TrackEvent<'static> {
        ev(0, TrackEventKind::Meta(MetaMessage::EndOfTrack))
    }

    fn write(tracks: Vec<Vec<TrackEvent<'static>>>) -> Vec<u8> {
        let smf = Smf {
            header: Header::new(Format::Parallel, Timing::Metrical(u15::new(480))),
            tracks,
        };
        let mut bytes = Vec::new();
        smf.write(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_decode_notes_in_seconds_at_default_tempo() {
        // 480 ticks per beat at 120 BPM → one beat = 0.5 s
        let bytes = write(vec![vec![
            note_on(0, 0, 60, 100),
            note_off(480, 0, 60),
            note_on(0, 0, 64, 90),
            note_off(960, 0, 64),
            end(),
        ]]);
        let score = decode_score(&bytes).unwrap();
        assert_eq!(score.tracks.len(), 1);
        let notes = score.tracks[0].notes();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].pitch, 60);
        assert_eq!(notes[0].velocity, 100);
        assert!((notes[0].end - 0.5).abs() < 1e-9);
        assert!((notes[1].start - 0.5).abs() < 1e-9);
        assert!((notes[1].end - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_tempo_change_rescales_later_ticks() {
        // Conductor track: 60 BPM from tick 480 onward
        let conductor = vec![
            ev(0, TrackEventKind::Meta(MetaMessage::TimeSignature(3, 2, 24, 8))),
            ev(480, TrackEventKind::Meta(MetaMessage::Tempo(u24::new(1_000_000)))),
            end(),
        ];
        let melody = vec![note_on(480, 0, 60, 100), note_off(480, 0, 60), end()];
        let score = decode_score(&write(vec![conductor, melody])).unwrap();

        assert_eq!(score.tempo_changes.len(), 1);
        assert!((score.tempo_changes[0].bpm - 60.0).abs() < 1e-9);
        assert!((score.tempo_changes[0].time - 0.5).abs() < 1e-9);
        assert_eq!(score.time_signatures[0].numerator, 3);
        assert_eq!(score.time_signatures[0].denominator, 4);

        // The conductor track carries no channel events
        assert_eq!(score.tracks.len(), 1);
        let note = score.tracks[0].notes()[0];
        assert!((note.start - 0.5).abs() < 1e-9);
        assert!((note.end - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_velocity_zero_note_on_closes_note() {
        let bytes = write(vec![vec![note_on(0, 0, 62, 80), note_on(240, 0, 62, 0), end()]]);
        let score = decode_score(&bytes).unwrap();
        let notes = score.tracks[0].notes();
        assert_eq!(notes.len(), 1);
        assert!((notes[0].end - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_unclosed_note_ends_at_track_end() {
        let bytes = write(vec![vec![
            note_on(0, 0, 60, 80),
            ev(960, TrackEventKind::Meta(MetaMessage::EndOfTrack)),
        ]]);
        let score = decode_score(&bytes).unwrap();
        assert!((score.tracks[0].notes()[0].end - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_channel_ten_track_is_percussive() {
        let drums = vec![
            ev(0, TrackEventKind::Meta(MetaMessage::TrackName(b"Drums"))),
            note_on(0, 9, 36, 100),
            note_off(120, 9, 36),
            end(),
        ];
        let keys = vec![note_on(0, 0, 60, 100), note_off(120, 0, 60), end()];
        let score = decode_score(&write(vec![drums, keys])).unwrap();
        assert!(score.tracks[0].is_percussive);
        assert_eq!(score.tracks[0].name.as_deref(), Some("Drums"));
        assert!(!score.tracks[1].is_percussive);
        assert_eq!(score.primary_track().map(|(i, _)| i), Some(1));
    }

    #[test]
    fn test_format_zero_drums_split_from_melody() {
        // C-E-G on channel 1 interleaved with kick and snare on channel 10
        let bytes = write(vec![vec![
            ev(0, TrackEventKind::Meta(MetaMessage::TrackName(b"Loop"))),
            note_on(0, 0, 60, 100),
            note_on(0, 9, 36, 110),
            note_off(240, 9, 36),
            note_off(240, 0, 60),
            note_on(0, 0, 64, 100),
            note_on(0, 9, 38, 110),
            note_off(240, 9, 38),
            note_off(240, 0, 64),
            note_on(0, 0, 67, 100),
            note_off(480, 0, 67),
            end(),
        ]]);
        let score = decode_score(&bytes).unwrap();
        assert_eq!(score.tracks.len(), 2);

        let (idx, primary) = score.primary_track().unwrap();
        assert_eq!(idx, 0);
        assert!(!primary.is_percussive);
        assert_eq!(primary.name.as_deref(), Some("Loop"));
        let pitches: Vec<u8> = primary.notes().iter().map(|n| n.pitch).collect();
        assert_eq!(pitches, vec![60, 64, 67]);

        let drums = &score.tracks[1];
        assert!(drums.is_percussive);
        let hits: Vec<u8> = drums.notes().iter().map(|n| n.pitch).collect();
        assert_eq!(hits, vec![36, 38]);

        assert!(score.pitched_notes().all(|n| n.pitch >= 60));

        let record = extract(&score, &FileMetadata::default(), &AnalysisConfig::default());
        assert_eq!(record.harmonic.chord_outline, vec![0, 4, 7]);
        assert_eq!(record.polyphonic_density, 1);
        assert_eq!(record.instrument_type, "Loop");
    }

    #[test]
    fn test_pitch_bends_are_signed() {
        let bend = |delta: u32, value: i16| {
            ev(
                delta,
                TrackEventKind::Midi {
                    channel: u4::new(0),
                    message: MidiMessage::PitchBend {
                        bend: PitchBend::from_int(value),
                    },
                },
            )
        };
        let bytes = write(vec![vec![bend(0, -200), bend(48, 200), end()]]);
        let score = decode_score(&bytes).unwrap();
        let bends = score.tracks[0].pitch_bends();
        assert_eq!(bends.len(), 2);
        assert_eq!(bends[0].value, -200);
        assert_eq!(bends[1].value, 200);
    }

    #[test]
    fn test_garbage_bytes_are_a_parse_error() {
        let err = decode_score(b"not a midi file").unwrap_err();
        assert!(matches!(err, DecodeError::MidiParse(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_score(Path::new("/nonexistent/loop.mid")).unwrap_err();
        assert!(matches!(err, DecodeError::Io(_)));
    }
}
