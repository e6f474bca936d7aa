use super::events::PitchBendEvent;
use serde::Serialize;

/// A run of consecutive bend changes longer than this counts as vibrato.
const MIN_VIBRATO_STREAK: usize = 2;

/// Number of vibrato-like runs in a pitch-bend stream.
///
/// Walks the bends in time order, extending a streak while each value
/// differs from the one before. When a value repeats, a streak longer than
/// two changes (three or more distinct consecutive values) counts once
/// and the streak resets. A streak still open at the last event is not
/// counted.
pub fn vibrato_pattern_count(bends: &[PitchBendEvent]) -> usize {
    let mut sorted = bends.to_vec();
    sorted.sort_by(|a, b| a.time.total_cmp(&b.time));

    let mut patterns = 0;
    let mut streak = 0;
    let mut last: Option<i16> = None;
    for bend in &sorted {
        match last {
            Some(prev) if prev != bend.value => streak += 1,
            _ => {
                if streak > MIN_VIBRATO_STREAK {
                    patterns += 1;
                }
                streak = 0;
            }
        }
        last = Some(bend.value);
    }
    patterns
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrnamentFeatures {
    pub vibrato_patterns: usize,
}

impl OrnamentFeatures {
    pub fn empty() -> Self {
        Self { vibrato_patterns: 0 }
    }
}

pub fn analyze(bends: &[PitchBendEvent]) -> OrnamentFeatures {
    OrnamentFeatures {
        vibrato_patterns: vibrato_pattern_count(bends),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bends(values: &[i16]) -> Vec<PitchBendEvent> {
        values
            .iter()
            .enumerate()
            .map(|(i, &value)| PitchBendEvent { time: i as f64 * 0.01, value })
            .collect()
    }

    #[test]
    fn test_alternating_run_then_repeat_is_one_pattern() {
        assert_eq!(vibrato_pattern_count(&bends(&[100, -100, 100, -100, -100])), 1);
    }

    #[test]
    fn test_short_runs_do_not_count() {
        // Two changes only
        assert_eq!(vibrato_pattern_count(&bends(&[0, 50, 0, 0])), 0);
        assert_eq!(vibrato_pattern_count(&[]), 0);
        assert_eq!(vibrato_pattern_count(&bends(&[7])), 0);
    }

    #[test]
    fn test_unterminated_streak_is_not_counted() {
        assert_eq!(vibrato_pattern_count(&bends(&[1, 2, 3, 4, 5])), 0);
    }

    #[test]
    fn test_multiple_patterns() {
        let v = [0, 10, 0, 10, 10, 20, 0, 20, 0, 0];
        assert_eq!(vibrato_pattern_count(&bends(&v)), 2);
    }

    #[test]
    fn test_sorts_by_time_first() {
        let mut b = bends(&[100, -100, 100, -100, -100]);
        b.reverse();
        // Reversed input: after sorting it is the original sequence
        assert_eq!(vibrato_pattern_count(&b), 1);
    }
}
