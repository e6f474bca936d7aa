use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

/// Metadata inferred from where a MIDI file sits and what it is called.
#[derive(Debug, Default, PartialEq)]
pub struct ParsedPath {
    /// Key folder label such as `C_major`.
    pub key_signature: Option<String>,
    /// Instrument-role folder such as `Arp` or `Bass`.
    pub instrument_role: Option<String>,
    pub tempo: Option<u32>,
    pub chord: Option<String>,
    pub mode: Option<String>,
}

// Explicit tempo token: "120bpm", "95 BPM"
static BPM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?P<bpm>\d+)\s*bpm\b").unwrap());

// Chord root plus quality: "Cmaj", "F#min", "Bbmaj"
static CHORD_MODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?P<chord>[A-Ga-g]#?b?)(?P<mode>maj|min)").unwrap());

static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

/// Bare numbers at or below this are too slow to be a loop tempo.
const MIN_BARE_TEMPO: u32 = 40;

/// Tempo from the file name: an explicit `bpm` token, else the first bare
/// number above 40.
pub fn parse_tempo(file_name: &str) -> Option<u32> {
    if let Some(caps) = BPM_RE.captures(file_name) {
        if let Some(bpm) = caps.name("bpm").and_then(|m| m.as_str().parse().ok()) {
            return Some(bpm);
        }
    }
    DIGITS_RE
        .find_iter(file_name)
        .filter_map(|m| m.as_str().parse::<u32>().ok())
        .find(|&n| n > MIN_BARE_TEMPO)
}

/// Chord root and `maj`/`min` quality embedded in the file name.
pub fn parse_chord_mode(file_name: &str) -> Option<(String, String)> {
    let caps = CHORD_MODE_RE.captures(file_name)?;
    Some((caps["chord"].to_string(), caps["mode"].to_string()))
}

/// Parse a file under a scan root laid out as `<root>/<key>/<role>/*.mid`.
///
/// The two directories nearest the file are taken as key and role. A file
/// one level below the root only gets a key; a file directly in the root
/// gets neither.
pub fn parse_path(root: &Path, path: &Path) -> ParsedPath {
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default();

    let dirs: Vec<&str> = path
        .parent()
        .and_then(|parent| parent.strip_prefix(root).ok())
        .map(|rel| {
            rel.components()
                .filter_map(|c| c.as_os_str().to_str())
                .collect()
        })
        .unwrap_or_default();

    let (key_signature, instrument_role) = match dirs.as_slice() {
        [] => (None, None),
        [key] => (Some(key.to_string()), None),
        [.., key, role] => (Some(key.to_string()), Some(role.to_string())),
    };

    let (chord, mode) = match parse_chord_mode(file_name) {
        Some((chord, mode)) => (Some(chord), Some(mode)),
        None => (None, None),
    };

    ParsedPath {
        key_signature,
        instrument_role,
        tempo: parse_tempo(file_name),
        chord,
        mode,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_full_layout() {
        let root = PathBuf::from("/loops");
        let p = PathBuf::from("/loops/C_major/Arp/arp_120 bpm_Cmaj.mid");
        let r = parse_path(&root, &p);
        assert_eq!(r.key_signature.as_deref(), Some("C_major"));
        assert_eq!(r.instrument_role.as_deref(), Some("Arp"));
        assert_eq!(r.tempo, Some(120));
        assert_eq!(r.chord.as_deref(), Some("C"));
        assert_eq!(r.mode.as_deref(), Some("maj"));
    }

    #[test]
    fn test_deeper_nesting_uses_nearest_dirs() {
        let root = PathBuf::from("/loops");
        let p = PathBuf::from("/loops/pack1/A_minor/Bass/bassline.mid");
        let r = parse_path(&root, &p);
        assert_eq!(r.key_signature.as_deref(), Some("A_minor"));
        assert_eq!(r.instrument_role.as_deref(), Some("Bass"));
    }

    #[test]
    fn test_shallow_layouts() {
        let root = PathBuf::from("/loops");
        let r = parse_path(&root, &PathBuf::from("/loops/D_minor/riff.mid"));
        assert_eq!(r.key_signature.as_deref(), Some("D_minor"));
        assert_eq!(r.instrument_role, None);

        let r = parse_path(&root, &PathBuf::from("/loops/riff.mid"));
        assert_eq!(r, ParsedPath::default());
    }

    #[test]
    fn test_path_outside_root() {
        let r = parse_path(&PathBuf::from("/loops"), &PathBuf::from("/elsewhere/X/Y/z.mid"));
        assert_eq!(r.key_signature, None);
        assert_eq!(r.instrument_role, None);
    }

    #[test]
    fn test_tempo_bpm_token() {
        assert_eq!(parse_tempo("Pad 95BPM.mid"), Some(95));
        assert_eq!(parse_tempo("lead_140 bpm.mid"), Some(140));
    }

    #[test]
    fn test_tempo_bare_number_fallback() {
        // "bpm" glued to "_" has no word boundary; falls back to bare numbers
        assert_eq!(parse_tempo("arp_120bpm_Cmaj.mid"), Some(120));
        // 8 and 16 are too small; 128 is the first plausible tempo
        assert_eq!(parse_tempo("8bar_16th_128_Am.mid"), Some(128));
        assert_eq!(parse_tempo("loop_03.mid"), None);
        assert_eq!(parse_tempo("melody.mid"), None);
    }

    #[test]
    fn test_chord_mode() {
        assert_eq!(
            parse_chord_mode("stab_F#min_90.mid"),
            Some(("F#".to_string(), "min".to_string()))
        );
        assert_eq!(
            parse_chord_mode("Bbmaj7 chords.mid"),
            Some(("Bb".to_string(), "maj".to_string()))
        );
        assert_eq!(parse_chord_mode("ambient_pad.mid"), None);
    }
}
