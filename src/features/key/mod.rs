//! Key context for harmonic decoding
//!
//! - [`Key`]: major/minor key on a tonic pitch class
//! - Krumhansl-Kessler profile templates (24 keys)
//! - Global key estimation by profile correlation

pub mod detector;
pub mod templates;

pub use detector::{estimate_key, KeyEstimate};
pub use templates::KeyTemplates;

use serde::{Deserialize, Serialize};

/// Pitch-class names using sharps
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

const MAJOR_SCALE: [u8; 7] = [0, 2, 4, 5, 7, 9, 11];
// Natural minor plus the raised leading tone (harmonic minor's V and vii°)
const MINOR_SCALE: [u8; 8] = [0, 2, 3, 5, 7, 8, 10, 11];

/// Musical key
///
/// Configured and serialized as its name (`"C"`, `"F#m"`, `"Bb"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Key {
    /// Major key (0 = C, 1 = C#, ..., 11 = B)
    Major(u32),
    /// Minor key (0 = C, 1 = C#, ..., 11 = B)
    Minor(u32),
}

impl Key {
    /// Tonic pitch class (0-11)
    pub fn tonic(&self) -> u8 {
        match self {
            Key::Major(i) | Key::Minor(i) => (*i % 12) as u8,
        }
    }

    /// Whether this is a minor key
    pub fn is_minor(&self) -> bool {
        matches!(self, Key::Minor(_))
    }

    /// Key name in musical notation (e.g., "C", "Am", "F#", "D#m")
    ///
    /// # Example
    ///
    /// ```
    /// use stratum_structure::features::key::Key;
    ///
    /// assert_eq!(Key::Major(0).name(), "C");
    /// assert_eq!(Key::Minor(9).name(), "Am");
    /// assert_eq!(Key::Minor(1).name(), "C#m");
    /// ```
    pub fn name(&self) -> String {
        let note = NOTE_NAMES[self.tonic() as usize];
        match self {
            Key::Major(_) => note.to_string(),
            Key::Minor(_) => format!("{}m", note),
        }
    }

    /// Parse a key name: tonic letter, optional `#`/`b`, optional `m`/`min`/`minor`
    ///
    /// # Example
    ///
    /// ```
    /// use stratum_structure::features::key::Key;
    ///
    /// assert_eq!(Key::from_name("Bb"), Some(Key::Major(10)));
    /// assert_eq!(Key::from_name("f#m"), Some(Key::Minor(6)));
    /// assert_eq!(Key::from_name("H"), None);
    /// ```
    pub fn from_name(name: &str) -> Option<Self> {
        let (tonic, rest) = parse_pitch_class(name.trim())?;
        match rest.to_ascii_lowercase().as_str() {
            "" | "maj" | "major" => Some(Key::Major(tonic as u32)),
            "m" | "min" | "minor" => Some(Key::Minor(tonic as u32)),
            _ => None,
        }
    }

    /// Pitch classes of the key's scale
    ///
    /// Minor keys include the raised leading tone so the dominant major chord
    /// counts as diatonic.
    pub fn scale_pitch_classes(&self) -> Vec<u8> {
        let steps: &[u8] = match self {
            Key::Major(_) => &MAJOR_SCALE,
            Key::Minor(_) => &MINOR_SCALE,
        };
        steps.iter().map(|s| (self.tonic() + s) % 12).collect()
    }

    /// Whether every pitch class in `pitch_classes` belongs to the scale
    pub fn contains_all(&self, pitch_classes: &[u8]) -> bool {
        let scale = self.scale_pitch_classes();
        pitch_classes.iter().all(|pc| scale.contains(&(pc % 12)))
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

impl TryFrom<String> for Key {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Key::from_name(&value).ok_or_else(|| format!("unrecognized key name: {:?}", value))
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.name()
    }
}

/// Parse a leading pitch-class name, returning it and the unparsed remainder
pub(crate) fn parse_pitch_class(s: &str) -> Option<(u8, &str)> {
    let mut chars = s.chars();
    let letter = chars.next()?.to_ascii_uppercase();
    let base: i32 = match letter {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };
    let rest = chars.as_str();
    let (shift, rest) = if let Some(r) = rest.strip_prefix('#') {
        (1, r)
    } else if let Some(r) = rest.strip_prefix('b') {
        (-1, r)
    } else {
        (0, rest)
    };
    Some((((base + shift).rem_euclid(12)) as u8, rest))
}
