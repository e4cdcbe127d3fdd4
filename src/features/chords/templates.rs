//! Chord templates
//!
//! 12-bin pitch-class templates per (root, quality). Weights follow the
//! harmonic series: root strongest, third and fifth close behind, and a faint
//! seventh on plain triads where the overtones of a real instrument put energy.
//! Every template is L2-normalized, so a dot product with a normalized chroma
//! vector is a cosine similarity.

use serde::{Deserialize, Serialize};

use crate::features::key::{Key, NOTE_NAMES};
use crate::numeric::l2_normalize;

/// Chord quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChordQuality {
    /// Major triad
    Major,
    /// Minor triad
    Minor,
    /// Diminished triad
    Diminished,
    /// Dominant seventh
    Dominant7,
    /// Major seventh
    Major7,
    /// Minor seventh
    Minor7,
    /// Suspended fourth
    Sus4,
    /// Root and fifth with both thirds weak (third left undecided)
    RootOnly,
}

impl ChordQuality {
    /// Defining chord tones as semitone intervals above the root, root first
    pub fn intervals(&self) -> &'static [u8] {
        match self {
            ChordQuality::Major => &[0, 4, 7],
            ChordQuality::Minor => &[0, 3, 7],
            ChordQuality::Diminished => &[0, 3, 6],
            ChordQuality::Dominant7 => &[0, 4, 7, 10],
            ChordQuality::Major7 => &[0, 4, 7, 11],
            ChordQuality::Minor7 => &[0, 3, 7, 10],
            ChordQuality::Sus4 => &[0, 5, 7],
            ChordQuality::RootOnly => &[0, 7],
        }
    }

    /// Template weights as (interval, weight) pairs, before normalization
    fn weights(&self) -> &'static [(u8, f32)] {
        match self {
            ChordQuality::Major => &[(0, 1.0), (4, 0.9), (7, 0.85), (11, 0.25)],
            ChordQuality::Minor => &[(0, 1.0), (3, 0.9), (7, 0.85), (10, 0.2)],
            ChordQuality::Diminished => &[(0, 1.0), (3, 0.9), (6, 0.85)],
            ChordQuality::Dominant7 => &[(0, 1.0), (4, 0.85), (7, 0.8), (10, 0.75)],
            ChordQuality::Major7 => &[(0, 1.0), (4, 0.85), (7, 0.8), (11, 0.7)],
            ChordQuality::Minor7 => &[(0, 1.0), (3, 0.85), (7, 0.8), (10, 0.75)],
            ChordQuality::Sus4 => &[(0, 1.0), (5, 0.9), (7, 0.85)],
            ChordQuality::RootOnly => &[(0, 1.0), (3, 0.45), (4, 0.45), (7, 0.85)],
        }
    }

    /// Label suffix appended to the root name
    pub fn suffix(&self) -> &'static str {
        match self {
            ChordQuality::Major | ChordQuality::RootOnly => "",
            ChordQuality::Minor => "m",
            ChordQuality::Diminished => "dim",
            ChordQuality::Dominant7 => "7",
            ChordQuality::Major7 => "maj7",
            ChordQuality::Minor7 => "m7",
            ChordQuality::Sus4 => "sus4",
        }
    }
}

/// Set of chord states to decode over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChordVocabulary {
    /// 24 major and minor triads
    Triads,
    /// 84 chords: triads, diminished, sevenths, sus4
    Full,
    /// 12 root-only states
    RootOnly,
}

impl ChordVocabulary {
    /// Qualities in state order
    pub fn qualities(&self) -> &'static [ChordQuality] {
        match self {
            ChordVocabulary::Triads => &[ChordQuality::Major, ChordQuality::Minor],
            ChordVocabulary::Full => &[
                ChordQuality::Major,
                ChordQuality::Minor,
                ChordQuality::Diminished,
                ChordQuality::Dominant7,
                ChordQuality::Major7,
                ChordQuality::Minor7,
                ChordQuality::Sus4,
            ],
            ChordVocabulary::RootOnly => &[ChordQuality::RootOnly],
        }
    }
}

/// One chord state
#[derive(Debug, Clone, PartialEq)]
pub struct ChordTemplate {
    /// Root pitch class (0 = C)
    pub root: u8,
    /// Quality
    pub quality: ChordQuality,
    /// L2-normalized pitch-class weights
    pub weights: [f32; 12],
}

impl ChordTemplate {
    /// Build the normalized template for a root and quality
    pub fn new(root: u8, quality: ChordQuality) -> Self {
        let root = root % 12;
        let mut weights = [0.0f32; 12];
        for &(interval, w) in quality.weights() {
            weights[((root + interval) % 12) as usize] = w;
        }
        l2_normalize(&mut weights);
        Self {
            root,
            quality,
            weights,
        }
    }

    /// Chord label, e.g. "C", "Am", "Bdim", "G7", "Cmaj7", "Am7", "Dsus4"
    pub fn label(&self) -> String {
        format!("{}{}", NOTE_NAMES[self.root as usize], self.quality.suffix())
    }

    /// Pitch classes of the defining chord tones
    pub fn pitch_classes(&self) -> Vec<u8> {
        self.quality
            .intervals()
            .iter()
            .map(|i| (self.root + i) % 12)
            .collect()
    }

    /// Whether every chord tone lies in the key's diatonic set
    pub fn is_diatonic(&self, key: &Key) -> bool {
        key.contains_all(&self.pitch_classes())
    }

    /// Inversion implied by a bass pitch class
    ///
    /// 0 root position, 1 third (or suspended fourth) in the bass, 2 fifth,
    /// 3 seventh. `None` if the bass is not a chord tone.
    pub fn inversion(&self, bass_pitch_class: u8) -> Option<u8> {
        let interval = (bass_pitch_class % 12 + 12 - self.root) % 12;
        if !self.quality.intervals().contains(&interval) {
            return None;
        }
        match interval {
            0 => Some(0),
            3..=5 => Some(1),
            6 | 7 => Some(2),
            10 | 11 => Some(3),
            _ => None,
        }
    }
}

/// All chord states of one vocabulary, in a fixed order
///
/// States are ordered quality-major: all 12 roots of the first quality, then
/// the next quality. Ties in decoding resolve toward lower indices, i.e.
/// toward plain triads.
#[derive(Debug, Clone, PartialEq)]
pub struct ChordTemplateBank {
    vocabulary: ChordVocabulary,
    templates: Vec<ChordTemplate>,
}

impl ChordTemplateBank {
    /// Build every template of a vocabulary
    ///
    /// # Example
    ///
    /// ```
    /// use stratum_structure::features::chords::templates::{ChordTemplateBank, ChordVocabulary};
    ///
    /// let bank = ChordTemplateBank::new(ChordVocabulary::Full);
    /// assert_eq!(bank.len(), 84);
    /// assert_eq!(bank.label(0), "C");
    /// assert_eq!(bank.find("Am7").map(|id| bank.label(id)), Some("Am7".to_string()));
    /// ```
    pub fn new(vocabulary: ChordVocabulary) -> Self {
        let templates = vocabulary
            .qualities()
            .iter()
            .flat_map(|&q| (0..12u8).map(move |root| ChordTemplate::new(root, q)))
            .collect();
        Self {
            vocabulary,
            templates,
        }
    }

    /// Vocabulary the bank was built from
    pub fn vocabulary(&self) -> ChordVocabulary {
        self.vocabulary
    }

    /// Number of states
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// True if the bank has no states
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Template for a state index
    pub fn get(&self, id: usize) -> Option<&ChordTemplate> {
        self.templates.get(id)
    }

    /// All templates in state order
    pub fn templates(&self) -> &[ChordTemplate] {
        &self.templates
    }

    /// Label of a state index ("N" if out of range)
    pub fn label(&self, id: usize) -> String {
        self.templates
            .get(id)
            .map(|t| t.label())
            .unwrap_or_else(|| "N".to_string())
    }

    /// State index of a label, accepting flats (`"Bb7"`)
    pub fn find(&self, label: &str) -> Option<usize> {
        let (root, suffix) = crate::features::key::parse_pitch_class(label)?;
        self.templates
            .iter()
            .position(|t| t.root == root && t.quality.suffix() == suffix)
    }

    /// Diatonic flag per state for a key
    pub fn diatonic_mask(&self, key: &Key) -> Vec<bool> {
        self.templates.iter().map(|t| t.is_diatonic(key)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocabulary_sizes() {
        assert_eq!(ChordTemplateBank::new(ChordVocabulary::Triads).len(), 24);
        assert_eq!(ChordTemplateBank::new(ChordVocabulary::Full).len(), 84);
        assert_eq!(ChordTemplateBank::new(ChordVocabulary::RootOnly).len(), 12);
    }

    #[test]
    fn test_templates_normalized() {
        let bank = ChordTemplateBank::new(ChordVocabulary::Full);
        for t in bank.templates() {
            let norm: f32 = t.weights.iter().map(|w| w * w).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5, "{}", t.label());
        }
    }

    #[test]
    fn test_labels() {
        let labels: Vec<String> = [
            (0, ChordQuality::Major),
            (9, ChordQuality::Minor),
            (11, ChordQuality::Diminished),
            (7, ChordQuality::Dominant7),
            (0, ChordQuality::Major7),
            (9, ChordQuality::Minor7),
            (2, ChordQuality::Sus4),
        ]
        .iter()
        .map(|&(r, q)| ChordTemplate::new(r, q).label())
        .collect();
        assert_eq!(labels, vec!["C", "Am", "Bdim", "G7", "Cmaj7", "Am7", "Dsus4"]);
    }

    #[test]
    fn test_find_with_flats() {
        let bank = ChordTemplateBank::new(ChordVocabulary::Full);
        let id = bank.find("Bb7").unwrap();
        assert_eq!(bank.label(id), "A#7");
        assert!(bank.find("Xm").is_none());
    }

    #[test]
    fn test_diatonic_in_c_major() {
        let c = Key::Major(0);
        assert!(ChordTemplate::new(7, ChordQuality::Dominant7).is_diatonic(&c));
        assert!(ChordTemplate::new(11, ChordQuality::Diminished).is_diatonic(&c));
        assert!(!ChordTemplate::new(2, ChordQuality::Major).is_diatonic(&c));
        // Major-triad overtone (B) is not a chord tone
        assert!(ChordTemplate::new(5, ChordQuality::Major).is_diatonic(&c));
    }

    #[test]
    fn test_minor_key_includes_leading_tone() {
        let am = Key::Minor(9);
        assert!(ChordTemplate::new(4, ChordQuality::Major).is_diatonic(&am));
        assert!(ChordTemplate::new(4, ChordQuality::Minor).is_diatonic(&am));
    }

    #[test]
    fn test_inversions() {
        let c = ChordTemplate::new(0, ChordQuality::Major);
        assert_eq!(c.inversion(0), Some(0));
        assert_eq!(c.inversion(4), Some(1));
        assert_eq!(c.inversion(7), Some(2));
        assert_eq!(c.inversion(2), None);
        let g7 = ChordTemplate::new(7, ChordQuality::Dominant7);
        assert_eq!(g7.inversion(5), Some(3));
    }
}
