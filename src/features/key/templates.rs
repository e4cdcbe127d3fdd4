//! Krumhansl-Kessler key templates
//!
//! Tonal profiles for 24 keys (12 major + 12 minor), obtained by rotating the
//! C major and C minor probe-tone ratings.

/// C major probe-tone profile (Krumhansl & Kessler, 1982)
const MAJOR_PROFILE: [f32; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];

/// C minor probe-tone profile (Krumhansl & Kessler, 1982)
const MINOR_PROFILE: [f32; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

/// Key templates for all 24 keys
#[derive(Debug, Clone)]
pub struct KeyTemplates {
    /// Major key templates (12 keys: C, C#, D, ..., B)
    pub major: [[f32; 12]; 12],

    /// Minor key templates (12 keys: C, C#, D, ..., B)
    pub minor: [[f32; 12]; 12],
}

impl KeyTemplates {
    /// Create key templates with Krumhansl-Kessler profiles
    pub fn new() -> Self {
        Self {
            major: std::array::from_fn(|tonic| rotate(&MAJOR_PROFILE, tonic)),
            minor: std::array::from_fn(|tonic| rotate(&MINOR_PROFILE, tonic)),
        }
    }

    /// Template for the major key on `tonic`
    pub fn get_major_template(&self, tonic: u32) -> &[f32; 12] {
        &self.major[tonic as usize % 12]
    }

    /// Template for the minor key on `tonic`
    pub fn get_minor_template(&self, tonic: u32) -> &[f32; 12] {
        &self.minor[tonic as usize % 12]
    }
}

impl Default for KeyTemplates {
    fn default() -> Self {
        Self::new()
    }
}

/// Rotate a C-based profile so index `tonic` carries the tonic weight
fn rotate(profile: &[f32; 12], tonic: usize) -> [f32; 12] {
    std::array::from_fn(|pc| profile[(pc + 12 - tonic) % 12])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_places_tonic() {
        let t = KeyTemplates::new();
        assert_eq!(t.get_major_template(7)[7], 6.35);
        assert_eq!(t.get_minor_template(9)[9], 6.33);
        // G major: F# (leading tone) weight = B weight of C major
        assert_eq!(t.get_major_template(7)[6], MAJOR_PROFILE[11]);
    }
}
