//! Note mapping
//!
//! Maps frequencies onto the twelve equal-tempered pitch classes, referenced to A4 = 440 Hz.

use std::fmt::Display;

const SEMITONES: i64 = 12;

/// Reference pitch for A4 in Hz.
pub const A4_FREQUENCY: f32 = 440.0;

/// Twelve chromatic pitch classes
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum NoteName {
    /// C
    C,
    /// C sharp / D flat
    Cs,
    /// D
    D,
    /// D sharp / E flat
    Ds,
    /// E
    E,
    /// F
    F,
    /// F sharp / G flat
    Fs,
    /// G
    G,
    /// G sharp / A flat
    Gs,
    /// A
    A,
    /// A sharp / B flat
    As,
    /// B
    B,
}

/// All pitch classes in ascending order starting at C.
pub const NOTE_NAMES: [NoteName; 12] = [
    NoteName::C,
    NoteName::Cs,
    NoteName::D,
    NoteName::Ds,
    NoteName::E,
    NoteName::F,
    NoteName::Fs,
    NoteName::G,
    NoteName::Gs,
    NoteName::A,
    NoteName::As,
    NoteName::B,
];

impl NoteName {
    /// Pitch class for an index, wrapped into `0..12`.
    pub const fn from_idx(idx: usize) -> NoteName {
        NOTE_NAMES[idx % 12]
    }

    /// Position of this pitch class above C (`0..12`).
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Nearest equal-tempered pitch class for `frequency`.
    ///
    /// Returns `None` for non-positive or non-finite input.
    pub fn from_frequency(frequency: f32) -> Option<NoteName> {
        let steps = half_steps_from_c0(frequency)?;
        let idx = (steps.round() as i64).rem_euclid(SEMITONES);
        Some(NoteName::from_idx(idx as usize))
    }

    /// Conventional sharp spelling, e.g. `"C#"`.
    pub const fn as_str(self) -> &'static str {
        match self {
            NoteName::C => "C",
            NoteName::Cs => "C#",
            NoteName::D => "D",
            NoteName::Ds => "D#",
            NoteName::E => "E",
            NoteName::F => "F",
            NoteName::Fs => "F#",
            NoteName::G => "G",
            NoteName::Gs => "G#",
            NoteName::A => "A",
            NoteName::As => "A#",
            NoteName::B => "B",
        }
    }
}

impl Display for NoteName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Frequency of C0, 57 semitones below A4.
pub fn c0_frequency() -> f32 {
    A4_FREQUENCY * 2f32.powf(-4.75)
}

/// Fractional number of equal-tempered semitones between C0 and `frequency`.
///
/// Negative below C0. `None` for non-positive or non-finite input.
pub fn half_steps_from_c0(frequency: f32) -> Option<f32> {
    if !frequency.is_finite() || frequency <= 0.0 {
        return None;
    }
    Some(12.0 * (frequency / c0_frequency()).log2())
}
