#![forbid(unsafe_code)]

//! Canonical key chords.
//!
//! A [`KeyChord`] is one logical keystroke independent of how a terminal
//! encoded it: a [`BaseKey`] plus a [`Modifiers`] set. Equality is
//! structural, so two encodings that resolve to the same chord are the same
//! keystroke as far as widgets are concerned.
//!
//! # Canonical form
//!
//! - ASCII capitals become the lowercase [`BaseKey::Letter`] plus `SHIFT`.
//!   Shift applied to a non-letter (`!`, `É`) is already part of the code
//!   point and is not added again.
//! - Composed accented letters stay [`BaseKey::Unicode`], tagged with the
//!   modifiers that produced the accent.
//! - Two jammed arrows become one [`BaseKey::Diagonal`].

use std::fmt;

use bitflags::bitflags;

bitflags! {
    /// Modifier keys held during a keystroke.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u8 {
        const NONE = 0;
        const SHIFT = 1 << 0;
        /// Option on Apple keyboards, Alt elsewhere.
        const OPTION = 1 << 1;
        const CONTROL = 1 << 2;
        /// Command on Apple keyboards, Super elsewhere.
        const COMMAND = 1 << 3;
        const FN = 1 << 4;
    }
}

impl Modifiers {
    /// Decode an xterm modifier parameter (`1 + bits`).
    ///
    /// Shift=1, Option=2, Control=4, Command=8. Missing or zero values mean
    /// no modifiers.
    #[must_use]
    pub fn from_xterm(value: u32) -> Self {
        let bits = value.saturating_sub(1);
        let mut mods = Self::NONE;
        if bits & 1 != 0 {
            mods |= Self::SHIFT;
        }
        if bits & 2 != 0 {
            mods |= Self::OPTION;
        }
        if bits & 4 != 0 {
            mods |= Self::CONTROL;
        }
        if bits & 8 != 0 {
            mods |= Self::COMMAND;
        }
        mods
    }
}

impl fmt::Display for Modifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (flag, mark) in [
            (Self::CONTROL, "⌃"),
            (Self::OPTION, "⌥"),
            (Self::SHIFT, "⇧"),
            (Self::COMMAND, "⌘"),
            (Self::FN, "Fn"),
        ] {
            if self.contains(flag) {
                f.write_str(mark)?;
            }
        }
        Ok(())
    }
}

/// Arrow key direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Right,
    Left,
}

impl Direction {
    /// Map a CSI/SS3 final byte (`A`..`D`) to a direction.
    #[must_use]
    pub const fn from_final(byte: u8) -> Option<Self> {
        match byte {
            b'A' => Some(Self::Up),
            b'B' => Some(Self::Down),
            b'C' => Some(Self::Right),
            b'D' => Some(Self::Left),
            _ => None,
        }
    }

    /// The CSI final byte that moves the cursor this way.
    #[must_use]
    pub const fn final_byte(self) -> u8 {
        match self {
            Self::Up => b'A',
            Self::Down => b'B',
            Self::Right => b'C',
            Self::Left => b'D',
        }
    }

    #[must_use]
    pub const fn is_vertical(self) -> bool {
        matches!(self, Self::Up | Self::Down)
    }
}

/// The four diagonals a two-arrow jam can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Diagonal {
    UpLeft,
    UpRight,
    DownLeft,
    DownRight,
}

impl Diagonal {
    /// Merge two orthogonal directions. Order does not matter.
    #[must_use]
    pub const fn from_pair(a: Direction, b: Direction) -> Option<Self> {
        use Direction::{Down, Left, Right, Up};
        match (a, b) {
            (Up, Left) | (Left, Up) => Some(Self::UpLeft),
            (Up, Right) | (Right, Up) => Some(Self::UpRight),
            (Down, Left) | (Left, Down) => Some(Self::DownLeft),
            (Down, Right) | (Right, Down) => Some(Self::DownRight),
            _ => None,
        }
    }
}

/// Keys that have a name rather than a glyph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedKey {
    Escape,
    Tab,
    Return,
    Backspace,
    Delete,
    Insert,
    Home,
    End,
    PageUp,
    PageDown,
    Arrow(Direction),
}

/// The unmodified identity of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseKey {
    /// Lowercase ASCII letter.
    Letter(char),
    /// ASCII digit.
    Digit(char),
    /// ASCII punctuation or space.
    Punct(char),
    Named(NamedKey),
    /// Function key F1-F24.
    Function(u8),
    /// Any other code point typed directly.
    Unicode(char),
    Diagonal(Diagonal),
}

/// One canonical keystroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyChord {
    pub base: BaseKey,
    pub modifiers: Modifiers,
}

impl KeyChord {
    #[must_use]
    pub const fn new(base: BaseKey) -> Self {
        Self {
            base,
            modifiers: Modifiers::NONE,
        }
    }

    #[must_use]
    pub const fn named(key: NamedKey) -> Self {
        Self::new(BaseKey::Named(key))
    }

    #[must_use]
    pub const fn arrow(direction: Direction) -> Self {
        Self::named(NamedKey::Arrow(direction))
    }

    /// Add modifiers to the chord.
    #[must_use]
    pub const fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = Modifiers::from_bits_retain(self.modifiers.bits() | modifiers.bits());
        self
    }

    /// Canonical chord for a typed character.
    #[must_use]
    pub fn from_char(c: char) -> Self {
        match c {
            'a'..='z' => Self::new(BaseKey::Letter(c)),
            'A'..='Z' => {
                Self::new(BaseKey::Letter(c.to_ascii_lowercase())).with_modifiers(Modifiers::SHIFT)
            }
            '0'..='9' => Self::new(BaseKey::Digit(c)),
            ' '..='~' => Self::new(BaseKey::Punct(c)),
            _ => Self::new(BaseKey::Unicode(c)),
        }
    }

    /// The direction of a bare arrow chord.
    #[must_use]
    pub fn bare_arrow(&self) -> Option<Direction> {
        match self.base {
            BaseKey::Named(NamedKey::Arrow(d)) if self.modifiers.is_empty() => Some(d),
            _ => None,
        }
    }
}

impl fmt::Display for KeyChord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.modifiers)?;
        match self.base {
            BaseKey::Letter(c) => write!(f, "{}", c.to_ascii_uppercase()),
            BaseKey::Digit(c) | BaseKey::Unicode(c) => write!(f, "{c}"),
            BaseKey::Punct(' ') => f.write_str("Spacebar"),
            BaseKey::Punct(c) => write!(f, "{c}"),
            BaseKey::Function(n) => write!(f, "F{n}"),
            BaseKey::Named(key) => write!(f, "{key:?}"),
            BaseKey::Diagonal(d) => write!(f, "{d:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capitals_canonicalize_to_shifted_letters() {
        assert_eq!(
            KeyChord::from_char('Q'),
            KeyChord::new(BaseKey::Letter('q')).with_modifiers(Modifiers::SHIFT)
        );
        assert_eq!(KeyChord::from_char('q').modifiers, Modifiers::NONE);
    }

    #[test]
    fn char_classes() {
        assert_eq!(KeyChord::from_char('7').base, BaseKey::Digit('7'));
        assert_eq!(KeyChord::from_char('!').base, BaseKey::Punct('!'));
        assert_eq!(KeyChord::from_char(' ').base, BaseKey::Punct(' '));
        assert_eq!(KeyChord::from_char('é').base, BaseKey::Unicode('é'));
        assert_eq!(KeyChord::from_char('É').modifiers, Modifiers::NONE);
    }

    #[test]
    fn xterm_modifier_values() {
        assert_eq!(Modifiers::from_xterm(0), Modifiers::NONE);
        assert_eq!(Modifiers::from_xterm(1), Modifiers::NONE);
        assert_eq!(Modifiers::from_xterm(2), Modifiers::SHIFT);
        assert_eq!(Modifiers::from_xterm(3), Modifiers::OPTION);
        assert_eq!(
            Modifiers::from_xterm(6),
            Modifiers::SHIFT | Modifiers::CONTROL
        );
        assert_eq!(Modifiers::from_xterm(9), Modifiers::COMMAND);
    }

    #[test]
    fn diagonals_need_orthogonal_pairs() {
        use Direction::*;
        assert_eq!(Diagonal::from_pair(Up, Right), Some(Diagonal::UpRight));
        assert_eq!(Diagonal::from_pair(Right, Up), Some(Diagonal::UpRight));
        assert_eq!(Diagonal::from_pair(Left, Down), Some(Diagonal::DownLeft));
        assert_eq!(Diagonal::from_pair(Up, Down), None);
        assert_eq!(Diagonal::from_pair(Left, Left), None);
    }

    #[test]
    fn bare_arrow_ignores_modified_arrows() {
        let left = KeyChord::arrow(Direction::Left);
        assert_eq!(left.bare_arrow(), Some(Direction::Left));
        assert_eq!(left.with_modifiers(Modifiers::OPTION).bare_arrow(), None);
    }

    #[test]
    fn display_uses_modifier_marks() {
        let chord = KeyChord::from_char('A').with_modifiers(Modifiers::CONTROL);
        assert_eq!(chord.to_string(), "⌃⇧A");
        assert_eq!(KeyChord::new(BaseKey::Function(3)).to_string(), "F3");
    }
}
