#![forbid(unsafe_code)]

//! Terminal quirk table.
//!
//! Everything that differs between terminal families lives here as data:
//! a [`Quirks`] set per [`TerminalFamily`], byte sequences a family reuses
//! for a different key, and chord aliases for keys a family cannot encode.
//! Lookups are pure.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;

use crate::error::GlassError;
use crate::key::{Direction, KeyChord, Modifiers, NamedKey};

bitflags! {
    /// Named deviations from the baseline protocol.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Quirks: u16 {
        /// The cursor advances one column, not two, after a wide glyph.
        const NO_AUTO_WRAP_DOUBLE_WIDTH = 1 << 0;
        /// Option+click arrives as a burst of bare arrow keys.
        const ARROW_SEQUENCE_MOUSE_COLLISION = 1 << 1;
        /// Fn+arrows scroll the terminal's own scrollback unless remapped.
        const FN_ARROW_REQUIRES_SCROLLBACK_AWARE = 1 << 2;
        /// Probe replies come back in the order the queries were sent.
        const ORDERED_PROBE_REPLIES = 1 << 3;
        /// `CSI 1 ; m R` is a cursor report here, never Shift+F3.
        const SHIFT_F3_IS_CURSOR_REPORT = 1 << 4;
        /// East Asian ambiguous-width glyphs render two columns wide.
        const AMBIGUOUS_WIDE = 1 << 5;
        /// Escape and Shift+Escape send the same byte.
        const SHIFT_ESCAPE_CONFLATED = 1 << 6;
    }
}

impl Quirks {
    const NAMES: &'static [(&'static str, Self)] = &[
        ("NoAutoWrapDoubleWidth", Self::NO_AUTO_WRAP_DOUBLE_WIDTH),
        ("ArrowSequenceMouseCollision", Self::ARROW_SEQUENCE_MOUSE_COLLISION),
        ("FnArrowRequiresScrollbackAware", Self::FN_ARROW_REQUIRES_SCROLLBACK_AWARE),
        ("OrderedProbeReplies", Self::ORDERED_PROBE_REPLIES),
        ("ShiftF3IsCursorReport", Self::SHIFT_F3_IS_CURSOR_REPORT),
        ("AmbiguousWide", Self::AMBIGUOUS_WIDE),
        ("ShiftEscapeConflated", Self::SHIFT_ESCAPE_CONFLATED),
    ];

    /// Look a single quirk up by its name.
    #[must_use]
    pub fn by_name(name: &str) -> Option<Self> {
        Self::NAMES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|&(_, q)| q)
    }
}

/// Terminal families with distinct decoding behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminalFamily {
    /// macOS Terminal.app
    AppleTerminal,
    ITerm2,
    Xterm,
    /// GNOME Terminal, Tilix, and other libvte terminals.
    Vte,
    Kitty,
    WezTerm,
    Alacritty,
    /// The browser terminal of Google Cloud Shell.
    GoogleCloudShell,
    Tmux,
    Screen,
    LinuxConsole,
    /// Least-capability fallback for unidentified terminals.
    Baseline,
}

impl TerminalFamily {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AppleTerminal => "apple-terminal",
            Self::ITerm2 => "iterm2",
            Self::Xterm => "xterm",
            Self::Vte => "vte",
            Self::Kitty => "kitty",
            Self::WezTerm => "wezterm",
            Self::Alacritty => "alacritty",
            Self::GoogleCloudShell => "google-cloud-shell",
            Self::Tmux => "tmux",
            Self::Screen => "screen",
            Self::LinuxConsole => "linux",
            Self::Baseline => "baseline",
        }
    }

    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::AppleTerminal,
            Self::ITerm2,
            Self::Xterm,
            Self::Vte,
            Self::Kitty,
            Self::WezTerm,
            Self::Alacritty,
            Self::GoogleCloudShell,
            Self::Tmux,
            Self::Screen,
            Self::LinuxConsole,
            Self::Baseline,
        ]
    }

    /// The quirk set this family is known to have.
    #[must_use]
    pub const fn quirks(self) -> Quirks {
        const ORDERED: Quirks = Quirks::ORDERED_PROBE_REPLIES;
        const CONFLATED: Quirks = Quirks::SHIFT_ESCAPE_CONFLATED;
        let bits = match self {
            Self::AppleTerminal => {
                Quirks::ARROW_SEQUENCE_MOUSE_COLLISION.bits()
                    | Quirks::FN_ARROW_REQUIRES_SCROLLBACK_AWARE.bits()
                    | Quirks::SHIFT_F3_IS_CURSOR_REPORT.bits()
                    | ORDERED.bits()
                    | CONFLATED.bits()
            }
            Self::ITerm2 => {
                Quirks::ARROW_SEQUENCE_MOUSE_COLLISION.bits() | ORDERED.bits() | CONFLATED.bits()
            }
            Self::Xterm
            | Self::Vte
            | Self::Kitty
            | Self::WezTerm
            | Self::Alacritty
            | Self::LinuxConsole => ORDERED.bits() | CONFLATED.bits(),
            Self::GoogleCloudShell => {
                Quirks::NO_AUTO_WRAP_DOUBLE_WIDTH.bits() | CONFLATED.bits()
            }
            // Replies may come from the outer terminal, in any order.
            Self::Tmux | Self::Screen => CONFLATED.bits(),
            Self::Baseline => Quirks::SHIFT_F3_IS_CURSOR_REPORT.bits() | CONFLATED.bits(),
        };
        Quirks::from_bits_truncate(bits)
    }

    /// Map a DA2 terminal-type parameter to a family.
    #[must_use]
    pub const fn from_da2(terminal_type: u32) -> Option<Self> {
        match terminal_type {
            41 => Some(Self::Xterm),
            83 => Some(Self::Screen),
            84 => Some(Self::Tmux),
            _ => None,
        }
    }
}

impl FromStr for TerminalFamily {
    type Err = GlassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "apple-terminal" | "apple_terminal" | "terminal.app" => Ok(Self::AppleTerminal),
            "iterm2" | "iterm.app" | "iterm" => Ok(Self::ITerm2),
            "xterm" => Ok(Self::Xterm),
            "vte" | "gnome-terminal" => Ok(Self::Vte),
            "kitty" | "xterm-kitty" => Ok(Self::Kitty),
            "wezterm" => Ok(Self::WezTerm),
            "alacritty" => Ok(Self::Alacritty),
            "google-cloud-shell" | "cloudshell" | "cloud-shell" => Ok(Self::GoogleCloudShell),
            "tmux" => Ok(Self::Tmux),
            "screen" => Ok(Self::Screen),
            "linux" | "linux-console" => Ok(Self::LinuxConsole),
            "baseline" | "unknown" => Ok(Self::Baseline),
            _ => Err(GlassError::UnknownTerminalFamily(s.to_owned())),
        }
    }
}

impl fmt::Display for TerminalFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Key overrides ────────────────────────────────────────────────────────
//
// Checked before the base table. Each row is (family, quirks the row needs,
// wire bytes, chord).

const OPT: Modifiers = Modifiers::OPTION;
const FN: Modifiers = Modifiers::FN;
const ALWAYS: Quirks = Quirks::empty();
const FN_ARROWS: Quirks = Quirks::FN_ARROW_REQUIRES_SCROLLBACK_AWARE;

const fn arrow_with(direction: Direction, modifiers: Modifiers) -> KeyChord {
    KeyChord::arrow(direction).with_modifiers(modifiers)
}

static KEY_OVERRIDES: &[(TerminalFamily, Quirks, &[u8], KeyChord)] = &[
    // Terminal.app sends emacs word motions for Option+Left/Right.
    (TerminalFamily::AppleTerminal, ALWAYS, b"\x1bb", arrow_with(Direction::Left, OPT)),
    (TerminalFamily::AppleTerminal, ALWAYS, b"\x1bf", arrow_with(Direction::Right, OPT)),
    // Fn+arrows arrive as Home/End/PageUp/PageDown.
    (TerminalFamily::AppleTerminal, FN_ARROWS, b"\x1b[H", arrow_with(Direction::Left, FN)),
    (TerminalFamily::AppleTerminal, FN_ARROWS, b"\x1b[F", arrow_with(Direction::Right, FN)),
    (TerminalFamily::AppleTerminal, FN_ARROWS, b"\x1b[5~", arrow_with(Direction::Up, FN)),
    (TerminalFamily::AppleTerminal, FN_ARROWS, b"\x1b[6~", arrow_with(Direction::Down, FN)),
    // iTerm2's default profile does the same for Option+Left/Right.
    (TerminalFamily::ITerm2, ALWAYS, b"\x1bb", arrow_with(Direction::Left, OPT)),
    (TerminalFamily::ITerm2, ALWAYS, b"\x1bf", arrow_with(Direction::Right, OPT)),
];

/// The chord a family sends `wire` for, when it differs from the base table.
///
/// Rows tied to a quirk apply only while `quirks` has it.
#[must_use]
pub fn key_override(family: TerminalFamily, quirks: Quirks, wire: &[u8]) -> Option<KeyChord> {
    KEY_OVERRIDES
        .iter()
        .find(|(f, needs, bytes, _)| *f == family && quirks.contains(*needs) && *bytes == wire)
        .map(|&(_, _, _, chord)| chord)
}

// ── Chord aliases ────────────────────────────────────────────────────────
//
// (family, quirks the row needs, chord a widget asks for, chord the family
// actually sends)

static CHORD_ALIASES: &[(TerminalFamily, Quirks, KeyChord, KeyChord)] = &[
    (
        TerminalFamily::AppleTerminal,
        ALWAYS,
        arrow_with(Direction::Up, OPT),
        arrow_with(Direction::Left, OPT),
    ),
    (
        TerminalFamily::AppleTerminal,
        ALWAYS,
        arrow_with(Direction::Down, OPT),
        arrow_with(Direction::Right, OPT),
    ),
    (
        TerminalFamily::AppleTerminal,
        FN_ARROWS,
        KeyChord::named(NamedKey::Home),
        arrow_with(Direction::Left, FN),
    ),
    (
        TerminalFamily::AppleTerminal,
        FN_ARROWS,
        KeyChord::named(NamedKey::End),
        arrow_with(Direction::Right, FN),
    ),
];

/// Chords that stand in for `wanted` on a family that cannot send it.
pub fn chord_aliases(
    family: TerminalFamily,
    quirks: Quirks,
    wanted: KeyChord,
) -> impl Iterator<Item = KeyChord> {
    CHORD_ALIASES
        .iter()
        .filter(move |(f, needs, w, _)| *f == family && quirks.contains(*needs) && *w == wanted)
        .map(|&(_, _, _, sent)| sent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_names_round_trip() {
        for &family in TerminalFamily::all() {
            assert_eq!(family.as_str().parse::<TerminalFamily>().ok(), Some(family));
            assert_eq!(family.to_string(), family.as_str());
        }
        assert!(matches!(
            "amiga".parse::<TerminalFamily>(),
            Err(GlassError::UnknownTerminalFamily(name)) if name == "amiga"
        ));
    }

    #[test]
    fn apple_terminal_quirks() {
        let q = TerminalFamily::AppleTerminal.quirks();
        assert!(q.contains(Quirks::ARROW_SEQUENCE_MOUSE_COLLISION));
        assert!(q.contains(Quirks::FN_ARROW_REQUIRES_SCROLLBACK_AWARE));
        assert!(q.contains(Quirks::SHIFT_F3_IS_CURSOR_REPORT));
        assert!(!q.contains(Quirks::NO_AUTO_WRAP_DOUBLE_WIDTH));
    }

    #[test]
    fn baseline_is_conservative() {
        let q = TerminalFamily::Baseline.quirks();
        assert!(!q.contains(Quirks::ORDERED_PROBE_REPLIES));
        assert!(!q.contains(Quirks::ARROW_SEQUENCE_MOUSE_COLLISION));
        assert!(q.contains(Quirks::SHIFT_F3_IS_CURSOR_REPORT));
    }

    #[test]
    fn multiplexers_do_not_pipeline() {
        for family in [TerminalFamily::Tmux, TerminalFamily::Screen] {
            assert!(!family.quirks().contains(Quirks::ORDERED_PROBE_REPLIES));
        }
        assert!(TerminalFamily::Xterm.quirks().contains(Quirks::ORDERED_PROBE_REPLIES));
    }

    #[test]
    fn overrides_are_per_family() {
        let option_left = KeyChord::arrow(Direction::Left).with_modifiers(Modifiers::OPTION);
        let apple = TerminalFamily::AppleTerminal.quirks();
        assert_eq!(
            key_override(TerminalFamily::AppleTerminal, apple, b"\x1bb"),
            Some(option_left)
        );
        assert_eq!(
            key_override(TerminalFamily::Xterm, TerminalFamily::Xterm.quirks(), b"\x1bb"),
            None
        );
        assert_eq!(key_override(TerminalFamily::AppleTerminal, apple, b"\x1bc"), None);
    }

    #[test]
    fn fn_arrow_rows_follow_their_quirk() {
        let fn_up = KeyChord::arrow(Direction::Up).with_modifiers(Modifiers::FN);
        let apple = TerminalFamily::AppleTerminal.quirks();
        assert_eq!(
            key_override(TerminalFamily::AppleTerminal, apple, b"\x1b[5~"),
            Some(fn_up)
        );
        let remapped = apple - Quirks::FN_ARROW_REQUIRES_SCROLLBACK_AWARE;
        assert_eq!(key_override(TerminalFamily::AppleTerminal, remapped, b"\x1b[5~"), None);
        // Option rows do not depend on it.
        assert!(key_override(TerminalFamily::AppleTerminal, remapped, b"\x1bb").is_some());

        let home = KeyChord::named(NamedKey::Home);
        assert_eq!(chord_aliases(TerminalFamily::AppleTerminal, apple, home).count(), 1);
        assert_eq!(chord_aliases(TerminalFamily::AppleTerminal, remapped, home).count(), 0);
    }

    #[test]
    fn option_vertical_aliases() {
        let wanted = KeyChord::arrow(Direction::Up).with_modifiers(Modifiers::OPTION);
        let aliases: Vec<_> =
            chord_aliases(TerminalFamily::AppleTerminal, Quirks::all(), wanted).collect();
        assert_eq!(
            aliases,
            vec![KeyChord::arrow(Direction::Left).with_modifiers(Modifiers::OPTION)]
        );
        assert_eq!(chord_aliases(TerminalFamily::Kitty, Quirks::all(), wanted).count(), 0);
    }

    #[test]
    fn quirk_names() {
        assert_eq!(
            Quirks::by_name("noautowrapdoublewidth"),
            Some(Quirks::NO_AUTO_WRAP_DOUBLE_WIDTH)
        );
        assert_eq!(Quirks::by_name("nope"), None);
    }

    #[test]
    fn da2_families() {
        assert_eq!(TerminalFamily::from_da2(41), Some(TerminalFamily::Xterm));
        assert_eq!(TerminalFamily::from_da2(84), Some(TerminalFamily::Tmux));
        assert_eq!(TerminalFamily::from_da2(1), None);
    }
}
