#![forbid(unsafe_code)]

//! Key-chord resolver.
//!
//! Turns key frames into [`KeyChord`]s. Frames arrive in runs, one run per
//! read buffer with capability replies and mouse reports already removed,
//! because two behaviors depend on what arrived together:
//!
//! - **Jams**: exactly two bare arrows for orthogonal directions in the same
//!   run merge into one diagonal chord.
//! - **Arrow bursts**: on families that emulate Option+click with arrow keys,
//!   a run that opens with three or more bare arrows is handed back as an
//!   [`Resolved::ArrowBurst`] for the pointer resolver.
//!
//! Dead keys span runs: a spacing accent waits for the next character (or
//! the ceiling) before anything is emitted for it.
//!
//! # Lookup order
//!
//! 1. The family's key overrides (exact wire bytes).
//! 2. The base table: control bytes, `ESC`-pairs, SS3, CSI
//!    (arrows, Home/End, `~` codes, `Z`, modifyOtherKeys, kitty `u`).

use std::sync::Arc;
use std::time::{Duration, Instant};

use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

use crate::config::EngineConfig;
use crate::frame::{Frame, csi_marker, csi_numbers};
use crate::key::{BaseKey, Diagonal, Direction, KeyChord, Modifiers, NamedKey};
use crate::profile::TerminalProfile;

/// Minimum leading bare arrows that make an arrow burst.
pub const MIN_BURST_LEN: usize = 3;

/// Output of the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Key(KeyChord),
    /// Arrow keys the terminal sent in place of a click.
    ArrowBurst(Vec<Direction>),
}

/// Combining mark for a spacing accent typed as a dead key.
///
/// Only the non-ASCII spacing forms count; `` ` ``, `^` and `~` are ordinary
/// keys on most layouts.
fn dead_accent_mark(c: char) -> Option<char> {
    match c {
        '\u{00B4}' => Some('\u{0301}'), // ´ acute
        '\u{02CB}' => Some('\u{0300}'), // ˋ grave
        '\u{00A8}' => Some('\u{0308}'), // ¨ diaeresis
        '\u{02C6}' => Some('\u{0302}'), // ˆ circumflex
        '\u{02DC}' => Some('\u{0303}'), // ˜ tilde
        _ => None,
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingAccent {
    accent: char,
    mark: char,
    deadline: Instant,
}

/// Stateful frame-to-chord resolver for one input stream.
#[derive(Debug)]
pub struct KeyChordResolver {
    profile: Arc<TerminalProfile>,
    dead_keys: bool,
    jam_detection: bool,
    ceiling: Duration,
    pending: Option<PendingAccent>,
}

impl KeyChordResolver {
    #[must_use]
    pub fn new(profile: Arc<TerminalProfile>, config: &EngineConfig) -> Self {
        Self {
            profile,
            dead_keys: config.dead_keys,
            jam_detection: config.jam_detection,
            ceiling: config.probe_ceiling,
            pending: None,
        }
    }

    /// Resolve one run of frames.
    ///
    /// `bursts` is true when arrow bursts should be treated as clicks: the
    /// family has the collision and no mouse-tracking session is open.
    pub fn resolve_run(
        &mut self,
        frames: &[Frame],
        now: Instant,
        bursts: bool,
        out: &mut Vec<Resolved>,
    ) {
        let frames: Vec<&Frame> = frames.iter().filter(|f| !f.is_marker()).collect();
        let chords: Vec<Option<KeyChord>> = frames
            .iter()
            .map(|f| match f {
                Frame::Text(_) => None,
                _ => self.resolve_frame(f),
            })
            .collect();
        let bare = |i: usize| chords.get(i).copied().flatten().and_then(|c| c.bare_arrow());

        let mut i = 0;
        if bursts {
            let leading = (0..chords.len()).take_while(|&k| bare(k).is_some()).count();
            if leading >= MIN_BURST_LEN {
                self.flush_pending(out);
                out.push(Resolved::ArrowBurst(
                    (0..leading).filter_map(bare).collect(),
                ));
                i = leading;
            }
        }

        while i < frames.len() {
            if let Frame::Text(text) = frames[i] {
                self.resolve_text(text, now, out);
                i += 1;
                continue;
            }
            let Some(chord) = chords[i] else {
                crate::trace!(frame = ?frames[i], "frame has no key meaning");
                i += 1;
                continue;
            };
            self.flush_pending(out);

            if self.jam_detection
                && let Some(first) = bare(i)
                && let Some(second) = bare(i + 1)
                && bare(i + 2).is_none()
                && (i == 0 || bare(i - 1).is_none())
                && let Some(diagonal) = Diagonal::from_pair(first, second)
            {
                out.push(Resolved::Key(KeyChord::new(BaseKey::Diagonal(diagonal))));
                i += 2;
                continue;
            }

            out.push(Resolved::Key(chord));
            i += 1;
        }
    }

    /// Emit a buffered dead accent on its own.
    pub fn flush_pending(&mut self, out: &mut Vec<Resolved>) {
        if let Some(pending) = self.pending.take() {
            out.push(Resolved::Key(KeyChord::from_char(pending.accent)));
        }
    }

    /// Flush a dead accent whose wait has run out.
    pub fn tick(&mut self, now: Instant, out: &mut Vec<Resolved>) {
        if self.pending.is_some_and(|p| now >= p.deadline) {
            self.flush_pending(out);
        }
    }

    /// When [`tick`](Self::tick) next has work to do.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.map(|p| p.deadline)
    }

    #[must_use]
    pub fn has_pending_accent(&self) -> bool {
        self.pending.is_some()
    }

    fn resolve_text(&mut self, text: &str, now: Instant, out: &mut Vec<Resolved>) {
        let composed: String = text.nfc().collect();
        for grapheme in composed.graphemes(true) {
            let Some(c) = grapheme.chars().next() else {
                continue;
            };

            if let Some(pending) = self.pending.take() {
                if c == ' ' {
                    out.push(Resolved::Key(KeyChord::from_char(pending.accent)));
                    continue;
                }
                if let Some(letter) = unicode_normalization::char::compose(c, pending.mark) {
                    let mut modifiers = Modifiers::OPTION;
                    if c.is_uppercase() {
                        modifiers |= Modifiers::SHIFT;
                    }
                    out.push(Resolved::Key(
                        KeyChord::new(BaseKey::Unicode(letter)).with_modifiers(modifiers),
                    ));
                    continue;
                }
                out.push(Resolved::Key(KeyChord::from_char(pending.accent)));
            }

            if self.dead_keys
                && let Some(mark) = dead_accent_mark(c)
            {
                self.pending = Some(PendingAccent {
                    accent: c,
                    mark,
                    deadline: now + self.ceiling,
                });
                continue;
            }
            out.push(Resolved::Key(KeyChord::from_char(c)));
        }
    }

    /// Chord for a single non-text frame, or `None` when it has no key
    /// meaning.
    #[must_use]
    pub fn resolve_frame(&self, frame: &Frame) -> Option<KeyChord> {
        if let Some(chord) = self.profile.key_override(&frame.to_bytes()) {
            return Some(chord);
        }
        match frame {
            Frame::ControlByte(byte) => control_chord(*byte),
            Frame::EscPair(byte) => esc_pair_chord(*byte),
            Frame::Meta(inner) => self
                .resolve_frame(inner)
                .map(|chord| chord.with_modifiers(Modifiers::OPTION)),
            Frame::Ss3(final_byte) => ss3_chord(*final_byte),
            Frame::Csi {
                params,
                intermediates,
                final_byte,
            } if intermediates.is_empty() => csi_chord(params, *final_byte),
            Frame::Text(text) => {
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Some(KeyChord::from_char(c)),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

fn control_chord(byte: u8) -> Option<KeyChord> {
    let chord = match byte {
        0x00 => KeyChord::from_char(' ').with_modifiers(Modifiers::CONTROL),
        0x09 => KeyChord::named(NamedKey::Tab),
        0x0D => KeyChord::named(NamedKey::Return),
        0x1B => KeyChord::named(NamedKey::Escape),
        0x7F => KeyChord::named(NamedKey::Backspace),
        0x01..=0x1A => KeyChord::new(BaseKey::Letter(char::from(byte + b'a' - 1)))
            .with_modifiers(Modifiers::CONTROL),
        0x1C..=0x1F => KeyChord::new(BaseKey::Punct(char::from(byte + b'@')))
            .with_modifiers(Modifiers::CONTROL),
        _ => return None,
    };
    Some(chord)
}

fn esc_pair_chord(byte: u8) -> Option<KeyChord> {
    let base = match byte {
        0x20..=0x7E => KeyChord::from_char(char::from(byte)),
        _ => control_chord(byte)?,
    };
    Some(base.with_modifiers(Modifiers::OPTION))
}

fn ss3_chord(final_byte: u8) -> Option<KeyChord> {
    if let Some(direction) = Direction::from_final(final_byte) {
        return Some(KeyChord::arrow(direction));
    }
    let chord = match final_byte {
        b'P'..=b'S' => KeyChord::new(BaseKey::Function(final_byte - b'P' + 1)),
        b'H' => KeyChord::named(NamedKey::Home),
        b'F' => KeyChord::named(NamedKey::End),
        b'M' => KeyChord::named(NamedKey::Return),
        _ => return None,
    };
    Some(chord)
}

fn csi_chord(params: &[u8], final_byte: u8) -> Option<KeyChord> {
    if csi_marker(params).is_some() {
        return None;
    }
    let numbers = csi_numbers(params);
    let number = |i: usize| numbers.get(i).copied().flatten();
    let modifiers = Modifiers::from_xterm(number(1).unwrap_or(1));

    if let Some(direction) = Direction::from_final(final_byte) {
        return Some(KeyChord::arrow(direction).with_modifiers(modifiers));
    }
    let chord = match final_byte {
        b'H' => KeyChord::named(NamedKey::Home),
        b'F' => KeyChord::named(NamedKey::End),
        b'P'..=b'S' => KeyChord::new(BaseKey::Function(final_byte - b'P' + 1)),
        b'Z' => KeyChord::named(NamedKey::Tab).with_modifiers(Modifiers::SHIFT),
        b'~' => return tilde_chord(&numbers),
        b'u' => return kitty_chord(params),
        _ => return None,
    };
    Some(chord.with_modifiers(modifiers))
}

fn tilde_chord(numbers: &[Option<u32>]) -> Option<KeyChord> {
    let number = |i: usize| numbers.get(i).copied().flatten();
    let modifiers = Modifiers::from_xterm(number(1).unwrap_or(1));
    let key = number(0)?;

    // modifyOtherKeys: CSI 27 ; mod ; code ~
    if key == 27 {
        let code = char::from_u32(number(2)?)?;
        return Some(code_point_chord(code)?.with_modifiers(modifiers));
    }

    let base = match key {
        1 | 7 => BaseKey::Named(NamedKey::Home),
        2 => BaseKey::Named(NamedKey::Insert),
        3 => BaseKey::Named(NamedKey::Delete),
        4 | 8 => BaseKey::Named(NamedKey::End),
        5 => BaseKey::Named(NamedKey::PageUp),
        6 => BaseKey::Named(NamedKey::PageDown),
        11..=15 => BaseKey::Function((key - 10) as u8),
        17..=21 => BaseKey::Function((key - 11) as u8),
        23..=26 => BaseKey::Function((key - 12) as u8),
        28 | 29 => BaseKey::Function((key - 13) as u8),
        31..=34 => BaseKey::Function((key - 14) as u8),
        _ => return None,
    };
    Some(KeyChord::new(base).with_modifiers(modifiers))
}

/// Chord for a code point reported by an extended keyboard protocol.
fn code_point_chord(c: char) -> Option<KeyChord> {
    let chord = match c {
        '\t' => KeyChord::named(NamedKey::Tab),
        '\r' => KeyChord::named(NamedKey::Return),
        '\x1b' => KeyChord::named(NamedKey::Escape),
        '\x08' | '\x7f' => KeyChord::named(NamedKey::Backspace),
        c if c.is_control() => return None,
        c => KeyChord::from_char(c),
    };
    Some(chord)
}

/// Kitty keyboard protocol: `CSI code[:alt] ; mods[:event] u`.
///
/// Release events (event type 3) carry no keystroke and are dropped.
fn kitty_chord(params: &[u8]) -> Option<KeyChord> {
    let s = std::str::from_utf8(params).ok()?;
    let mut fields = s.split(';');
    let code: u32 = fields.next()?.split(':').next()?.parse().ok()?;

    let mut mod_field = fields.next().unwrap_or("").split(':');
    let mod_value: u32 = mod_field.next().and_then(|v| v.parse().ok()).unwrap_or(1);
    let event: u32 = mod_field.next().and_then(|v| v.parse().ok()).unwrap_or(1);
    if event == 3 {
        return None;
    }

    let chord = match code {
        57_344 => KeyChord::named(NamedKey::Escape),
        57_345 => KeyChord::named(NamedKey::Return),
        57_346 => KeyChord::named(NamedKey::Tab),
        57_347 => KeyChord::named(NamedKey::Backspace),
        57_348 => KeyChord::named(NamedKey::Insert),
        57_349 => KeyChord::named(NamedKey::Delete),
        57_350 => KeyChord::arrow(Direction::Left),
        57_351 => KeyChord::arrow(Direction::Right),
        57_352 => KeyChord::arrow(Direction::Up),
        57_353 => KeyChord::arrow(Direction::Down),
        57_354 => KeyChord::named(NamedKey::PageUp),
        57_355 => KeyChord::named(NamedKey::PageDown),
        57_356 => KeyChord::named(NamedKey::Home),
        57_357 => KeyChord::named(NamedKey::End),
        57_364..=57_387 => KeyChord::new(BaseKey::Function((code - 57_364 + 1) as u8)),
        57_358..=57_363 | 57_388..=63_743 => return None,
        _ => code_point_chord(char::from_u32(code)?)?,
    };
    Some(chord.with_modifiers(Modifiers::from_xterm(mod_value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameLexer;
    use crate::quirks::{Quirks, TerminalFamily};

    fn resolver(family: TerminalFamily) -> KeyChordResolver {
        KeyChordResolver::new(
            TerminalProfile::for_family(family).shared(),
            &EngineConfig::default(),
        )
    }

    fn keys(family: TerminalFamily, bytes: &[u8]) -> Vec<Resolved> {
        let mut r = resolver(family);
        let frames = FrameLexer::new().feed(bytes);
        let mut out = Vec::new();
        r.resolve_run(&frames, Instant::now(), false, &mut out);
        out
    }

    fn key(chord: KeyChord) -> Resolved {
        Resolved::Key(chord)
    }

    fn ctrl(c: char) -> KeyChord {
        KeyChord::new(BaseKey::Letter(c)).with_modifiers(Modifiers::CONTROL)
    }

    #[test]
    fn control_bytes() {
        assert_eq!(keys(TerminalFamily::Xterm, b"\x03"), vec![key(ctrl('c'))]);
        assert_eq!(
            keys(TerminalFamily::Xterm, b"\r\t\x7f"),
            vec![
                key(KeyChord::named(NamedKey::Return)),
                key(KeyChord::named(NamedKey::Tab)),
                key(KeyChord::named(NamedKey::Backspace)),
            ]
        );
        assert_eq!(
            keys(TerminalFamily::Xterm, b"\x1c"),
            vec![key(
                KeyChord::new(BaseKey::Punct('\\')).with_modifiers(Modifiers::CONTROL)
            )]
        );
    }

    #[test]
    fn modified_arrows_and_function_keys() {
        assert_eq!(
            keys(TerminalFamily::Xterm, b"\x1b[1;5A"),
            vec![key(KeyChord::arrow(Direction::Up).with_modifiers(Modifiers::CONTROL))]
        );
        assert_eq!(
            keys(TerminalFamily::Xterm, b"\x1bOQ"),
            vec![key(KeyChord::new(BaseKey::Function(2)))]
        );
        assert_eq!(
            keys(TerminalFamily::Xterm, b"\x1b[15;2~"),
            vec![key(
                KeyChord::new(BaseKey::Function(5)).with_modifiers(Modifiers::SHIFT)
            )]
        );
        assert_eq!(
            keys(TerminalFamily::Xterm, b"\x1b[24~"),
            vec![key(KeyChord::new(BaseKey::Function(12)))]
        );
        assert_eq!(
            keys(TerminalFamily::Xterm, b"\x1b[Z"),
            vec![key(KeyChord::named(NamedKey::Tab).with_modifiers(Modifiers::SHIFT))]
        );
    }

    #[test]
    fn tilde_named_keys() {
        for (bytes, named) in [
            (&b"\x1b[2~"[..], NamedKey::Insert),
            (b"\x1b[3~", NamedKey::Delete),
            (b"\x1b[5~", NamedKey::PageUp),
            (b"\x1b[6~", NamedKey::PageDown),
        ] {
            assert_eq!(keys(TerminalFamily::Xterm, bytes), vec![key(KeyChord::named(named))]);
        }
    }

    #[test]
    fn option_pairs() {
        assert_eq!(
            keys(TerminalFamily::Xterm, b"\x1bx"),
            vec![key(KeyChord::from_char('x').with_modifiers(Modifiers::OPTION))]
        );
        assert_eq!(
            keys(TerminalFamily::Xterm, b"\x1b\x7f"),
            vec![key(
                KeyChord::named(NamedKey::Backspace).with_modifiers(Modifiers::OPTION)
            )]
        );
    }

    #[test]
    fn family_override_wins() {
        let opt_left = KeyChord::arrow(Direction::Left).with_modifiers(Modifiers::OPTION);
        assert_eq!(keys(TerminalFamily::AppleTerminal, b"\x1bb"), vec![key(opt_left)]);
        assert_eq!(
            keys(TerminalFamily::Xterm, b"\x1bb"),
            vec![key(KeyChord::from_char('b').with_modifiers(Modifiers::OPTION))]
        );
        assert_eq!(
            keys(TerminalFamily::AppleTerminal, b"\x1b[5~"),
            vec![key(KeyChord::arrow(Direction::Up).with_modifiers(Modifiers::FN))]
        );
    }

    #[test]
    fn fn_arrows_stay_page_keys_without_their_quirk() {
        let profile = TerminalProfile::for_family(TerminalFamily::AppleTerminal);
        let quirks = profile.quirks() - Quirks::FN_ARROW_REQUIRES_SCROLLBACK_AWARE;
        let mut r =
            KeyChordResolver::new(profile.with_quirks(quirks).shared(), &EngineConfig::default());
        let mut out = Vec::new();
        r.resolve_run(&FrameLexer::new().feed(b"\x1b[5~"), Instant::now(), false, &mut out);
        assert_eq!(out, vec![key(KeyChord::named(NamedKey::PageUp))]);
    }

    #[test]
    fn escape_prefix_adds_option() {
        assert_eq!(
            keys(TerminalFamily::Xterm, b"\x1b\x1b[A"),
            vec![key(KeyChord::arrow(Direction::Up).with_modifiers(Modifiers::OPTION))]
        );
        assert_eq!(
            keys(TerminalFamily::Xterm, b"\x1b\x1bOP"),
            vec![key(KeyChord::new(BaseKey::Function(1)).with_modifiers(Modifiers::OPTION))]
        );
    }

    #[test]
    fn kitty_and_modify_other_keys() {
        let shift_esc = KeyChord::named(NamedKey::Escape).with_modifiers(Modifiers::SHIFT);
        assert_eq!(keys(TerminalFamily::Kitty, b"\x1b[27;2u"), vec![key(shift_esc)]);
        assert_eq!(keys(TerminalFamily::Xterm, b"\x1b[27;2;27~"), vec![key(shift_esc)]);
        assert_eq!(
            keys(TerminalFamily::Kitty, b"\x1b[97;5u"),
            vec![key(ctrl('a'))]
        );
        assert_eq!(keys(TerminalFamily::Kitty, b"\x1b[97;5:3u"), vec![]);
        assert_eq!(
            keys(TerminalFamily::Kitty, b"\x1b[57364u"),
            vec![key(KeyChord::new(BaseKey::Function(1)))]
        );
    }

    #[test]
    fn text_is_one_chord_per_character() {
        assert_eq!(
            keys(TerminalFamily::Xterm, b"aB"),
            vec![
                key(KeyChord::from_char('a')),
                key(KeyChord::new(BaseKey::Letter('b')).with_modifiers(Modifiers::SHIFT)),
            ]
        );
    }

    #[test]
    fn combining_sequences_are_composed() {
        assert_eq!(
            keys(TerminalFamily::Xterm, "e\u{301}".as_bytes()),
            vec![key(KeyChord::new(BaseKey::Unicode('é')))]
        );
    }

    #[test]
    fn dead_accent_composes_with_next_letter() {
        let mut r = resolver(TerminalFamily::AppleTerminal);
        let now = Instant::now();
        let mut out = Vec::new();
        r.resolve_run(&[Frame::Text("´".into())], now, false, &mut out);
        assert!(out.is_empty());
        assert!(r.has_pending_accent());

        r.resolve_run(&[Frame::Text("E".into())], now, false, &mut out);
        assert_eq!(
            out,
            vec![key(
                KeyChord::new(BaseKey::Unicode('É'))
                    .with_modifiers(Modifiers::OPTION | Modifiers::SHIFT)
            )]
        );
    }

    #[test]
    fn dead_accent_then_space_is_accent_alone() {
        let out = keys(TerminalFamily::Xterm, "¨ ".as_bytes());
        assert_eq!(out, vec![key(KeyChord::new(BaseKey::Unicode('¨')))]);
    }

    #[test]
    fn dead_accent_then_non_letter_flushes_both() {
        let out = keys(TerminalFamily::Xterm, "ˆ1".as_bytes());
        assert_eq!(
            out,
            vec![
                key(KeyChord::new(BaseKey::Unicode('ˆ'))),
                key(KeyChord::from_char('1')),
            ]
        );
        let out = keys(TerminalFamily::Xterm, "˜\x1b[A".as_bytes());
        assert_eq!(
            out,
            vec![
                key(KeyChord::new(BaseKey::Unicode('˜'))),
                key(KeyChord::arrow(Direction::Up)),
            ]
        );
    }

    #[test]
    fn dead_accent_times_out() {
        let mut r = resolver(TerminalFamily::Xterm);
        let now = Instant::now();
        let mut out = Vec::new();
        r.resolve_run(&[Frame::Text("´".into())], now, false, &mut out);
        let deadline = r.next_deadline().unwrap();
        r.tick(deadline - Duration::from_millis(1), &mut out);
        assert!(out.is_empty());
        r.tick(deadline, &mut out);
        assert_eq!(out, vec![key(KeyChord::new(BaseKey::Unicode('´')))]);
        assert_eq!(r.next_deadline(), None);
    }

    #[test]
    fn dead_keys_can_be_disabled() {
        let config = EngineConfig {
            dead_keys: false,
            ..EngineConfig::default()
        };
        let mut r = KeyChordResolver::new(TerminalProfile::baseline().shared(), &config);
        let mut out = Vec::new();
        r.resolve_run(&[Frame::Text("´e".into())], Instant::now(), false, &mut out);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn jammed_arrows_make_a_diagonal() {
        assert_eq!(
            keys(TerminalFamily::Xterm, b"\x1b[A\x1b[C"),
            vec![key(KeyChord::new(BaseKey::Diagonal(Diagonal::UpRight)))]
        );
    }

    #[test]
    fn parallel_or_long_arrow_runs_stay_separate() {
        assert_eq!(keys(TerminalFamily::Xterm, b"\x1b[A\x1b[B").len(), 2);
        assert_eq!(keys(TerminalFamily::Xterm, b"\x1b[A\x1b[C\x1b[A").len(), 3);
        let modified = keys(TerminalFamily::Xterm, b"\x1b[1;2A\x1b[C");
        assert_eq!(modified.len(), 2);
    }

    #[test]
    fn leading_arrows_become_a_burst() {
        let mut r = resolver(TerminalFamily::AppleTerminal);
        let frames = FrameLexer::new().feed(b"\x1b[D\x1b[D\x1b[D\x1b[Ax");
        let mut out = Vec::new();
        r.resolve_run(&frames, Instant::now(), true, &mut out);
        assert_eq!(
            out,
            vec![
                Resolved::ArrowBurst(vec![
                    Direction::Left,
                    Direction::Left,
                    Direction::Left,
                    Direction::Up,
                ]),
                key(KeyChord::from_char('x')),
            ]
        );
    }

    #[test]
    fn bursts_off_keeps_arrows() {
        let out = keys(TerminalFamily::AppleTerminal, b"\x1b[D\x1b[D\x1b[D");
        assert_eq!(out, vec![key(KeyChord::arrow(Direction::Left)); 3]);
    }

    #[test]
    fn replies_and_mouse_frames_have_no_key_meaning() {
        let r = resolver(TerminalFamily::Xterm);
        assert_eq!(r.resolve_frame(&Frame::csi(b"?1;2c", b'c')), None);
        assert_eq!(r.resolve_frame(&Frame::csi(b"<0;1;1", b'M')), None);
        assert_eq!(
            r.resolve_frame(&Frame::Csi {
                params: b"2".to_vec(),
                intermediates: b" ".to_vec(),
                final_byte: b'q',
            }),
            None
        );
    }
}
