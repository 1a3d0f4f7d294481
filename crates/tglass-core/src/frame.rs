#![forbid(unsafe_code)]

//! Frame lexer.
//!
//! Splits terminal input bytes into [`Frame`]s, one byte at a time, with
//! length limits on every accumulating state.
//!
//! # Design
//!
//! The lexer only knows syntax. It never decides what a frame means, and it
//! never waits: a lone `ESC` (or a bare `ESC [`, `ESC O`, `ESC ]`) is both a
//! complete keystroke and the prefix of a longer sequence, so the lexer
//! reports [`Frame::Incomplete`] and keeps the prefix pending until one of
//! three things happens:
//!
//! - another byte extends it ([`PrefixFate::Extended`]),
//! - another `ESC` arrives in a later read, which proves the pending prefix
//!   was standalone ([`PrefixFate::Standalone`]); probe replies always start
//!   with `ESC`,
//! - the caller gives up waiting and calls [`FrameLexer::resolve_pending`].
//!
//! A probe is only sent once a read ends, so an `ESC ESC` inside one read is
//! never a key followed by a reply. It is Option+Escape, or the Option prefix
//! of the CSI or SS3 sequence that follows ([`Frame::Meta`]).
//!
//! # Limits
//!
//! - CSI sequences: 256 bytes
//! - OSC strings: 4 KiB
//! - Text runs: 4 KiB per frame (longer runs are split, not dropped)
//!
//! Overflow and malformed sequences are recorded as [`Violation`]s and the
//! salvaged bytes are emitted as a best-effort [`Frame::Text`].

use crate::error::{Violation, ViolationKind};

const ESC: u8 = 0x1B;
const BEL: u8 = 0x07;

/// Maximum CSI sequence length (parameters plus intermediates).
const MAX_CSI_LEN: usize = 256;

/// Maximum OSC payload length.
const MAX_OSC_LEN: usize = 4096;

/// Maximum bytes in one text frame.
const MAX_TEXT_LEN: usize = 4096;

/// One classified unit of the input stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// C0 control byte or DEL.
    ControlByte(u8),
    /// `ESC [` params intermediates final.
    Csi {
        params: Vec<u8>,
        intermediates: Vec<u8>,
        final_byte: u8,
    },
    /// `ESC O` final.
    Ss3(u8),
    /// `ESC` followed by one byte that starts no longer grammar.
    EscPair(u8),
    /// `ESC ]` code `;` payload, terminated by BEL or `ESC \`.
    Osc { code: Option<u32>, payload: Vec<u8> },
    /// A run of printable characters.
    Text(String),
    /// `ESC` in front of a complete CSI or SS3 sequence.
    Meta(Box<Frame>),
    /// An ambiguous prefix is now pending.
    Incomplete(Vec<u8>),
}

impl Frame {
    /// Build a CSI frame with no intermediates.
    #[must_use]
    pub fn csi(params: &[u8], final_byte: u8) -> Self {
        Self::Csi {
            params: params.to_vec(),
            intermediates: Vec::new(),
            final_byte,
        }
    }

    /// Re-encode the frame as the bytes that produced it.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::ControlByte(b) => vec![*b],
            Self::Csi {
                params,
                intermediates,
                final_byte,
            } => {
                let mut out = Vec::with_capacity(3 + params.len() + intermediates.len());
                out.extend_from_slice(b"\x1b[");
                out.extend_from_slice(params);
                out.extend_from_slice(intermediates);
                out.push(*final_byte);
                out
            }
            Self::Ss3(b) => vec![ESC, b'O', *b],
            Self::EscPair(b) => vec![ESC, *b],
            Self::Osc { code, payload } => {
                let mut out = b"\x1b]".to_vec();
                if let Some(code) = code {
                    out.extend_from_slice(code.to_string().as_bytes());
                    out.push(b';');
                }
                out.extend_from_slice(payload);
                out.extend_from_slice(b"\x1b\\");
                out
            }
            Self::Text(s) => s.as_bytes().to_vec(),
            Self::Meta(inner) => {
                let mut out = vec![ESC];
                out.extend(inner.to_bytes());
                out
            }
            Self::Incomplete(bytes) => bytes.clone(),
        }
    }

    /// True for frames that were emitted as an intermediate marker only.
    #[must_use]
    pub const fn is_marker(&self) -> bool {
        matches!(self, Self::Incomplete(_))
    }
}

/// Split CSI parameter bytes into numbers.
///
/// A leading private marker (`<`, `=`, `>`, `?`) is skipped. Empty fields
/// read as `None`. Sub-parameters after `:` are ignored.
#[must_use]
pub fn csi_numbers(params: &[u8]) -> Vec<Option<u32>> {
    let body = match params.first() {
        Some(b'<' | b'=' | b'>' | b'?') => &params[1..],
        _ => params,
    };
    if body.is_empty() {
        return Vec::new();
    }
    body.split(|&b| b == b';')
        .map(|field| {
            let main = field.split(|&b| b == b':').next().unwrap_or(field);
            std::str::from_utf8(main).ok()?.parse().ok()
        })
        .collect()
}

/// The private marker that opens a CSI parameter string, if any.
#[must_use]
pub fn csi_marker(params: &[u8]) -> Option<u8> {
    match params.first() {
        Some(&b @ (b'<' | b'=' | b'>' | b'?')) => Some(b),
        _ => None,
    }
}

/// What one byte did to the pending ambiguous prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixFate {
    /// No prefix was pending, or it is still pending.
    Untouched,
    /// The byte grew the prefix into a longer, unambiguous sequence.
    Extended,
    /// The byte proved the prefix was a complete keystroke by itself.
    Standalone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum LexState {
    #[default]
    Ground,
    /// After ESC.
    Escape,
    /// After `ESC [`, nothing collected yet.
    CsiEntry,
    /// Collecting CSI parameter bytes.
    CsiParam,
    /// Collecting CSI intermediate bytes.
    CsiIntermediate,
    /// After `ESC O`.
    Ss3,
    /// Collecting OSC payload.
    Osc,
    /// After ESC inside an OSC (checking for the `ESC \` terminator).
    OscEscape,
    /// Collecting a UTF-8 multi-byte sequence.
    Utf8 { collected: u8, expected: u8 },
}

/// Byte-at-a-time frame lexer.
///
/// ```
/// use tglass_core::frame::{Frame, FrameLexer};
///
/// let mut lexer = FrameLexer::new();
/// let frames = lexer.feed(b"\x1b[A");
/// assert!(frames.contains(&Frame::csi(b"", b'A')));
/// ```
#[derive(Debug, Default)]
pub struct FrameLexer {
    state: LexState,
    params: Vec<u8>,
    intermediates: Vec<u8>,
    osc: Vec<u8>,
    text: String,
    utf8: [u8; 4],
    /// The pending `ESC` arrived in the current read.
    fresh_escape: bool,
    /// An `ESC ESC` was seen: the next sequence carries Option.
    meta: bool,
    violations: Vec<Violation>,
}

impl FrameLexer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lex a whole read buffer. Text still accumulating at the end is
    /// flushed, so every frame of the buffer is returned except a pending
    /// ambiguous prefix or a partial sequence.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Frame> {
        self.start_read();
        let mut out = Vec::new();
        for &byte in bytes {
            self.advance(byte, &mut out);
        }
        self.flush_text(&mut out);
        out
    }

    /// Mark the start of a new read buffer. An `ESC` still pending from the
    /// previous read can no longer pair with a following `ESC`.
    pub fn start_read(&mut self) {
        self.fresh_escape = false;
    }

    /// Advance by one byte, pushing any completed frames.
    pub fn advance(&mut self, byte: u8, out: &mut Vec<Frame>) -> PrefixFate {
        let was_ambiguous = self.is_ambiguous();
        let pairs = byte == ESC
            && self.state == LexState::Escape
            && self.fresh_escape
            && !self.meta;
        match self.state {
            LexState::Ground => self.ground(byte, out),
            LexState::Escape => self.escape(byte, out),
            LexState::CsiEntry => self.csi_entry(byte, out),
            LexState::CsiParam => self.csi_param(byte, out),
            LexState::CsiIntermediate => self.csi_intermediate(byte, out),
            LexState::Ss3 => self.ss3(byte, out),
            LexState::Osc => self.osc(byte, out),
            LexState::OscEscape => self.osc_escape(byte, out),
            LexState::Utf8 {
                collected,
                expected,
            } => self.utf8(byte, collected, expected, out),
        }

        if !was_ambiguous || pairs {
            PrefixFate::Untouched
        } else if byte == ESC || byte >= 0x80 {
            // A fresh ESC (or non-ASCII) cannot continue the prefix.
            PrefixFate::Standalone
        } else if self.is_ambiguous() {
            PrefixFate::Untouched
        } else {
            PrefixFate::Extended
        }
    }

    /// Emit the text run collected so far, if any.
    pub fn flush_text(&mut self, out: &mut Vec<Frame>) {
        if !self.text.is_empty() {
            out.push(Frame::Text(std::mem::take(&mut self.text)));
        }
    }

    /// The bytes of the ambiguous prefix currently pending, if any.
    #[must_use]
    pub fn pending_ambiguity(&self) -> Option<&'static [u8]> {
        match (self.state, self.meta) {
            (LexState::Escape, true) => Some(b"\x1b\x1b"),
            (LexState::CsiEntry, true) => Some(b"\x1b\x1b["),
            (LexState::Ss3, true) => Some(b"\x1b\x1bO"),
            (LexState::Escape, false) => Some(b"\x1b"),
            (LexState::CsiEntry, false) => Some(b"\x1b["),
            (LexState::Ss3, false) => Some(b"\x1bO"),
            (LexState::Osc, _) if self.osc.is_empty() => Some(b"\x1b]"),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_ambiguous(&self) -> bool {
        self.pending_ambiguity().is_some()
    }

    /// Resolve a pending ambiguous prefix as a standalone keystroke.
    ///
    /// Returns `true` when a prefix was pending.
    pub fn resolve_pending(&mut self, out: &mut Vec<Frame>) -> bool {
        let frame = match self.state {
            LexState::Escape => self.lone_escape(),
            LexState::CsiEntry => self.wrap(Frame::EscPair(b'[')),
            LexState::Ss3 => self.wrap(Frame::EscPair(b'O')),
            LexState::Osc if self.osc.is_empty() => Frame::EscPair(b']'),
            _ => return false,
        };
        self.flush_text(out);
        out.push(frame);
        self.state = LexState::Ground;
        true
    }

    /// Drain the violations recorded since the last call.
    pub fn take_violations(&mut self) -> Vec<Violation> {
        std::mem::take(&mut self.violations)
    }

    // ── States ───────────────────────────────────────────────────────────

    fn ground(&mut self, byte: u8, out: &mut Vec<Frame>) {
        match byte {
            ESC => self.begin_escape(out),
            0x00..=0x1F | 0x7F => {
                self.flush_text(out);
                out.push(Frame::ControlByte(byte));
            }
            0x20..=0x7E => self.push_text(char::from(byte), out),
            0xC2..=0xDF => self.begin_utf8(byte, 2),
            0xE0..=0xEF => self.begin_utf8(byte, 3),
            0xF0..=0xF4 => self.begin_utf8(byte, 4),
            // Stray continuation or invalid lead byte.
            _ => {
                self.record(ViolationKind::InvalidUtf8, vec![byte]);
                self.push_text(char::REPLACEMENT_CHARACTER, out);
            }
        }
    }

    fn escape(&mut self, byte: u8, out: &mut Vec<Frame>) {
        if self.meta && !matches!(byte, b'[' | b'O' | ESC) {
            // `ESC ESC` then something that is no key sequence.
            self.meta = false;
            if byte == b']' {
                out.push(Frame::ControlByte(ESC));
            } else {
                out.push(Frame::EscPair(ESC));
                self.state = LexState::Ground;
                self.ground(byte, out);
                return;
            }
        }
        match byte {
            b'[' => {
                self.params.clear();
                self.intermediates.clear();
                self.state = LexState::CsiEntry;
            }
            b']' => {
                self.osc.clear();
                self.state = LexState::Osc;
            }
            b'O' => self.state = LexState::Ss3,
            ESC if self.fresh_escape && !self.meta => self.meta = true,
            ESC => {
                // The pending prefix stood alone.
                let standalone = self.lone_escape();
                out.push(standalone);
                out.push(Frame::Incomplete(vec![ESC]));
                self.fresh_escape = true;
            }
            0x00..=0x7F => {
                self.state = LexState::Ground;
                out.push(Frame::EscPair(byte));
            }
            _ => {
                self.state = LexState::Ground;
                out.push(Frame::ControlByte(ESC));
                self.ground(byte, out);
            }
        }
    }

    fn csi_entry(&mut self, byte: u8, out: &mut Vec<Frame>) {
        match byte {
            0x30..=0x3F => {
                self.params.push(byte);
                self.state = LexState::CsiParam;
            }
            0x20..=0x2F => {
                self.intermediates.push(byte);
                self.state = LexState::CsiIntermediate;
            }
            0x40..=0x7E => self.finish_csi(byte, out),
            _ => {
                // `ESC [` was Option+[ all along.
                self.state = LexState::Ground;
                let pair = self.wrap(Frame::EscPair(b'['));
                out.push(pair);
                self.ground(byte, out);
            }
        }
    }

    fn csi_param(&mut self, byte: u8, out: &mut Vec<Frame>) {
        if self.csi_len() >= MAX_CSI_LEN {
            self.abort_csi(ViolationKind::CsiTooLong, out);
            self.ground(byte, out);
            return;
        }
        match byte {
            0x30..=0x3F => self.params.push(byte),
            0x20..=0x2F => {
                self.intermediates.push(byte);
                self.state = LexState::CsiIntermediate;
            }
            0x40..=0x7E => self.finish_csi(byte, out),
            _ => {
                self.abort_csi(ViolationKind::MalformedCsi, out);
                self.ground(byte, out);
            }
        }
    }

    fn csi_intermediate(&mut self, byte: u8, out: &mut Vec<Frame>) {
        if self.csi_len() >= MAX_CSI_LEN {
            self.abort_csi(ViolationKind::CsiTooLong, out);
            self.ground(byte, out);
            return;
        }
        match byte {
            0x20..=0x2F => self.intermediates.push(byte),
            0x40..=0x7E => self.finish_csi(byte, out),
            _ => {
                self.abort_csi(ViolationKind::MalformedCsi, out);
                self.ground(byte, out);
            }
        }
    }

    fn ss3(&mut self, byte: u8, out: &mut Vec<Frame>) {
        self.state = LexState::Ground;
        match byte {
            0x40..=0x7E => {
                let frame = self.wrap(Frame::Ss3(byte));
                out.push(frame);
            }
            _ => {
                let pair = self.wrap(Frame::EscPair(b'O'));
                out.push(pair);
                self.ground(byte, out);
            }
        }
    }

    fn osc(&mut self, byte: u8, out: &mut Vec<Frame>) {
        match byte {
            BEL => self.finish_osc(out),
            ESC => self.state = LexState::OscEscape,
            _ if self.osc.len() >= MAX_OSC_LEN => {
                let mut bytes = b"]".to_vec();
                bytes.append(&mut self.osc);
                self.salvage(ViolationKind::OscTooLong, bytes, out);
                self.ground(byte, out);
            }
            _ => self.osc.push(byte),
        }
    }

    fn osc_escape(&mut self, byte: u8, out: &mut Vec<Frame>) {
        if byte == b'\\' {
            self.finish_osc(out);
        } else if self.osc.is_empty() {
            // `ESC ]` then a new escape: the first pair stood alone.
            out.push(Frame::EscPair(b']'));
            out.push(Frame::Incomplete(vec![ESC]));
            self.state = LexState::Escape;
            self.fresh_escape = true;
            self.escape(byte, out);
        } else {
            self.osc.push(ESC);
            self.osc.push(byte);
            self.state = LexState::Osc;
        }
    }

    fn utf8(&mut self, byte: u8, collected: u8, expected: u8, out: &mut Vec<Frame>) {
        if byte & 0xC0 != 0x80 {
            let partial = self.utf8[..usize::from(collected)].to_vec();
            self.record(ViolationKind::InvalidUtf8, partial);
            self.state = LexState::Ground;
            self.push_text(char::REPLACEMENT_CHARACTER, out);
            self.ground(byte, out);
            return;
        }

        self.utf8[usize::from(collected)] = byte;
        let collected = collected + 1;
        if collected < expected {
            self.state = LexState::Utf8 {
                collected,
                expected,
            };
            return;
        }

        self.state = LexState::Ground;
        let bytes = self.utf8[..usize::from(expected)].to_vec();
        let decoded = std::str::from_utf8(&bytes)
            .ok()
            .and_then(|s| s.chars().next());
        match decoded {
            Some(c) => self.push_text(c, out),
            None => {
                self.record(ViolationKind::InvalidUtf8, bytes);
                self.push_text(char::REPLACEMENT_CHARACTER, out);
            }
        }
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    fn begin_escape(&mut self, out: &mut Vec<Frame>) {
        self.flush_text(out);
        out.push(Frame::Incomplete(vec![ESC]));
        self.state = LexState::Escape;
        self.fresh_escape = true;
    }

    fn begin_utf8(&mut self, lead: u8, expected: u8) {
        self.utf8[0] = lead;
        self.state = LexState::Utf8 {
            collected: 1,
            expected,
        };
    }

    fn push_text(&mut self, c: char, out: &mut Vec<Frame>) {
        if self.text.len() + c.len_utf8() > MAX_TEXT_LEN {
            self.flush_text(out);
        }
        self.text.push(c);
    }

    fn csi_len(&self) -> usize {
        self.params.len() + self.intermediates.len()
    }

    fn finish_csi(&mut self, final_byte: u8, out: &mut Vec<Frame>) {
        self.state = LexState::Ground;
        let csi = Frame::Csi {
            params: std::mem::take(&mut self.params),
            intermediates: std::mem::take(&mut self.intermediates),
            final_byte,
        };
        let frame = self.wrap(csi);
        out.push(frame);
    }

    /// Apply a pending `ESC ESC` to a completed frame.
    fn wrap(&mut self, frame: Frame) -> Frame {
        if std::mem::take(&mut self.meta) {
            Frame::Meta(Box::new(frame))
        } else {
            frame
        }
    }

    /// The frame for an `ESC` (or `ESC ESC`) that stood alone.
    fn lone_escape(&mut self) -> Frame {
        if std::mem::take(&mut self.meta) {
            Frame::EscPair(ESC)
        } else {
            Frame::ControlByte(ESC)
        }
    }

    fn abort_csi(&mut self, kind: ViolationKind, out: &mut Vec<Frame>) {
        let mut bytes = b"[".to_vec();
        bytes.append(&mut self.params);
        bytes.append(&mut self.intermediates);
        self.salvage(kind, bytes, out);
    }

    fn finish_osc(&mut self, out: &mut Vec<Frame>) {
        self.state = LexState::Ground;
        let raw = std::mem::take(&mut self.osc);
        let split = raw.iter().position(|&b| b == b';');
        let (code, payload) = match split {
            Some(at) => {
                let code = std::str::from_utf8(&raw[..at]).ok().and_then(|s| s.parse().ok());
                match code {
                    Some(code) => (Some(code), raw[at + 1..].to_vec()),
                    None => (None, raw),
                }
            }
            None => match std::str::from_utf8(&raw).ok().and_then(|s| s.parse().ok()) {
                Some(code) => (Some(code), Vec::new()),
                None => (None, raw),
            },
        };
        out.push(Frame::Osc { code, payload });
    }

    /// Record a violation and emit what was collected as text.
    fn salvage(&mut self, kind: ViolationKind, bytes: Vec<u8>, out: &mut Vec<Frame>) {
        self.state = LexState::Ground;
        self.meta = false;
        self.flush_text(out);
        let text: String = String::from_utf8_lossy(&bytes)
            .chars()
            .filter(|c| !c.is_control())
            .collect();
        if !text.is_empty() {
            out.push(Frame::Text(text));
        }
        self.record(kind, bytes);
    }

    fn record(&mut self, kind: ViolationKind, bytes: Vec<u8>) {
        crate::trace!(violation = %kind, len = bytes.len(), "input protocol violation");
        self.violations.push(Violation { kind, bytes });
    }
}
