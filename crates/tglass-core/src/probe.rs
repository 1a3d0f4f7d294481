#![forbid(unsafe_code)]

//! Capability queries and the disambiguation prober.
//!
//! Terminals answer queries in order, after every byte they sent before the
//! query arrived. So when an ambiguous prefix (a lone `ESC`) is pending, a
//! query round trip settles it: either more bytes extend the prefix first,
//! or the reply shows up and proves the prefix stood alone.
//!
//! # Wire formats
//!
//! | Query                | Sent              | Reply                          |
//! |----------------------|-------------------|--------------------------------|
//! | Device status (DSR)  | `CSI 5 n`         | `CSI 0 n`                      |
//! | Cursor position (CPR)| `CSI 6 n`         | `CSI row ; col R`              |
//! | Screen size          | `CSI 18 t`        | `CSI 8 ; rows ; cols t`        |
//! | Background color     | `OSC 11 ; ? ST`   | `OSC 11 ; rgb:RRRR/GGGG/BBBB ST` |
//! | DA1                  | `CSI c`           | `CSI ? Ps ; ... c`             |
//! | DA2                  | `CSI > c`         | `CSI > Pp ; Pv ; Pc c`         |
//!
//! # Fail-open
//!
//! Every probe has a deadline. An unanswered disambiguation probe resolves
//! its prefix as standalone; a reply that arrives afterwards is discarded.

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use crate::frame::{Frame, csi_marker, csi_numbers};
use crate::profile::TerminalProfile;
use crate::quirks::Quirks;

/// Probes older than this are forgotten even if never answered.
const STALE_AFTER: Duration = Duration::from_secs(5);

/// A query the engine can send to the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeQuery {
    DeviceStatus,
    CursorPosition,
    ScreenSize,
    BackgroundColor,
    PrimaryAttributes,
    SecondaryAttributes,
}

impl ProbeQuery {
    /// Bytes to write to the terminal.
    #[must_use]
    pub const fn bytes(self) -> &'static [u8] {
        match self {
            Self::DeviceStatus => b"\x1b[5n",
            Self::CursorPosition => b"\x1b[6n",
            Self::ScreenSize => b"\x1b[18t",
            Self::BackgroundColor => b"\x1b]11;?\x1b\\",
            Self::PrimaryAttributes => b"\x1b[c",
            Self::SecondaryAttributes => b"\x1b[>c",
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DeviceStatus => "device-status",
            Self::CursorPosition => "cursor-position",
            Self::ScreenSize => "screen-size",
            Self::BackgroundColor => "background-color",
            Self::PrimaryAttributes => "primary-attributes",
            Self::SecondaryAttributes => "secondary-attributes",
        }
    }
}

impl fmt::Display for ProbeQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed answer to one of the [`ProbeQuery`] kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityReply {
    /// `CSI 0 n`.
    DeviceOk,
    /// Cursor position, 0-indexed.
    CursorPosition { row: u16, col: u16 },
    ScreenSize { rows: u16, cols: u16 },
    /// Perceived luminance of the background is below one half.
    Background { dark: bool },
    /// DA1 attribute codes.
    PrimaryAttributes(Vec<u32>),
    /// DA2 terminal type and firmware version.
    SecondaryAttributes { terminal_type: u32, version: u32 },
}

impl CapabilityReply {
    /// The query this reply answers.
    #[must_use]
    pub const fn query(&self) -> ProbeQuery {
        match self {
            Self::DeviceOk => ProbeQuery::DeviceStatus,
            Self::CursorPosition { .. } => ProbeQuery::CursorPosition,
            Self::ScreenSize { .. } => ProbeQuery::ScreenSize,
            Self::Background { .. } => ProbeQuery::BackgroundColor,
            Self::PrimaryAttributes(_) => ProbeQuery::PrimaryAttributes,
            Self::SecondaryAttributes { .. } => ProbeQuery::SecondaryAttributes,
        }
    }
}

/// Recognize a capability reply frame.
///
/// `CSI 1 ; m R` parses as a cursor report here; whether it is really a
/// modified F3 is decided by the caller from context.
#[must_use]
pub fn parse_reply(frame: &Frame) -> Option<CapabilityReply> {
    match frame {
        Frame::Csi {
            params,
            intermediates,
            final_byte,
        } if intermediates.is_empty() => parse_csi_reply(params, *final_byte),
        Frame::Osc {
            code: Some(11),
            payload,
        } => parse_background(payload).map(|dark| CapabilityReply::Background { dark }),
        _ => None,
    }
}

fn parse_csi_reply(params: &[u8], final_byte: u8) -> Option<CapabilityReply> {
    let marker = csi_marker(params);
    let numbers = csi_numbers(params);
    match (marker, final_byte) {
        (None, b'n') if params == b"0" => Some(CapabilityReply::DeviceOk),
        (None, b'R') => match numbers.as_slice() {
            [Some(row), Some(col)] => Some(CapabilityReply::CursorPosition {
                row: one_based(*row)?,
                col: one_based(*col)?,
            }),
            _ => None,
        },
        (None, b't') => match numbers.as_slice() {
            [Some(8), Some(rows), Some(cols)] => Some(CapabilityReply::ScreenSize {
                rows: u16::try_from(*rows).ok()?,
                cols: u16::try_from(*cols).ok()?,
            }),
            _ => None,
        },
        (Some(b'?'), b'c') => Some(CapabilityReply::PrimaryAttributes(
            numbers.into_iter().flatten().collect(),
        )),
        (Some(b'>'), b'c') => match numbers.as_slice() {
            [Some(terminal_type), Some(version), ..] => Some(CapabilityReply::SecondaryAttributes {
                terminal_type: *terminal_type,
                version: *version,
            }),
            _ => None,
        },
        _ => None,
    }
}

fn one_based(value: u32) -> Option<u16> {
    u16::try_from(value.checked_sub(1)?).ok()
}

/// Map a DA2 terminal type to a human-readable name.
#[must_use]
pub fn da2_id_to_name(id: u32) -> &'static str {
    match id {
        0 => "vt100",
        1 => "vt220",
        2 => "vt240",
        41 => "xterm",
        65 => "vt520",
        77 => "mintty",
        83 => "screen",
        84 => "tmux",
        85 => "rxvt-unicode",
        _ => "unknown",
    }
}

/// Decide dark/light from an OSC 11 payload such as `rgb:1e1e/1e1e/1e1e`.
fn parse_background(payload: &[u8]) -> Option<bool> {
    let s = std::str::from_utf8(payload).ok()?;
    let rgb = &s[s.find("rgb:")? + 4..];

    let parts: Vec<&str> = rgb
        .split('/')
        .map(|p| {
            let end = p.find(|c: char| !c.is_ascii_hexdigit()).unwrap_or(p.len());
            &p[..end]
        })
        .collect();
    if parts.len() < 3 {
        return None;
    }

    // X11 colors carry 1-4 hex digits per component.
    let channel = |part: &str| -> Option<f64> {
        if part.is_empty() || part.len() > 4 {
            return None;
        }
        let value = u16::from_str_radix(part, 16).ok()?;
        let scale = match part.len() {
            1 => 15.0,
            2 => 255.0,
            3 => 4095.0,
            _ => 65535.0,
        };
        Some(f64::from(value) / scale)
    };
    let (r, g, b) = (channel(parts[0])?, channel(parts[1])?, channel(parts[2])?);

    // ITU-R BT.601 perceived luminance.
    Some(0.299 * r + 0.587 * g + 0.114 * b < 0.5)
}

/// Identifier of an issued probe.
pub type ProbeId = u64;

/// Why a probe was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbePurpose {
    /// Settle a pending ambiguous prefix.
    Disambiguate,
    /// The caller asked for the answer.
    Capability,
}

/// What the engine should do when a probe settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Resolve the pending prefix as a complete keystroke.
    Standalone,
    /// Swallow the reply.
    Discard,
    /// Hand the reply (or the timeout) to the caller.
    Report,
}

/// One query waiting for its reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingProbe {
    pub id: ProbeId,
    pub query: ProbeQuery,
    pub purpose: ProbePurpose,
    pub issued_at: Instant,
    pub deadline: Instant,
    /// Set when the prefix was settled by input before the reply came.
    pub cancelled: bool,
    /// Set once the deadline passed.
    pub expired: bool,
}

impl PendingProbe {
    /// Resolution when the deadline passes unanswered.
    #[must_use]
    pub const fn on_timeout(&self) -> Resolution {
        match (self.purpose, self.cancelled) {
            (_, true) => Resolution::Discard,
            (ProbePurpose::Disambiguate, false) => Resolution::Standalone,
            (ProbePurpose::Capability, false) => Resolution::Report,
        }
    }

    /// Resolution when the matching reply arrives.
    #[must_use]
    pub const fn on_match(&self) -> Resolution {
        match (self.purpose, self.cancelled || self.expired) {
            (_, true) => Resolution::Discard,
            (ProbePurpose::Disambiguate, false) => Resolution::Standalone,
            (ProbePurpose::Capability, false) => Resolution::Report,
        }
    }

    const fn is_live(&self) -> bool {
        !self.cancelled && !self.expired
    }
}

/// Tracks outstanding probes for one input stream.
///
/// At most one probe is live at a time unless the family guarantees ordered
/// replies, in which case up to `max_outstanding` may be pipelined. Probes
/// stay tracked after they are cancelled or expire so their late replies
/// can still be matched and discarded.
#[derive(Debug)]
pub struct DisambiguationProber {
    outstanding: VecDeque<PendingProbe>,
    next_id: ProbeId,
    ceiling: Duration,
    pipelined: bool,
    max_outstanding: usize,
}

impl DisambiguationProber {
    #[must_use]
    pub fn new(profile: &TerminalProfile, ceiling: Duration, max_outstanding: usize) -> Self {
        Self {
            outstanding: VecDeque::new(),
            next_id: 1,
            ceiling,
            pipelined: profile.has(Quirks::ORDERED_PROBE_REPLIES),
            max_outstanding: max_outstanding.max(1),
        }
    }

    #[must_use]
    pub const fn ceiling(&self) -> Duration {
        self.ceiling
    }

    /// Whether a new ambiguity may get its own probe, or must queue behind
    /// the newest live one.
    #[must_use]
    pub fn wants_probe(&self) -> bool {
        let live = self.outstanding.iter().filter(|p| p.is_live()).count();
        if live == 0 {
            return self.outstanding.len() < self.max_outstanding;
        }
        self.pipelined && self.outstanding.len() < self.max_outstanding
    }

    /// Record a query as sent at `now`.
    pub fn issue(&mut self, query: ProbeQuery, purpose: ProbePurpose, now: Instant) -> ProbeId {
        let id = self.next_id;
        self.next_id += 1;
        self.outstanding.push_back(PendingProbe {
            id,
            query,
            purpose,
            issued_at: now,
            deadline: now + self.ceiling,
            cancelled: false,
            expired: false,
        });
        crate::debug!(probe = id, query = %query, ?purpose, "probe issued");
        id
    }

    /// The prefix a probe was covering has been settled by input; its reply
    /// is now a no-op.
    pub fn cancel(&mut self, id: ProbeId) {
        if let Some(probe) = self.outstanding.iter_mut().find(|p| p.id == id) {
            if !probe.cancelled {
                probe.cancelled = true;
                crate::debug!(probe = id, query = %probe.query, "probe cancelled");
            }
        }
    }

    /// Match a reply to the oldest outstanding probe of its kind.
    pub fn on_reply(&mut self, query: ProbeQuery, now: Instant) -> Option<PendingProbe> {
        let at = self.outstanding.iter().position(|p| p.query == query)?;
        let probe = self.outstanding.remove(at)?;
        crate::debug!(
            probe = probe.id,
            query = %query,
            rtt_us = now.saturating_duration_since(probe.issued_at).as_micros() as u64,
            "probe resolved"
        );
        Some(probe)
    }

    /// Mark probes past their deadline as expired and return them.
    ///
    /// Probes older than a few seconds are dropped entirely.
    pub fn expire(&mut self, now: Instant) -> Vec<PendingProbe> {
        let mut newly = Vec::new();
        for probe in &mut self.outstanding {
            if !probe.expired && now >= probe.deadline {
                probe.expired = true;
                crate::trace!(probe = probe.id, query = %probe.query, "probe expired");
                newly.push(probe.clone());
            }
        }
        self.outstanding
            .retain(|p| now.saturating_duration_since(p.issued_at) < STALE_AFTER);
        newly
    }

    /// Earliest deadline among live probes.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.outstanding
            .iter()
            .filter(|p| p.is_live())
            .map(|p| p.deadline)
            .min()
    }

    /// Whether a reply of this kind is expected.
    #[must_use]
    pub fn awaiting(&self, query: ProbeQuery) -> bool {
        self.outstanding.iter().any(|p| p.query == query)
    }

    /// The most recently issued live probe.
    #[must_use]
    pub fn newest_live(&self) -> Option<ProbeId> {
        self.outstanding
            .iter()
            .rev()
            .find(|p| p.is_live())
            .map(|p| p.id)
    }

    #[must_use]
    pub fn get(&self, id: ProbeId) -> Option<&PendingProbe> {
        self.outstanding.iter().find(|p| p.id == id)
    }

    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }
}
