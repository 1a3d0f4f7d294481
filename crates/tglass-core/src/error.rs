#![forbid(unsafe_code)]

//! Error taxonomy for the decode/compose engine.
//!
//! Decode-side conditions ([`Violation`], probe timeouts, unknown families)
//! are recovered inside the engine and only reported. Compose-side
//! conditions are returned to the widget that caused them. The input stream
//! failing is the only fatal case.

use std::fmt;
use std::time::Duration;

use crate::compositor::{ClaimId, WidgetId};
use crate::probe::ProbeQuery;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, GlassError>;

/// What went wrong while lexing a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// A CSI sequence ran past the length limit.
    CsiTooLong,
    /// An OSC string ran past the length limit.
    OscTooLong,
    /// A byte that is not legal at this point of a CSI sequence.
    MalformedCsi,
    /// A UTF-8 lead byte was not followed by enough continuation bytes.
    InvalidUtf8,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::CsiTooLong => "CSI sequence too long",
            Self::OscTooLong => "OSC string too long",
            Self::MalformedCsi => "malformed CSI sequence",
            Self::InvalidUtf8 => "invalid UTF-8",
        };
        f.write_str(text)
    }
}

/// A recovered protocol violation, with the bytes that were salvaged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub kind: ViolationKind,
    pub bytes: Vec<u8>,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} after {} bytes", self.kind, self.bytes.len())
    }
}

/// Every failure the engine and its drivers can report.
#[derive(Debug, thiserror::Error)]
pub enum GlassError {
    #[error("protocol violation: {0}")]
    ProtocolViolation(Violation),

    #[error("{query} probe unanswered after {waited:?}")]
    ProbeTimeout { query: ProbeQuery, waited: Duration },

    #[error("widget {widget} cannot claim cell ({row}, {col}) at z {z}: held by widget {holder}")]
    ClaimConflict {
        widget: WidgetId,
        holder: WidgetId,
        row: u16,
        col: u16,
        z: i32,
    },

    #[error("cell ({row}, {col}) is not part of claim {claim}")]
    OutsideClaim { claim: ClaimId, row: u16, col: u16 },

    #[error("cell ({row}, {col}) is outside the {rows}x{cols} screen")]
    OutsideScreen { row: u16, col: u16, rows: u16, cols: u16 },

    #[error("no active claim {0}")]
    UnknownClaim(ClaimId),

    #[error("unknown terminal family {0:?}")]
    UnknownTerminalFamily(String),

    #[error("terminal input stream closed")]
    StreamClosed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl GlassError {
    /// True for the conditions that end a session.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::StreamClosed | Self::Io(_))
    }
}
