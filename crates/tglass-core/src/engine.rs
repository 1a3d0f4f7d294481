#![forbid(unsafe_code)]

//! The decode/compose engine.
//!
//! One [`Engine`] per terminal session. It is a single-threaded state
//! machine with no I/O of its own: the driver feeds it bytes with a
//! timestamp, waits at most until [`Engine::next_deadline`] for more, calls
//! [`Engine::tick`] when that passes, and writes [`Engine::take_output`] to
//! the terminal.
//!
//! # Escape handling
//!
//! When a read ends on an ambiguous prefix (a lone `ESC`, or a bare
//! `ESC [`), the engine sends a probe query and waits:
//!
//! ```text
//! bytes end on prefix ──► probe sent, deadline = now + ceiling
//!        │
//!        ├── next byte extends prefix ──► probe cancelled, reply swallowed
//!        ├── next byte is ESC (reply)  ──► prefix resolved standalone
//!        └── deadline passes           ──► prefix resolved standalone
//! ```
//!
//! Reads that do not end on a prefix cost nothing.
//!
//! # Event order
//!
//! Events are queued FIFO in input order and drained with
//! [`Engine::poll_event`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use crate::compositor::Compositor;
use crate::config::EngineConfig;
use crate::error::{GlassError, Violation};
use crate::frame::{Frame, FrameLexer, PrefixFate, csi_numbers};
use crate::key::KeyChord;
use crate::pointer::{self, PointerEvent};
use crate::probe::{
    CapabilityReply, DisambiguationProber, ProbeId, ProbePurpose, ProbeQuery, Resolution,
    parse_reply,
};
use crate::profile::TerminalProfile;
use crate::quirks::Quirks;
use crate::resolver::{KeyChordResolver, Resolved};

/// Enable press/release, drag, and SGR-encoded mouse reports.
const MOUSE_ON: &[u8] = b"\x1b[?1000;1002;1006h";
const MOUSE_OFF: &[u8] = b"\x1b[?1000;1002;1006l";

/// Everything the engine reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Key(KeyChord),
    Pointer(PointerEvent),
    Resize { rows: u16, cols: u16 },
    Capability(CapabilityReply),
    /// A query sent with [`Engine::request`] got no reply in time.
    ProbeTimeout { query: ProbeQuery },
    /// Malformed input that was recovered from.
    Violation(Violation),
}

/// A pending prefix and the probe that will settle it.
#[derive(Debug, Clone, Copy)]
struct Ambiguity {
    probe: Option<ProbeId>,
    since: Instant,
    deadline: Instant,
}

/// Decode/compose state for one terminal session.
#[derive(Debug)]
pub struct Engine {
    profile: Arc<TerminalProfile>,
    config: EngineConfig,
    lexer: FrameLexer,
    prober: DisambiguationProber,
    resolver: KeyChordResolver,
    compositor: Compositor,
    ambiguity: Option<Ambiguity>,
    mouse_session: bool,
    events: VecDeque<EngineEvent>,
    out: Vec<u8>,
}

impl Engine {
    #[must_use]
    pub fn new(profile: Arc<TerminalProfile>, config: EngineConfig, rows: u16, cols: u16) -> Self {
        let prober = DisambiguationProber::new(
            &profile,
            config.probe_ceiling,
            config.max_outstanding_probes,
        );
        let resolver = KeyChordResolver::new(Arc::clone(&profile), &config);
        let compositor = Compositor::new(&profile, rows, cols, config.scrollback_capacity);
        let open_mouse = config.mouse_session;
        let mut engine = Self {
            profile,
            config,
            lexer: FrameLexer::new(),
            prober,
            resolver,
            compositor,
            ambiguity: None,
            mouse_session: false,
            events: VecDeque::new(),
            out: Vec::new(),
        };
        engine.set_mouse_session(open_mouse);
        engine
    }

    #[must_use]
    pub fn profile(&self) -> &TerminalProfile {
        &self.profile
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ── Input ────────────────────────────────────────────────────────────

    /// Process one read buffer received at `now`.
    ///
    /// Frames in the same buffer form one group for jam and arrow-burst
    /// detection, so callers should pass each read whole.
    pub fn feed(&mut self, bytes: &[u8], now: Instant) {
        self.lexer.start_read();
        let mut frames = Vec::new();
        for &byte in bytes {
            match self.lexer.advance(byte, &mut frames) {
                PrefixFate::Extended => {
                    if let Some(ambiguity) = self.ambiguity.take() {
                        crate::trace!("ambiguous prefix extended");
                        if let Some(id) = ambiguity.probe {
                            self.prober.cancel(id);
                        }
                    }
                }
                PrefixFate::Standalone => {
                    if self.ambiguity.take().is_some() {
                        crate::trace!("ambiguous prefix proven standalone");
                    }
                }
                PrefixFate::Untouched => {}
            }
        }
        self.lexer.flush_text(&mut frames);
        self.route(frames, now);
        self.drain_violations();

        if self.lexer.is_ambiguous() && self.ambiguity.is_none() {
            self.register_ambiguity(now);
        }
    }

    /// Handle deadlines that have passed by `now`.
    pub fn tick(&mut self, now: Instant) {
        if let Some(ambiguity) = self.ambiguity
            && now >= ambiguity.deadline
        {
            self.ambiguity = None;
            let mut frames = Vec::new();
            if self.lexer.resolve_pending(&mut frames) {
                crate::debug!(
                    waited_ms = now.saturating_duration_since(ambiguity.since).as_millis() as u64,
                    "no reply, prefix resolved standalone"
                );
                self.route(frames, now);
            }
        }

        for probe in self.prober.expire(now) {
            let err = GlassError::ProbeTimeout {
                query: probe.query,
                waited: now.saturating_duration_since(probe.issued_at),
            };
            match probe.on_timeout() {
                Resolution::Report => {
                    crate::warn!(probe = probe.id, error = %err, "probe timeout");
                    self.events.push_back(EngineEvent::ProbeTimeout { query: probe.query });
                }
                Resolution::Standalone => {
                    crate::debug!(probe = probe.id, error = %err, "probe timeout");
                }
                Resolution::Discard => {}
            }
        }

        let mut resolved = Vec::new();
        self.resolver.tick(now, &mut resolved);
        self.push_resolved(resolved);
    }

    /// The input stream ended: settle everything still pending.
    pub fn finish(&mut self, now: Instant) {
        self.ambiguity = None;
        let mut frames = Vec::new();
        self.lexer.resolve_pending(&mut frames);
        self.route(frames, now);
        let mut resolved = Vec::new();
        self.resolver.flush_pending(&mut resolved);
        self.push_resolved(resolved);
        self.drain_violations();
    }

    /// When [`tick`](Self::tick) next has work to do.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.ambiguity.map(|a| a.deadline),
            self.prober.next_deadline(),
            self.resolver.next_deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Next event in input order.
    pub fn poll_event(&mut self) -> Option<EngineEvent> {
        self.events.pop_front()
    }

    #[must_use]
    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    fn register_ambiguity(&mut self, now: Instant) {
        let probe = if self.prober.wants_probe() {
            let query = self.config.probe_query;
            self.out.extend_from_slice(query.bytes());
            Some(self.prober.issue(query, ProbePurpose::Disambiguate, now))
        } else {
            // Ordered replies: the outstanding probe's reply settles this too.
            self.prober.newest_live()
        };
        self.ambiguity = Some(Ambiguity {
            probe,
            since: now,
            deadline: now + self.config.probe_ceiling,
        });
    }

    fn drain_violations(&mut self) {
        for violation in self.lexer.take_violations() {
            let err = GlassError::ProtocolViolation(violation.clone());
            crate::warn!(error = %err, "recovered from malformed input");
            self.events.push_back(EngineEvent::Violation(violation));
        }
    }

    // ── Routing ──────────────────────────────────────────────────────────

    /// Split frames into key runs, capability replies, and mouse reports.
    fn route(&mut self, frames: Vec<Frame>, now: Instant) {
        let mut run: Vec<Frame> = Vec::new();
        for frame in frames {
            if frame.is_marker() {
                continue;
            }
            let frame = match frame {
                // A key's ESC ran straight into a report from the terminal.
                Frame::Meta(inner) if self.is_report(&inner) => {
                    run.push(Frame::ControlByte(0x1B));
                    *inner
                }
                other => other,
            };
            if let Some(reply) = self.classify_reply(&frame) {
                self.flush_run(&mut run, now);
                self.on_reply(reply, now);
            } else if pointer::is_sgr_mouse(&frame) {
                self.flush_run(&mut run, now);
                let mut resolved = Vec::new();
                self.resolver.flush_pending(&mut resolved);
                self.push_resolved(resolved);
                if let Some(event) = pointer::parse_sgr(&frame) {
                    self.events.push_back(EngineEvent::Pointer(event));
                }
            } else {
                run.push(frame);
            }
        }
        self.flush_run(&mut run, now);
    }

    fn is_report(&self, frame: &Frame) -> bool {
        self.classify_reply(frame).is_some() || pointer::is_sgr_mouse(frame)
    }

    /// A capability reply, unless context says the frame is a key.
    fn classify_reply(&self, frame: &Frame) -> Option<CapabilityReply> {
        let reply = parse_reply(frame)?;
        if matches!(reply, CapabilityReply::CursorPosition { .. })
            && !self.prober.awaiting(ProbeQuery::CursorPosition)
            && !self.profile.has(Quirks::SHIFT_F3_IS_CURSOR_REPORT)
            && is_row_one(frame)
        {
            // `CSI 1 ; m R` with no report requested: modified F3.
            return None;
        }
        Some(reply)
    }

    fn on_reply(&mut self, reply: CapabilityReply, now: Instant) {
        match reply {
            CapabilityReply::CursorPosition { row, col } => {
                self.compositor.model_mut().sync(row, col);
            }
            CapabilityReply::ScreenSize { rows, cols } if (rows, cols) != self.screen_size() => {
                self.resize(rows, cols);
            }
            _ => {}
        }

        let resolution = match self.prober.on_reply(reply.query(), now) {
            Some(probe) => probe.on_match(),
            // Nobody asked. Status replies mean nothing on their own.
            None if reply == CapabilityReply::DeviceOk => Resolution::Discard,
            None => Resolution::Report,
        };
        match resolution {
            Resolution::Report => self.events.push_back(EngineEvent::Capability(reply)),
            Resolution::Standalone => {
                // The reply's own ESC already settled the prefix.
                crate::trace!(query = %reply.query(), "disambiguation reply");
            }
            Resolution::Discard => {
                crate::trace!(query = %reply.query(), "probe reply discarded");
            }
        }
    }

    fn flush_run(&mut self, run: &mut Vec<Frame>, now: Instant) {
        if run.is_empty() {
            return;
        }
        let bursts = self.profile.has(Quirks::ARROW_SEQUENCE_MOUSE_COLLISION) && !self.mouse_session;
        let mut resolved = Vec::new();
        self.resolver.resolve_run(run, now, bursts, &mut resolved);
        run.clear();
        self.push_resolved(resolved);
    }

    fn push_resolved(&mut self, resolved: Vec<Resolved>) {
        for item in resolved {
            let event = match item {
                Resolved::Key(chord) => EngineEvent::Key(chord),
                Resolved::ArrowBurst(arrows) => {
                    EngineEvent::Pointer(pointer::burst_click(&arrows, self.compositor.model()))
                }
            };
            self.events.push_back(event);
        }
    }

    // ── Output and session state ─────────────────────────────────────────

    /// Send a capability query; the answer arrives as
    /// [`EngineEvent::Capability`].
    pub fn request(&mut self, query: ProbeQuery, now: Instant) -> ProbeId {
        self.out.extend_from_slice(query.bytes());
        self.prober.issue(query, ProbePurpose::Capability, now)
    }

    /// Open or close a mouse-tracking session. While one is open, arrow
    /// bursts are plain arrow keys.
    pub fn set_mouse_session(&mut self, open: bool) {
        if open != self.mouse_session {
            self.out
                .extend_from_slice(if open { MOUSE_ON } else { MOUSE_OFF });
            self.mouse_session = open;
        }
    }

    #[must_use]
    pub const fn mouse_session(&self) -> bool {
        self.mouse_session
    }

    /// Adopt a new screen size and report it.
    pub fn resize(&mut self, rows: u16, cols: u16) {
        self.compositor.resize(rows, cols);
        let (rows, cols) = self.compositor.size();
        crate::debug!(rows, cols, "screen resized");
        self.events.push_back(EngineEvent::Resize { rows, cols });
    }

    /// Bytes to write to the terminal: queries, mode changes, and rendered
    /// screen updates.
    pub fn take_output(&mut self) -> Vec<u8> {
        let mut out = std::mem::take(&mut self.out);
        out.extend(self.compositor.take_output());
        out
    }

    #[must_use]
    pub const fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    pub fn compositor_mut(&mut self) -> &mut Compositor {
        &mut self.compositor
    }

    /// Cursor position as last reported or tracked, 0-indexed.
    #[must_use]
    pub const fn cursor(&self) -> (u16, u16) {
        self.compositor.model().cursor()
    }

    /// `(rows, cols)`.
    #[must_use]
    pub const fn screen_size(&self) -> (u16, u16) {
        self.compositor.size()
    }

    /// Whether a prefix is waiting on a probe or the deadline.
    #[must_use]
    pub fn is_waiting(&self) -> bool {
        self.ambiguity.is_some()
    }

    /// Probes sent and not yet answered, cancelled ones included.
    #[must_use]
    pub fn outstanding_probes(&self) -> usize {
        self.prober.outstanding()
    }
}

fn is_row_one(frame: &Frame) -> bool {
    match frame {
        Frame::Csi { params, .. } => csi_numbers(params).first() == Some(&Some(1)),
        _ => false,
    }
}
