//! Property-based invariant tests for the input path (lexer, prober,
//! resolver, engine).
//!
//! 1. Splitting a byte stream across reads does not change the events.
//! 2. A lone ESC followed by silence yields exactly one Escape and at most
//!    one probe, on every terminal family.
//! 3. `ESC [ D` split after any byte yields one Left arrow; a late probe
//!    reply yields nothing.
//! 4. The lexer never panics on arbitrary bytes.
//! 5. Two orthogonal arrows in one read resolve as a diagonal.

use std::time::{Duration, Instant};

use proptest::prelude::*;
use tglass_core::engine::{Engine, EngineEvent};
use tglass_core::frame::{Frame, FrameLexer};
use tglass_core::key::{BaseKey, Diagonal, Direction, KeyChord, NamedKey};
use tglass_core::{EngineConfig, TerminalFamily, TerminalProfile};

// ── Helpers ─────────────────────────────────────────────────────────────

const TOKENS: &[&[u8]] = &[
    b"a",
    b"Z",
    b"7",
    b" ",
    b"\r",
    b"\t",
    b"\x7f",
    b"\x1b[A",
    b"\x1b[1;5C",
    b"\x1b[3~",
    b"\x1b[15;2~",
    b"\x1bOP",
    b"\x1bx",
    b"\x1b[<0;3;4M",
    b"\x1b[<0;3;4m",
    "é".as_bytes(),
    "漢".as_bytes(),
    "🙂".as_bytes(),
];

fn stream_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(prop::sample::select(TOKENS), 0..24).prop_map(|tokens| tokens.concat())
}

fn plain_config() -> EngineConfig {
    EngineConfig {
        dead_keys: false,
        jam_detection: false,
        ..EngineConfig::default()
    }
}

fn engine(family: TerminalFamily, config: EngineConfig) -> Engine {
    Engine::new(TerminalProfile::for_family(family).shared(), config, 24, 80)
}

fn drain(engine: &mut Engine) -> Vec<EngineEvent> {
    std::iter::from_fn(|| engine.poll_event()).collect()
}

fn run_chunks(chunks: &[&[u8]]) -> Vec<EngineEvent> {
    let mut e = engine(TerminalFamily::Xterm, plain_config());
    let now = Instant::now();
    let mut events = Vec::new();
    for chunk in chunks {
        e.feed(chunk, now);
        events.extend(drain(&mut e));
    }
    e.finish(now);
    events.extend(drain(&mut e));
    events
}

/// Merge adjacent text frames so differently split streams compare equal.
fn merge_text(frames: Vec<Frame>) -> Vec<Frame> {
    let mut merged: Vec<Frame> = Vec::new();
    for frame in frames {
        if let (Some(Frame::Text(prev)), Frame::Text(next)) = (merged.last_mut(), &frame) {
            prev.push_str(next);
            continue;
        }
        merged.push(frame);
    }
    merged
}

// ═════════════════════════════════════════════════════════════════════════
// 1. Split invariance
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn lexer_frames_independent_of_split(bytes in stream_strategy(), cut in any::<prop::sample::Index>()) {
        let at = cut.index(bytes.len() + 1);
        let whole = FrameLexer::new().feed(&bytes);

        let mut lexer = FrameLexer::new();
        let mut split = lexer.feed(&bytes[..at]);
        split.extend(lexer.feed(&bytes[at..]));

        prop_assert_eq!(merge_text(whole), merge_text(split));
    }

    #[test]
    fn engine_events_independent_of_split(
        bytes in stream_strategy(),
        cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..4),
    ) {
        let mut points: Vec<usize> = cuts.iter().map(|c| c.index(bytes.len() + 1)).collect();
        points.sort_unstable();
        let mut chunks: Vec<&[u8]> = Vec::new();
        let mut start = 0;
        for p in points {
            chunks.push(&bytes[start..p]);
            start = p;
        }
        chunks.push(&bytes[start..]);

        prop_assert_eq!(run_chunks(&[&bytes]), run_chunks(&chunks));
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 2. Lone ESC
// ═════════════════════════════════════════════════════════════════════════

fn family_strategy() -> impl Strategy<Value = TerminalFamily> {
    prop::sample::select(TerminalFamily::all())
}

proptest! {
    #[test]
    fn lone_escape_is_one_key_and_at_most_one_probe(
        family in family_strategy(),
        ceiling_ms in 1u64..500,
    ) {
        let config = EngineConfig {
            probe_ceiling: Duration::from_millis(ceiling_ms),
            ..EngineConfig::default()
        };
        let mut e = engine(family, config);
        let t0 = Instant::now();
        e.feed(b"\x1b", t0);
        prop_assert!(drain(&mut e).is_empty());

        let deadline = e.next_deadline();
        prop_assert_eq!(deadline, Some(t0 + Duration::from_millis(ceiling_ms)));
        e.tick(t0 + Duration::from_millis(ceiling_ms));

        let events = drain(&mut e);
        prop_assert_eq!(events, vec![EngineEvent::Key(KeyChord::named(NamedKey::Escape))]);
        prop_assert!(e.outstanding_probes() <= 1);
        let out = e.take_output();
        prop_assert!(out == b"\x1b[5n" || out.is_empty(), "unexpected output {:?}", out);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3. Extended prefix
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn split_left_arrow_is_one_key(at in 1usize..3, family in family_strategy()) {
        let bytes = b"\x1b[D";
        let mut e = engine(family, EngineConfig::default());
        let t0 = Instant::now();
        e.feed(&bytes[..at], t0);
        e.feed(&bytes[at..], t0 + Duration::from_millis(1));
        prop_assert_eq!(
            drain(&mut e),
            vec![EngineEvent::Key(KeyChord::arrow(Direction::Left))]
        );

        e.feed(b"\x1b[0n", t0 + Duration::from_millis(4));
        e.tick(t0 + Duration::from_secs(1));
        prop_assert!(drain(&mut e).is_empty());
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. No panics
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn engine_survives_arbitrary_bytes(
        bytes in prop::collection::vec(any::<u8>(), 0..256),
        family in family_strategy(),
    ) {
        let mut e = engine(family, EngineConfig::default());
        let t0 = Instant::now();
        e.feed(&bytes, t0);
        e.tick(t0 + Duration::from_secs(1));
        e.finish(t0 + Duration::from_secs(2));
        let _ = drain(&mut e);
        prop_assert!(!e.is_waiting());
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5. Jams
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn orthogonal_arrow_jam_is_diagonal() {
    let mut e = engine(TerminalFamily::Xterm, EngineConfig::default());
    e.feed(b"\x1b[A\x1b[C", Instant::now());
    assert_eq!(
        drain(&mut e),
        vec![EngineEvent::Key(KeyChord::new(BaseKey::Diagonal(
            Diagonal::UpRight
        )))]
    );
}

#[test]
fn arrows_in_separate_reads_stay_separate() {
    let mut e = engine(TerminalFamily::Xterm, EngineConfig::default());
    let t0 = Instant::now();
    e.feed(b"\x1b[A", t0);
    e.feed(b"\x1b[C", t0 + Duration::from_millis(30));
    assert_eq!(
        drain(&mut e),
        vec![
            EngineEvent::Key(KeyChord::arrow(Direction::Up)),
            EngineEvent::Key(KeyChord::arrow(Direction::Right)),
        ]
    );
}
