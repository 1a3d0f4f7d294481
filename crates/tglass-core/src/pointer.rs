#![forbid(unsafe_code)]

//! Pointer resolver.
//!
//! Two sources produce [`PointerEvent`]s:
//!
//! - SGR mouse reports, `CSI < b ; x ; y M` (press/motion/wheel) and
//!   `... m` (release).
//! - Arrow bursts. Some terminals answer Option+click by sending the arrow
//!   keys that would walk the cursor to the clicked cell. The burst is
//!   collapsed into counted moves and replayed against the column model,
//!   following the terminal's own line-wrap rules, to recover the target.

use std::io::Write;

use crate::frame::{Frame, csi_marker, csi_numbers};
use crate::key::{Direction, Modifiers};
use crate::width::ColumnModel;

/// Which mouse button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

/// What the pointer did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerKind {
    Press(MouseButton),
    Release(MouseButton),
    Drag(MouseButton),
    /// Motion with no button held.
    Move,
    WheelUp,
    WheelDown,
    WheelLeft,
    WheelRight,
    /// Option+click recovered from an arrow burst.
    AltClick,
}

/// A pointer action at a 0-indexed cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PointerEvent {
    pub kind: PointerKind,
    pub row: u16,
    pub col: u16,
    pub modifiers: Modifiers,
}

/// True for frames shaped like an SGR mouse report.
#[must_use]
pub fn is_sgr_mouse(frame: &Frame) -> bool {
    matches!(
        frame,
        Frame::Csi { params, intermediates, final_byte: b'M' | b'm' }
            if intermediates.is_empty() && csi_marker(params) == Some(b'<')
    )
}

/// Decode an SGR mouse report.
#[must_use]
pub fn parse_sgr(frame: &Frame) -> Option<PointerEvent> {
    if !is_sgr_mouse(frame) {
        return None;
    }
    let Frame::Csi {
        params, final_byte, ..
    } = frame
    else {
        return None;
    };
    let numbers = csi_numbers(params);
    let [Some(code), Some(x), Some(y)] = numbers.as_slice() else {
        return None;
    };
    let code = *code;

    let mut modifiers = Modifiers::NONE;
    if code & 4 != 0 {
        modifiers |= Modifiers::SHIFT;
    }
    if code & 8 != 0 {
        modifiers |= Modifiers::OPTION;
    }
    if code & 16 != 0 {
        modifiers |= Modifiers::CONTROL;
    }

    let button = match code & 3 {
        0 => Some(MouseButton::Left),
        1 => Some(MouseButton::Middle),
        2 => Some(MouseButton::Right),
        _ => None,
    };
    let kind = if code & 64 != 0 {
        match code & 3 {
            0 => PointerKind::WheelUp,
            1 => PointerKind::WheelDown,
            2 => PointerKind::WheelLeft,
            _ => PointerKind::WheelRight,
        }
    } else if *final_byte == b'm' {
        PointerKind::Release(button.unwrap_or(MouseButton::Left))
    } else if code & 32 != 0 {
        button.map_or(PointerKind::Move, PointerKind::Drag)
    } else {
        PointerKind::Press(button?)
    };

    Some(PointerEvent {
        kind,
        row: coordinate(*y),
        col: coordinate(*x),
        modifiers,
    })
}

fn coordinate(one_based: u32) -> u16 {
    u16::try_from(one_based.saturating_sub(1)).unwrap_or(u16::MAX)
}

/// A run of identical arrow presses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrowMove {
    pub direction: Direction,
    pub count: u16,
}

impl ArrowMove {
    /// The counted cursor movement, `CSI n A/B/C/D`.
    #[must_use]
    pub fn to_bytes(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8);
        // Infallible: writing into a Vec.
        let _ = write!(out, "\x1b[{}", self.count);
        out.push(self.direction.final_byte());
        out
    }
}

/// Run-length group a burst of arrows.
#[must_use]
pub fn arrowheads_to_moves(arrows: &[Direction]) -> Vec<ArrowMove> {
    let mut moves: Vec<ArrowMove> = Vec::new();
    for &direction in arrows {
        match moves.last_mut() {
            Some(last) if last.direction == direction && last.count < u16::MAX => last.count += 1,
            _ => moves.push(ArrowMove {
                direction,
                count: 1,
            }),
        }
    }
    moves
}

/// Replay an arrow burst from `origin` and return the cell it lands on.
///
/// Horizontal steps cross a row edge only where the rows are one soft-wrapped
/// logical line; a hard line end clamps. Vertical steps clamp to the screen.
#[must_use]
pub fn resolve_burst(arrows: &[Direction], origin: (u16, u16), model: &ColumnModel) -> (u16, u16) {
    let (rows, cols) = model.size();
    let mut row = origin.0.min(rows - 1);
    let mut col = origin.1.min(cols - 1);

    for step in arrowheads_to_moves(arrows) {
        for _ in 0..step.count {
            match step.direction {
                Direction::Up => row = row.saturating_sub(1),
                Direction::Down => row = (row + 1).min(rows - 1),
                Direction::Left if col > 0 => col -= 1,
                Direction::Left => {
                    if row > 0 && model.is_soft_wrapped(row) {
                        row -= 1;
                        col = cols - 1;
                    }
                }
                Direction::Right if col + 1 < cols => col += 1,
                Direction::Right => {
                    if row + 1 < rows && model.is_soft_wrapped(row + 1) {
                        row += 1;
                        col = 0;
                    }
                }
            }
        }
    }
    (row, col)
}

/// Turn a burst into the click it stands for.
#[must_use]
pub fn burst_click(arrows: &[Direction], model: &ColumnModel) -> PointerEvent {
    let (row, col) = resolve_burst(arrows, model.cursor(), model);
    crate::debug!(arrows = arrows.len(), row, col, "arrow burst resolved as click");
    PointerEvent {
        kind: PointerKind::AltClick,
        row,
        col,
        modifiers: Modifiers::OPTION,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameLexer;
    use crate::profile::TerminalProfile;
    use crate::quirks::TerminalFamily;
    use Direction::{Down, Left, Right, Up};

    fn sgr(bytes: &[u8]) -> Option<PointerEvent> {
        FrameLexer::new()
            .feed(bytes)
            .iter()
            .find(|f| !f.is_marker())
            .and_then(parse_sgr)
    }

    fn model(rows: u16, cols: u16) -> ColumnModel {
        ColumnModel::new(&TerminalProfile::for_family(TerminalFamily::AppleTerminal), rows, cols)
    }

    #[test]
    fn press_and_release() {
        let press = sgr(b"\x1b[<0;10;5M").unwrap();
        assert_eq!(press.kind, PointerKind::Press(MouseButton::Left));
        assert_eq!((press.row, press.col), (4, 9));
        let release = sgr(b"\x1b[<2;1;1m").unwrap();
        assert_eq!(release.kind, PointerKind::Release(MouseButton::Right));
        assert_eq!((release.row, release.col), (0, 0));
    }

    #[test]
    fn wheel_directions() {
        assert_eq!(sgr(b"\x1b[<64;1;1M").unwrap().kind, PointerKind::WheelUp);
        assert_eq!(sgr(b"\x1b[<65;1;1M").unwrap().kind, PointerKind::WheelDown);
        assert_eq!(sgr(b"\x1b[<66;1;1M").unwrap().kind, PointerKind::WheelLeft);
        assert_eq!(sgr(b"\x1b[<67;1;1M").unwrap().kind, PointerKind::WheelRight);
    }

    #[test]
    fn motion_and_modifiers() {
        assert_eq!(sgr(b"\x1b[<35;3;3M").unwrap().kind, PointerKind::Move);
        assert_eq!(
            sgr(b"\x1b[<32;3;3M").unwrap().kind,
            PointerKind::Drag(MouseButton::Left)
        );
        let ev = sgr(b"\x1b[<20;3;3M").unwrap();
        assert_eq!(ev.modifiers, Modifiers::SHIFT | Modifiers::CONTROL);
        assert_eq!(sgr(b"\x1b[<8;3;3M").unwrap().modifiers, Modifiers::OPTION);
    }

    #[test]
    fn non_mouse_frames_are_ignored() {
        assert_eq!(sgr(b"\x1b[A"), None);
        assert_eq!(sgr(b"\x1b[<0;1M"), None);
        assert!(!is_sgr_mouse(&Frame::csi(b"1;2", b'M')));
    }

    #[test]
    fn moves_are_run_length_grouped() {
        let moves = arrowheads_to_moves(&[Left, Left, Left, Up, Left]);
        assert_eq!(
            moves,
            vec![
                ArrowMove {
                    direction: Left,
                    count: 3,
                },
                ArrowMove {
                    direction: Up,
                    count: 1,
                },
                ArrowMove {
                    direction: Left,
                    count: 1,
                },
            ]
        );
        assert_eq!(moves[0].to_bytes(), b"\x1b[3D");
        assert!(arrowheads_to_moves(&[]).is_empty());
    }

    #[test]
    fn left_wraps_only_into_soft_wrapped_rows() {
        let mut m = model(5, 10);
        m.set_soft_wrapped(2, true);
        assert_eq!(resolve_burst(&[Left, Left], (2, 1), &m), (1, 9));
        // Row 1 is hard-terminated: clamp.
        assert_eq!(resolve_burst(&[Left, Left], (1, 1), &m), (1, 0));
    }

    #[test]
    fn right_wraps_only_into_soft_wrapped_rows() {
        let mut m = model(5, 10);
        m.set_soft_wrapped(3, true);
        assert_eq!(resolve_burst(&[Right, Right], (2, 8), &m), (3, 0));
        assert_eq!(resolve_burst(&[Right, Right, Right], (3, 8), &m), (3, 9));
    }

    #[test]
    fn vertical_steps_clamp() {
        let m = model(3, 10);
        assert_eq!(resolve_burst(&[Up, Up, Up], (1, 4), &m), (0, 4));
        assert_eq!(resolve_burst(&[Down, Down, Down], (1, 4), &m), (2, 4));
    }

    #[test]
    fn burst_click_starts_from_model_cursor() {
        let mut m = model(5, 10);
        m.sync(2, 5);
        let click = burst_click(&[Left, Left, Left], &m);
        assert_eq!(click.kind, PointerKind::AltClick);
        assert_eq!((click.row, click.col), (2, 2));
        assert_eq!(click.modifiers, Modifiers::OPTION);
    }
}
