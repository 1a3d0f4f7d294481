#![forbid(unsafe_code)]

//! Width and column model.
//!
//! [`width_of`] says how many columns a code point occupies on the real
//! terminal. [`ColumnModel`] tracks where the terminal cursor actually is,
//! which rows are soft-wrapped, and writes the compensation a family needs
//! after double-width glyphs.
//!
//! # Widths
//!
//! | Class                                   | Width |
//! |-----------------------------------------|-------|
//! | C0/C1 controls, DEL                     | 0     |
//! | Combining marks, ZWJ, variation selectors | 0   |
//! | East Asian Wide/Fullwidth               | 2     |
//! | Emoji presentation (U+1F000..U+1FAFF)   | 2     |
//! | East Asian Ambiguous                    | 1 or 2 per profile |
//! | Everything else                         | 1     |

use std::io::Write;

use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthChar;

use crate::profile::TerminalProfile;
use crate::quirks::Quirks;

/// Cursor forward one column.
const CURSOR_FORWARD: &[u8] = b"\x1b[C";

/// How a family renders East Asian ambiguous-width characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AmbiguousWidth {
    #[default]
    Narrow,
    Wide,
}

/// Column width of a code point. Total over all scalar values.
#[must_use]
pub fn width_of(c: char, ambiguous: AmbiguousWidth) -> u8 {
    if c.is_ascii() {
        return match c {
            ' '..='~' => 1,
            _ => 0,
        };
    }
    if c.is_control() || is_zero_width_format(c) {
        return 0;
    }
    if is_emoji_presentation(c) {
        return 2;
    }
    let width = match ambiguous {
        AmbiguousWidth::Narrow => c.width(),
        AmbiguousWidth::Wide => c.width_cjk(),
    };
    // Width is capped at 2 so callers can rely on the two-cell invariant.
    width.map_or(0, |w| w.min(2) as u8)
}

/// Column width of a grapheme cluster: the width of its first code point.
#[must_use]
pub fn grapheme_width(grapheme: &str, ambiguous: AmbiguousWidth) -> u8 {
    grapheme
        .chars()
        .next()
        .map_or(0, |c| width_of(c, ambiguous))
}

/// Column width of a whole string.
#[must_use]
pub fn str_width(text: &str, ambiguous: AmbiguousWidth) -> usize {
    text.graphemes(true)
        .map(|g| usize::from(grapheme_width(g, ambiguous)))
        .sum()
}

fn is_zero_width_format(c: char) -> bool {
    matches!(
        c,
        '\u{200B}'..='\u{200F}'
            | '\u{2028}'..='\u{202E}'
            | '\u{2060}'..='\u{2064}'
            | '\u{FE00}'..='\u{FE0F}'
            | '\u{FEFF}'
    )
}

fn is_emoji_presentation(c: char) -> bool {
    matches!(
        c,
        '\u{1F000}'..='\u{1F02F}'
            | '\u{1F0A0}'..='\u{1F0FF}'
            | '\u{1F300}'..='\u{1F64F}'
            | '\u{1F680}'..='\u{1F6FF}'
            | '\u{1F900}'..='\u{1FAFF}'
    )
}

/// One grapheme placed by [`ColumnModel::layout`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub row: u16,
    pub col: u16,
    /// The grapheme, or `None` for a blank pad cell.
    pub glyph: Option<String>,
    pub width: u8,
}

/// Cursor and line-wrap state mirrored from the terminal.
#[derive(Debug, Clone)]
pub struct ColumnModel {
    rows: u16,
    cols: u16,
    row: u16,
    /// May equal `cols`: the terminal is in its pending-wrap state.
    col: u16,
    /// `soft_wrapped[r]` is true when row `r` continues row `r - 1`.
    soft_wrapped: Vec<bool>,
    ambiguous: AmbiguousWidth,
    compensate_wide: bool,
    /// Position is unknown until the next explicit move.
    lost: bool,
}

impl ColumnModel {
    #[must_use]
    pub fn new(profile: &TerminalProfile, rows: u16, cols: u16) -> Self {
        let rows = rows.max(1);
        let cols = cols.max(1);
        Self {
            rows,
            cols,
            row: 0,
            col: 0,
            soft_wrapped: vec![false; usize::from(rows)],
            ambiguous: profile.ambiguous_width(),
            compensate_wide: profile.has(Quirks::NO_AUTO_WRAP_DOUBLE_WIDTH),
            lost: true,
        }
    }

    #[must_use]
    pub const fn size(&self) -> (u16, u16) {
        (self.rows, self.cols)
    }

    /// Cursor position `(row, col)`, 0-indexed.
    #[must_use]
    pub const fn cursor(&self) -> (u16, u16) {
        (self.row, self.col)
    }

    #[must_use]
    pub const fn ambiguous(&self) -> AmbiguousWidth {
        self.ambiguous
    }

    /// Width of a glyph under this terminal's policy.
    #[must_use]
    pub fn width_of(&self, c: char) -> u8 {
        width_of(c, self.ambiguous)
    }

    /// True when `row` continues the previous row's logical line.
    #[must_use]
    pub fn is_soft_wrapped(&self, row: u16) -> bool {
        self.soft_wrapped
            .get(usize::from(row))
            .copied()
            .unwrap_or(false)
    }

    /// Mark `row` as continuing (or not) the row above it.
    pub fn set_soft_wrapped(&mut self, row: u16, wrapped: bool) {
        if row == 0 {
            return;
        }
        if let Some(slot) = self.soft_wrapped.get_mut(usize::from(row)) {
            *slot = wrapped;
        }
    }

    /// Accept a cursor position the terminal reported (0-indexed).
    pub fn sync(&mut self, row: u16, col: u16) {
        self.row = row.min(self.rows - 1);
        self.col = col.min(self.cols - 1);
        self.lost = false;
    }

    /// Forget the cursor position; the next write repositions explicitly.
    pub fn invalidate(&mut self) {
        self.lost = true;
    }

    pub fn resize(&mut self, rows: u16, cols: u16) {
        self.rows = rows.max(1);
        self.cols = cols.max(1);
        self.soft_wrapped.resize(usize::from(self.rows), false);
        self.row = self.row.min(self.rows - 1);
        self.col = self.col.min(self.cols);
        self.lost = true;
    }

    /// Shift wrap flags up as `n` rows leave the top of the screen.
    pub fn scroll_up(&mut self, n: u16) {
        let n = usize::from(n).min(self.soft_wrapped.len());
        self.soft_wrapped.drain(..n);
        self.soft_wrapped.resize(usize::from(self.rows), false);
        if let Some(first) = self.soft_wrapped.first_mut() {
            *first = false;
        }
        self.lost = true;
    }

    /// Lay `text` out from `(row, col)` the way the terminal would print it.
    ///
    /// A glyph that does not fit the rest of the row wraps to the next row,
    /// which is marked soft-wrapped. A double-width glyph that would straddle
    /// the right edge is preceded by one blank pad cell. Zero-width graphemes
    /// are dropped. Layout stops at the bottom row.
    pub fn layout(&mut self, row: u16, col: u16, text: &str) -> Vec<Placement> {
        let mut placed = Vec::new();
        let (mut r, mut c) = (row, col);
        for grapheme in text.graphemes(true) {
            let width = grapheme_width(grapheme, self.ambiguous);
            if width == 0 {
                continue;
            }
            if c + u16::from(width) > self.cols {
                if width == 2 && c < self.cols {
                    placed.push(Placement {
                        row: r,
                        col: c,
                        glyph: None,
                        width: 1,
                    });
                }
                if r + 1 >= self.rows {
                    break;
                }
                r += 1;
                c = 0;
                self.set_soft_wrapped(r, true);
            }
            placed.push(Placement {
                row: r,
                col: c,
                glyph: Some(grapheme.to_string()),
                width,
            });
            c += u16::from(width);
        }
        placed
    }

    /// Move the terminal cursor to `(row, col)` unless it is already there.
    pub fn move_to(&mut self, row: u16, col: u16, out: &mut Vec<u8>) {
        if !self.lost && self.row == row && self.col == col {
            return;
        }
        // Infallible: writing into a Vec.
        let _ = write!(out, "\x1b[{};{}H", row + 1, col + 1);
        self.row = row;
        self.col = col;
        self.lost = false;
    }

    /// Print one glyph at `(row, col)` and advance the model by its width.
    ///
    /// On families that advance only one column after a wide glyph, a
    /// cursor-forward follows so the terminal and the model agree.
    pub fn emit(&mut self, row: u16, col: u16, glyph: &str, width: u8, out: &mut Vec<u8>) {
        self.move_to(row, col, out);
        out.extend_from_slice(glyph.as_bytes());
        if width == 2 && self.compensate_wide && col + 2 < self.cols {
            out.extend_from_slice(CURSOR_FORWARD);
        }
        self.col = col + u16::from(width);
        if self.col >= self.cols {
            // Pending wrap: where the next byte lands is terminal-specific.
            self.col = self.cols;
            self.lost = true;
        }
    }
}
