#![forbid(unsafe_code)]

//! Scrollback: rows that have left the top of the screen.
//!
//! Append-only from the compositor's point of view. Rows keep their cells so
//! ownership and wide-glyph layout survive. Bounded by a line capacity; the
//! oldest row is evicted first.

use std::collections::VecDeque;

use crate::cell::Cell;

/// One row in scrollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollbackLine {
    pub cells: Vec<Cell>,
    /// The row continues the previous row's logical line.
    pub wrapped: bool,
}

impl ScrollbackLine {
    #[must_use]
    pub fn text(&self) -> String {
        Cell::row_text(&self.cells).trim_end().to_string()
    }
}

/// Bounded FIFO of scrolled-off rows.
#[derive(Debug, Clone, Default)]
pub struct Scrollback {
    lines: VecDeque<ScrollbackLine>,
    capacity: usize,
}

impl Scrollback {
    /// A capacity of `0` disables scrollback; pushes are dropped.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Append a row, evicting the oldest when full.
    pub fn push_row(&mut self, cells: Vec<Cell>, wrapped: bool) -> Option<ScrollbackLine> {
        if self.capacity == 0 {
            return None;
        }
        let evicted = if self.lines.len() == self.capacity {
            self.lines.pop_front()
        } else {
            None
        };
        self.lines.push_back(ScrollbackLine { cells, wrapped });
        evicted
    }

    /// Line by index, oldest first.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&ScrollbackLine> {
        self.lines.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScrollbackLine> {
        self.lines.iter()
    }
}
