#![forbid(unsafe_code)]

//! Screen cells and the row-major grid that holds them.

use crate::compositor::WidgetId;

/// What a cell shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CellContent {
    #[default]
    Blank,
    /// One grapheme cluster, 1 or 2 columns wide.
    Glyph { text: String, width: u8 },
    /// Right half of the double-width glyph in the cell to the left.
    Continuation,
}

impl CellContent {
    #[must_use]
    pub fn glyph(text: impl Into<String>, width: u8) -> Self {
        Self::Glyph {
            text: text.into(),
            width,
        }
    }

    /// Columns the content occupies starting at this cell.
    #[must_use]
    pub const fn width(&self) -> u8 {
        match self {
            Self::Blank => 1,
            Self::Glyph { width, .. } => *width,
            Self::Continuation => 0,
        }
    }

    #[must_use]
    pub const fn is_wide(&self) -> bool {
        matches!(self, Self::Glyph { width: 2, .. })
    }
}

/// One screen cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cell {
    pub content: CellContent,
    /// Widget whose claim supplied the content; `None` for native content.
    pub owner: Option<WidgetId>,
}

impl Cell {
    #[must_use]
    pub const fn new(content: CellContent, owner: Option<WidgetId>) -> Self {
        Self { content, owner }
    }

    /// The text a row of cells reads as, with continuations skipped and
    /// blanks as spaces.
    #[must_use]
    pub fn row_text(cells: &[Self]) -> String {
        cells
            .iter()
            .filter_map(|cell| match &cell.content {
                CellContent::Blank => Some(" "),
                CellContent::Glyph { text, .. } => Some(text.as_str()),
                CellContent::Continuation => None,
            })
            .collect()
    }
}

/// Fixed-size cell matrix, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    cells: Vec<Cell>,
    rows: u16,
    cols: u16,
}

impl Grid {
    #[must_use]
    pub fn new(rows: u16, cols: u16) -> Self {
        Self {
            cells: vec![Cell::default(); usize::from(rows) * usize::from(cols)],
            rows,
            cols,
        }
    }

    #[must_use]
    pub const fn rows(&self) -> u16 {
        self.rows
    }

    #[must_use]
    pub const fn cols(&self) -> u16 {
        self.cols
    }

    #[must_use]
    pub const fn contains(&self, row: u16, col: u16) -> bool {
        row < self.rows && col < self.cols
    }

    fn index(&self, row: u16, col: u16) -> usize {
        usize::from(row) * usize::from(self.cols) + usize::from(col)
    }

    #[must_use]
    pub fn cell(&self, row: u16, col: u16) -> Option<&Cell> {
        if self.contains(row, col) {
            self.cells.get(self.index(row, col))
        } else {
            None
        }
    }

    pub fn cell_mut(&mut self, row: u16, col: u16) -> Option<&mut Cell> {
        if self.contains(row, col) {
            let idx = self.index(row, col);
            self.cells.get_mut(idx)
        } else {
            None
        }
    }

    /// Overwrite a cell; out-of-bounds writes are ignored.
    pub fn set(&mut self, row: u16, col: u16, cell: Cell) {
        if let Some(slot) = self.cell_mut(row, col) {
            *slot = cell;
        }
    }

    #[must_use]
    pub fn row(&self, row: u16) -> Option<&[Cell]> {
        if row < self.rows {
            let start = self.index(row, 0);
            self.cells.get(start..start + usize::from(self.cols))
        } else {
            None
        }
    }

    /// Resize, keeping the top-left content that still fits.
    pub fn resize(&mut self, rows: u16, cols: u16) {
        let mut next = Self::new(rows, cols);
        for row in 0..rows.min(self.rows) {
            for col in 0..cols.min(self.cols) {
                if let Some(cell) = self.cell(row, col) {
                    next.set(row, col, cell.clone());
                }
            }
        }
        *self = next;
    }

    /// Shift content up by `n` rows, returning the rows that left the top.
    pub fn scroll_up(&mut self, n: u16) -> Vec<Vec<Cell>> {
        let n = n.min(self.rows);
        let split = usize::from(n) * usize::from(self.cols);
        let evicted: Vec<Cell> = self.cells.drain(..split).collect();
        self.cells.resize(usize::from(self.rows) * usize::from(self.cols), Cell::default());
        evicted
            .chunks(usize::from(self.cols).max(1))
            .map(<[Cell]>::to_vec)
            .collect()
    }

    /// Reset every cell to blank.
    pub fn clear(&mut self) {
        self.cells.fill(Cell::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glyph(c: &str) -> Cell {
        Cell::new(CellContent::glyph(c, 1), None)
    }

    #[test]
    fn bounds_are_checked() {
        let mut grid = Grid::new(2, 3);
        assert!(grid.cell(1, 2).is_some());
        assert!(grid.cell(2, 0).is_none());
        assert!(grid.cell(0, 3).is_none());
        grid.set(5, 5, glyph("x"));
        assert_eq!(grid, Grid::new(2, 3));
    }

    #[test]
    fn scroll_up_returns_evicted_rows() {
        let mut grid = Grid::new(3, 2);
        grid.set(0, 0, glyph("a"));
        grid.set(1, 0, glyph("b"));
        let evicted = grid.scroll_up(1);
        assert_eq!(evicted.len(), 1);
        assert_eq!(Cell::row_text(&evicted[0]), "a ");
        assert_eq!(grid.cell(0, 0), Some(&glyph("b")));
        assert_eq!(grid.cell(2, 0), Some(&Cell::default()));
    }

    #[test]
    fn resize_keeps_top_left() {
        let mut grid = Grid::new(2, 2);
        grid.set(0, 1, glyph("x"));
        grid.set(1, 1, glyph("y"));
        grid.resize(1, 4);
        assert_eq!(grid.rows(), 1);
        assert_eq!(grid.cols(), 4);
        assert_eq!(Cell::row_text(grid.row(0).unwrap()), " x  ");
    }

    #[test]
    fn row_text_skips_continuations() {
        let cells = [
            Cell::new(CellContent::glyph("漢", 2), None),
            Cell::new(CellContent::Continuation, None),
            Cell::default(),
        ];
        assert_eq!(Cell::row_text(&cells), "漢 ");
    }
}
