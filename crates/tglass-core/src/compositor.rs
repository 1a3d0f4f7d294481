#![forbid(unsafe_code)]

//! Cell allocator and compositor.
//!
//! Widgets share one screen by registering claims: arbitrary (not
//! necessarily rectangular) sets of cells at a z-order. A cell shows the
//! content of the highest-z claim covering it, or the native content that
//! was on the terminal before any widget arrived. Releasing a claim restores
//! whatever is beneath it.
//!
//! # Invariants
//!
//! - Two claims at the same z never share a cell.
//! - A double-width glyph is shown whole or not at all: if either half is
//!   covered by different content, the visible half renders blank.
//! - Scrollback only grows at the end; appends never conflict with claims.
//!
//! # Output
//!
//! Changes are collected in a dirty set and rendered row-major on
//! [`take_output`](Compositor::take_output), diffed against what the
//! terminal is known to show, through the [`ColumnModel`] so cursor moves
//! and wide-glyph compensation are exact.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use unicode_segmentation::UnicodeSegmentation;

use crate::cell::{Cell, CellContent, Grid};
use crate::error::{GlassError, Result};
use crate::profile::TerminalProfile;
use crate::scrollback::Scrollback;
use crate::width::{AmbiguousWidth, ColumnModel, grapheme_width};

/// Erase to end of line.
const ERASE_LINE: &[u8] = b"\x1b[K";

/// Identifies a widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WidgetId(pub u32);

impl fmt::Display for WidgetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifies one registered claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClaimId(pub u64);

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct Claim {
    widget: WidgetId,
    z: i32,
    cells: BTreeSet<(u16, u16)>,
    written: HashMap<(u16, u16), CellContent>,
}

/// Shared screen plus scrollback.
#[derive(Debug)]
pub struct Compositor {
    native: Grid,
    /// What the terminal currently displays.
    shown: Grid,
    claims: BTreeMap<ClaimId, Claim>,
    next_claim: u64,
    dirty: BTreeSet<(u16, u16)>,
    /// Diff every cell on the next render.
    dirty_all: bool,
    /// Paint every cell on the next render; the terminal state is unknown.
    repaint_all: bool,
    model: ColumnModel,
    scrollback: Scrollback,
    out: Vec<u8>,
}

impl Compositor {
    #[must_use]
    pub fn new(profile: &TerminalProfile, rows: u16, cols: u16, scrollback_capacity: usize) -> Self {
        let model = ColumnModel::new(profile, rows, cols);
        let (rows, cols) = model.size();
        Self {
            native: Grid::new(rows, cols),
            shown: Grid::new(rows, cols),
            claims: BTreeMap::new(),
            next_claim: 1,
            dirty: BTreeSet::new(),
            dirty_all: false,
            repaint_all: false,
            model,
            scrollback: Scrollback::new(scrollback_capacity),
            out: Vec::new(),
        }
    }

    /// `(rows, cols)`.
    #[must_use]
    pub const fn size(&self) -> (u16, u16) {
        self.model.size()
    }

    #[must_use]
    pub const fn model(&self) -> &ColumnModel {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut ColumnModel {
        &mut self.model
    }

    #[must_use]
    pub const fn scrollback(&self) -> &Scrollback {
        &self.scrollback
    }

    // ── Claims ───────────────────────────────────────────────────────────

    /// Register a claim on `cells` at depth `z`.
    ///
    /// # Errors
    ///
    /// [`GlassError::OutsideScreen`] if a cell is off screen,
    /// [`GlassError::ClaimConflict`] if a claim at the same `z` already
    /// holds one of the cells.
    pub fn claim<I>(&mut self, widget: WidgetId, cells: I, z: i32) -> Result<ClaimId>
    where
        I: IntoIterator<Item = (u16, u16)>,
    {
        let cells: BTreeSet<(u16, u16)> = cells.into_iter().collect();
        self.check_on_screen(&cells)?;
        self.check_conflict(None, widget, &cells, z)?;

        let id = ClaimId(self.next_claim);
        self.next_claim += 1;
        for &(row, col) in &cells {
            self.touch(row, col);
        }
        crate::debug!(claim = %id, widget = %widget, z, cells = cells.len(), "claim registered");
        self.claims.insert(
            id,
            Claim {
                widget,
                z,
                cells,
                written: HashMap::new(),
            },
        );
        Ok(id)
    }

    /// Write `text` into a claim starting at `(row, col)`, left to right on
    /// one row. Returns the number of columns written.
    ///
    /// All or nothing: if any cell the text needs is outside the claim,
    /// nothing is written.
    ///
    /// # Errors
    ///
    /// [`GlassError::UnknownClaim`] or [`GlassError::OutsideClaim`].
    pub fn write(&mut self, id: ClaimId, row: u16, col: u16, text: &str) -> Result<u16> {
        let claim = self.claims.get(&id).ok_or(GlassError::UnknownClaim(id))?;
        let ambiguous = self.model.ambiguous();
        let placed = place_row(text, col, ambiguous).ok_or(GlassError::OutsideClaim {
            claim: id,
            row,
            col: u16::MAX,
        })?;
        if let Some(&(missing, _)) = placed
            .iter()
            .find(|(c, _)| !claim.cells.contains(&(row, *c)))
        {
            return Err(GlassError::OutsideClaim {
                claim: id,
                row,
                col: missing,
            });
        }
        let Some(end) = placed.last().map(|(c, _)| c + 1) else {
            return Ok(0);
        };

        let claim = self.claims.get_mut(&id).ok_or(GlassError::UnknownClaim(id))?;
        // Keep wide pairs at the edges of the write whole.
        if col > 0 && claim.written.get(&(row, col)) == Some(&CellContent::Continuation) {
            claim.written.insert((row, col - 1), CellContent::Blank);
        }
        if claim.written.get(&(row, end - 1)).is_some_and(CellContent::is_wide) {
            claim.written.insert((row, end), CellContent::Blank);
        }
        for (c, content) in placed {
            claim.written.insert((row, c), content);
        }
        for c in col..=end {
            self.touch(row, c);
        }
        Ok(end - col)
    }

    /// Replace a claim's cell set. Content written to cells that are no
    /// longer claimed is dropped.
    ///
    /// # Errors
    ///
    /// As for [`claim`](Self::claim), plus [`GlassError::UnknownClaim`].
    pub fn reshape<I>(&mut self, id: ClaimId, cells: I) -> Result<()>
    where
        I: IntoIterator<Item = (u16, u16)>,
    {
        let (widget, z) = {
            let claim = self.claims.get(&id).ok_or(GlassError::UnknownClaim(id))?;
            (claim.widget, claim.z)
        };
        let cells: BTreeSet<(u16, u16)> = cells.into_iter().collect();
        self.check_on_screen(&cells)?;
        self.check_conflict(Some(id), widget, &cells, z)?;

        let claim = self.claims.get_mut(&id).ok_or(GlassError::UnknownClaim(id))?;
        let old = std::mem::replace(&mut claim.cells, cells);
        claim.written.retain(|cell, _| claim.cells.contains(cell));
        let touched: Vec<(u16, u16)> = old.union(&claim.cells).copied().collect();
        for (row, col) in touched {
            self.touch(row, col);
        }
        Ok(())
    }

    /// Drop a claim. Its cells show whatever is beneath again.
    ///
    /// # Errors
    ///
    /// [`GlassError::UnknownClaim`].
    pub fn release(&mut self, id: ClaimId) -> Result<()> {
        let claim = self.claims.remove(&id).ok_or(GlassError::UnknownClaim(id))?;
        for &(row, col) in &claim.cells {
            self.touch(row, col);
        }
        crate::debug!(claim = %id, widget = %claim.widget, "claim released");
        Ok(())
    }

    /// Forget everything written into a claim, keeping the claim.
    ///
    /// # Errors
    ///
    /// [`GlassError::UnknownClaim`].
    pub fn clear(&mut self, id: ClaimId) -> Result<()> {
        let claim = self.claims.get_mut(&id).ok_or(GlassError::UnknownClaim(id))?;
        let cells: Vec<(u16, u16)> = claim.written.drain().map(|(cell, _)| cell).collect();
        for (row, col) in cells {
            self.touch(row, col);
        }
        Ok(())
    }

    /// Record content that is on the screen independently of any widget.
    ///
    /// Glyphs that run past the right edge are dropped.
    ///
    /// # Errors
    ///
    /// [`GlassError::OutsideScreen`] if `(row, col)` is off screen.
    pub fn set_native(&mut self, row: u16, col: u16, text: &str) -> Result<()> {
        let (rows, cols) = self.size();
        if row >= rows || col >= cols {
            return Err(GlassError::OutsideScreen {
                row,
                col,
                rows,
                cols,
            });
        }
        let placed = place_row(text, col, self.model.ambiguous()).unwrap_or_default();
        // A wide glyph whose right half is off screen is dropped whole.
        let fits = placed.iter().take_while(|(c, content)| match content {
            CellContent::Glyph { width: 2, .. } => c + 1 < cols,
            _ => *c < cols,
        });
        let placed: Vec<(u16, CellContent)> = fits.cloned().collect();
        for (c, content) in placed {
            self.native.set(row, c, Cell::new(content, None));
            self.touch(row, c);
        }
        Ok(())
    }

    fn check_on_screen(&self, cells: &BTreeSet<(u16, u16)>) -> Result<()> {
        let (rows, cols) = self.size();
        match cells.iter().find(|&&(r, c)| r >= rows || c >= cols) {
            Some(&(row, col)) => Err(GlassError::OutsideScreen {
                row,
                col,
                rows,
                cols,
            }),
            None => Ok(()),
        }
    }

    fn check_conflict(
        &self,
        except: Option<ClaimId>,
        widget: WidgetId,
        cells: &BTreeSet<(u16, u16)>,
        z: i32,
    ) -> Result<()> {
        for (id, other) in &self.claims {
            if Some(*id) == except || other.z != z {
                continue;
            }
            if let Some(&(row, col)) = other.cells.intersection(cells).next() {
                crate::debug!(
                    widget = %widget,
                    holder = %other.widget,
                    row,
                    col,
                    z,
                    "claim conflict"
                );
                return Err(GlassError::ClaimConflict {
                    widget,
                    holder: other.widget,
                    row,
                    col,
                    z,
                });
            }
        }
        Ok(())
    }

    // ── Scrollback ───────────────────────────────────────────────────────

    /// Append lines to scrollback, above everything on screen.
    ///
    /// Each row is painted on the top line and scrolled off, so it lands in
    /// the terminal's own scrollback too. The screen is then repainted where
    /// the scroll disturbed it.
    pub fn append_scrollback(&mut self, widget: WidgetId, text: &str) {
        self.render();
        let (rows, cols) = self.size();
        let ambiguous = self.model.ambiguous();
        let text = text.strip_suffix('\n').unwrap_or(text);
        for line in text.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            for (i, cells) in wrap_line(line, cols, ambiguous, widget).into_iter().enumerate() {
                self.model.move_to(0, 0, &mut self.out);
                let mut width = 0u16;
                for (col, cell) in (0u16..).zip(&cells) {
                    if let CellContent::Glyph { text, width: w } = &cell.content {
                        self.model.emit(0, col, text, *w, &mut self.out);
                    }
                    width += u16::from(cell.content.width());
                }
                if width < cols {
                    self.out.extend_from_slice(ERASE_LINE);
                }
                self.model.move_to(rows - 1, 0, &mut self.out);
                self.out.push(b'\n');
                self.model.scroll_up(1);
                self.shown.scroll_up(1);
                self.scrollback.push_row(cells, i > 0);
            }
        }
        self.dirty_all = true;
    }

    /// Scroll the screen up by `n` rows. The top rows, as displayed, move
    /// into scrollback; claims stay where they are on screen.
    pub fn scroll_up(&mut self, n: u16) {
        let (rows, cols) = self.size();
        let n = n.min(rows);
        if n == 0 {
            return;
        }
        self.render();
        for row in 0..n {
            let cells: Vec<Cell> = (0..cols).map(|col| self.resolve(row, col)).collect();
            self.scrollback.push_row(cells, self.model.is_soft_wrapped(row));
        }
        self.native.scroll_up(n);
        self.model.move_to(rows - 1, 0, &mut self.out);
        for _ in 0..n {
            self.out.push(b'\n');
        }
        self.model.scroll_up(n);
        self.shown.scroll_up(n);
        self.dirty_all = true;
    }

    /// Adopt a new screen size. Everything is repainted on the next render.
    pub fn resize(&mut self, rows: u16, cols: u16) {
        self.model.resize(rows, cols);
        let (rows, cols) = self.model.size();
        self.native.resize(rows, cols);
        self.shown = Grid::new(rows, cols);
        self.dirty.clear();
        self.repaint_all = true;
    }

    // ── Resolution ───────────────────────────────────────────────────────

    fn top_claim(&self, row: u16, col: u16) -> Option<(ClaimId, &Claim)> {
        self.claims
            .iter()
            .filter(|(_, claim)| claim.cells.contains(&(row, col)))
            .max_by_key(|(id, claim)| (claim.z, **id))
            .map(|(id, claim)| (*id, claim))
    }

    fn raw(&self, row: u16, col: u16) -> (Cell, Option<ClaimId>) {
        match self.top_claim(row, col) {
            Some((id, claim)) => {
                let content = claim.written.get(&(row, col)).cloned().unwrap_or_default();
                (Cell::new(content, Some(claim.widget)), Some(id))
            }
            None => (self.native.cell(row, col).cloned().unwrap_or_default(), None),
        }
    }

    fn resolve(&self, row: u16, col: u16) -> Cell {
        let (mut cell, source) = self.raw(row, col);
        let whole = match cell.content {
            CellContent::Glyph { width: 2, .. } => {
                col + 1 < self.native.cols() && {
                    let (right, from) = self.raw(row, col + 1);
                    from == source && right.content == CellContent::Continuation
                }
            }
            CellContent::Continuation => {
                col > 0 && {
                    let (left, from) = self.raw(row, col - 1);
                    from == source && left.content.is_wide()
                }
            }
            _ => true,
        };
        if !whole {
            cell.content = CellContent::Blank;
        }
        cell
    }

    /// The cell as it will be shown, or `None` off screen.
    #[must_use]
    pub fn cell(&self, row: u16, col: u16) -> Option<Cell> {
        self.native
            .contains(row, col)
            .then(|| self.resolve(row, col))
    }

    /// Every visible cell.
    #[must_use]
    pub fn snapshot(&self) -> Grid {
        let (rows, cols) = self.size();
        let mut grid = Grid::new(rows, cols);
        for row in 0..rows {
            for col in 0..cols {
                grid.set(row, col, self.resolve(row, col));
            }
        }
        grid
    }

    /// The widget shown at a cell, for hit-testing pointer events.
    #[must_use]
    pub fn widget_at(&self, row: u16, col: u16) -> Option<WidgetId> {
        self.top_claim(row, col).map(|(_, claim)| claim.widget)
    }

    // ── Output ───────────────────────────────────────────────────────────

    fn touch(&mut self, row: u16, col: u16) {
        // Neighbors too: a change can break a wide pair on either side.
        self.dirty.insert((row, col.saturating_sub(1)));
        self.dirty.insert((row, col));
        self.dirty.insert((row, col.saturating_add(1)));
    }

    /// Render pending changes into the output buffer.
    pub fn render(&mut self) {
        let (rows, cols) = self.size();
        let repaint = std::mem::take(&mut self.repaint_all);
        let cells: Vec<(u16, u16)> = if repaint || std::mem::take(&mut self.dirty_all) {
            self.dirty.clear();
            (0..rows)
                .flat_map(|row| (0..cols).map(move |col| (row, col)))
                .collect()
        } else {
            std::mem::take(&mut self.dirty).into_iter().collect()
        };

        for (row, col) in cells {
            if !self.shown.contains(row, col) {
                continue;
            }
            let cell = self.resolve(row, col);
            if !repaint && self.shown.cell(row, col) == Some(&cell) {
                continue;
            }
            match &cell.content {
                CellContent::Blank => self.model.emit(row, col, " ", 1, &mut self.out),
                CellContent::Glyph { text, width } => {
                    self.model.emit(row, col, text, *width, &mut self.out);
                }
                // Painted along with the glyph to its left.
                CellContent::Continuation => {}
            }
            self.shown.set(row, col, cell);
        }
    }

    /// Render and hand over the bytes for the terminal.
    pub fn take_output(&mut self) -> Vec<u8> {
        self.render();
        std::mem::take(&mut self.out)
    }
}

/// Lay graphemes out along one row from `col`. Zero-width graphemes are
/// dropped. `None` if the row would run past `u16::MAX`.
fn place_row(text: &str, col: u16, ambiguous: AmbiguousWidth) -> Option<Vec<(u16, CellContent)>> {
    let mut placed = Vec::new();
    let mut c = col;
    for grapheme in text.graphemes(true) {
        let width = grapheme_width(grapheme, ambiguous);
        if width == 0 {
            continue;
        }
        placed.push((c, CellContent::glyph(grapheme, width)));
        if width == 2 {
            placed.push((c.checked_add(1)?, CellContent::Continuation));
        }
        c = c.checked_add(u16::from(width))?;
    }
    Some(placed)
}

/// Split one logical line into screen rows of at most `cols` columns.
///
/// A wide glyph that would straddle the edge moves to the next row, leaving
/// a blank pad.
fn wrap_line(line: &str, cols: u16, ambiguous: AmbiguousWidth, owner: WidgetId) -> Vec<Vec<Cell>> {
    let mut rows = vec![Vec::new()];
    let mut used = 0u16;
    for grapheme in line.graphemes(true) {
        let width = grapheme_width(grapheme, ambiguous);
        if width == 0 || u16::from(width) > cols {
            continue;
        }
        if used + u16::from(width) > cols {
            if let Some(row) = rows.last_mut() {
                if used < cols {
                    row.push(Cell::new(CellContent::Blank, Some(owner)));
                }
            }
            rows.push(Vec::new());
            used = 0;
        }
        if let Some(row) = rows.last_mut() {
            row.push(Cell::new(CellContent::glyph(grapheme, width), Some(owner)));
            if width == 2 {
                row.push(Cell::new(CellContent::Continuation, Some(owner)));
            }
        }
        used += u16::from(width);
    }
    rows
}
