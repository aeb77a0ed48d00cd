//! Page: one fixed-capacity slab holding rows, cells, a style table and
//! grapheme continuations — a single allocation built once from an
//! [`OffsetBuf`](core_offset::OffsetBuf) so the whole page stays a
//! relocatable, `memmove`-safe block.

use crate::buffer::PageBuffer;
use crate::capacity::{Capacity, Size};
use crate::cell::{Cell, Row};
use crate::grapheme::GraphemeStore;
use crate::style_table::PageStyleTable;
use core_offset::{O, OSlice, OffsetBuf};
use core_style::{AddError, Id as StyleId, Style};
use std::mem::size_of;
use tracing::debug;

pub struct Page {
    capacity: Capacity,
    size: Size,
    buffer: PageBuffer,
    rows: OSlice<Row>,
    styles: PageStyleTable,
    graphemes: GraphemeStore,
}

/// Carve the regions of one page out of `arena`, in allocation order. Run
/// once against a throwaway, effectively unbounded arena to size the real
/// buffer, then again against the real one — the single source of truth for
/// layout is this function, not a hand-derived byte count.
fn carve(arena: &mut OffsetBuf, capacity: Capacity) -> (OSlice<Row>, OSlice<Cell>, PageStyleTable, GraphemeStore) {
    let rows = arena.alloc_slice(capacity.rows as u32);
    let cells = arena.alloc_slice(capacity.rows as u32 * capacity.cols as u32);
    let styles = PageStyleTable::alloc(arena, capacity.styles);
    let graphemes = GraphemeStore::alloc(arena, capacity.grapheme_bytes);
    (rows, cells, styles, graphemes)
}

impl Page {
    pub fn new(capacity: Capacity) -> Self {
        let total = {
            let mut probe = OffsetBuf::new(u32::MAX);
            carve(&mut probe, capacity);
            probe.used()
        };

        let mut buffer = PageBuffer::new(total as usize);
        let mut arena = OffsetBuf::new(buffer.len() as u32);
        let (rows, cells, styles, graphemes) = carve(&mut arena, capacity);

        {
            // SAFETY: `rows` was just allocated from `arena` against this
            // same `buffer`.
            let row_slots = unsafe { rows.resolve_mut(buffer.as_mut_ptr()) };
            for (y, row) in row_slots.iter_mut().enumerate() {
                let offset =
                    cells.start.offset() + y as u32 * capacity.cols as u32 * size_of::<Cell>() as u32;
                *row = Row::new(O::new(offset));
            }
        }

        Self {
            capacity,
            size: Size {
                cols: capacity.cols,
                rows: capacity.rows,
            },
            buffer,
            rows,
            styles,
            graphemes,
        }
    }

    pub fn capacity(&self) -> Capacity {
        self.capacity
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn cols(&self) -> u16 {
        self.size.cols
    }

    pub fn rows_used(&self) -> u16 {
        self.size.rows
    }

    fn row_slots(&self) -> &[Row] {
        // SAFETY: `rows` was allocated from this page's own arena.
        unsafe { self.rows.resolve(self.buffer.as_ptr()) }
    }

    fn row_slots_mut(&mut self) -> &mut [Row] {
        // SAFETY: see `row_slots`.
        unsafe { self.rows.resolve_mut(self.buffer.as_mut_ptr()) }
    }

    pub fn get_row(&self, y: u16) -> &Row {
        &self.row_slots()[y as usize]
    }

    fn row_cells(&self, y: u16) -> OSlice<Cell> {
        OSlice::new(self.get_row(y).cells, self.size.cols as u32)
    }

    pub fn get_cells(&self, y: u16) -> &[Cell] {
        // SAFETY: every row's `cells` offset was computed against this same
        // `buffer` in `Page::new` and never changes afterwards (swapping
        // rows swaps headers, not the offsets inside them... the offsets
        // move with their header, to the header's new logical row).
        unsafe { self.row_cells(y).resolve(self.buffer.as_ptr()) }
    }

    pub fn get_cells_mut(&mut self, y: u16) -> &mut [Cell] {
        let span = self.row_cells(y);
        // SAFETY: see `get_cells`.
        unsafe { span.resolve_mut(self.buffer.as_mut_ptr()) }
    }

    pub fn get_row_and_cell(&self, x: u16, y: u16) -> (&Row, &Cell) {
        (&self.row_slots()[y as usize], &self.get_cells(y)[x as usize])
    }

    pub fn get_cell_mut(&mut self, x: u16, y: u16) -> &mut Cell {
        &mut self.get_cells_mut(y)[x as usize]
    }

    /// Swap two row headers — used by `insert_lines`/scroll to shift rows
    /// without touching cell data.
    pub fn swap_rows(&mut self, a: u16, b: u16) {
        self.row_slots_mut().swap(a as usize, b as usize);
    }

    /// Reset a row's cells to empty and drop any grapheme continuations
    /// attached to them. Also clears `wrap`/`wrap_continuation`.
    pub fn clear_row(&mut self, y: u16) {
        let cols = self.size.cols;
        let keys: Vec<u32> = (0..cols).map(|x| self.grapheme_key(x, y)).collect();
        for key in keys {
            self.graphemes.clear(&mut self.buffer, key);
        }
        for c in self.get_cells_mut(y) {
            *c = Cell::default();
        }
        let row = &mut self.row_slots_mut()[y as usize];
        row.set_wrap(false);
        row.set_wrap_continuation(false);
        row.set_grapheme_hint(false);
    }

    pub fn set_row_wrap(&mut self, y: u16, v: bool) {
        self.row_slots_mut()[y as usize].set_wrap(v);
    }

    pub fn set_row_wrap_continuation(&mut self, y: u16, v: bool) {
        self.row_slots_mut()[y as usize].set_wrap_continuation(v);
    }

    pub fn set_row_grapheme_hint(&mut self, y: u16, v: bool) {
        self.row_slots_mut()[y as usize].set_grapheme_hint(v);
    }

    /// A cell's grapheme key: its byte offset relative to the page base.
    /// Physical, not logical — a row swap moves which logical row a physical
    /// cell range belongs to, not the range itself, so keys derived this way
    /// stay attached to the right cell across swaps for free.
    fn grapheme_key(&self, x: u16, y: u16) -> u32 {
        self.get_row(y).cells.offset() + x as u32 * size_of::<Cell>() as u32
    }

    pub fn append_grapheme(&mut self, x: u16, y: u16, cp: char) {
        let key = self.grapheme_key(x, y);
        self.graphemes.append(&mut self.buffer, key, cp);
        self.row_slots_mut()[y as usize].set_grapheme_hint(true);
        self.get_cells_mut(y)[x as usize].has_grapheme = true;
    }

    /// Clear a cell's grapheme continuations. Does *not* rescan the row to
    /// recompute the `grapheme` hint bit — it is a hint, not an invariant.
    pub fn clear_grapheme(&mut self, x: u16, y: u16) {
        let key = self.grapheme_key(x, y);
        self.graphemes.clear(&mut self.buffer, key);
        self.get_cells_mut(y)[x as usize].has_grapheme = false;
    }

    pub fn lookup_grapheme(&self, x: u16, y: u16) -> Option<&[char]> {
        let key = self.grapheme_key(x, y);
        self.graphemes.lookup(&self.buffer, key)
    }

    /// Intern `style` into this page's style table, retrying once after a
    /// compaction if the table signals it is full of tombstones.
    pub fn intern_style(&mut self, style: Style) -> Option<StyleId> {
        if style.is_default() {
            return Some(StyleId::DEFAULT);
        }
        match self.styles.add(&mut self.buffer, style) {
            Ok(outcome) => Some(outcome.id()),
            Err(AddError::NeedsRehash) => {
                self.styles.compact(&mut self.buffer);
                debug!(target: "page.style", "style_set_compacted_for_insert");
                self.styles.add(&mut self.buffer, style).ok().map(|o| o.id())
            }
            Err(AddError::OutOfMemory) => None,
        }
    }

    pub fn style(&self, id: StyleId) -> Style {
        if id.is_default() {
            return Style::default();
        }
        self.styles.lookup(id).unwrap_or_default()
    }

    pub fn style_ref(&mut self, id: StyleId) {
        if !id.is_default() {
            // Re-add path is for bookkeeping parity (ref-count bump) when a
            // caller duplicates a style id across cells without going through
            // `intern_style`; the value is already present so this can't fail.
            if let Some(style) = self.styles.lookup(id) {
                let _ = self.styles.add(&mut self.buffer, style);
            }
        }
    }

    pub fn style_release(&mut self, id: StyleId) {
        self.styles.release(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Wide;

    fn small_page() -> Page {
        Page::new(Capacity {
            cols: 10,
            rows: 5,
            styles: 8,
            grapheme_bytes: 64,
        })
    }

    #[test]
    fn new_page_is_all_empty_cells() {
        let p = small_page();
        for y in 0..p.rows_used() {
            for c in p.get_cells(y) {
                assert!(c.is_empty());
            }
        }
    }

    #[test]
    fn write_and_read_cell() {
        let mut p = small_page();
        p.get_cell_mut(2, 1).codepoint = 'x' as u32;
        assert_eq!(p.get_row_and_cell(2, 1).1.codepoint, 'x' as u32);
    }

    #[test]
    fn swap_rows_moves_logical_identity_not_cell_bytes() {
        let mut p = small_page();
        p.get_cell_mut(0, 0).codepoint = 'A' as u32;
        p.get_cell_mut(0, 1).codepoint = 'B' as u32;
        p.swap_rows(0, 1);
        assert_eq!(p.get_cells(0)[0].codepoint, 'B' as u32);
        assert_eq!(p.get_cells(1)[0].codepoint, 'A' as u32);
    }

    #[test]
    fn grapheme_roundtrip_and_clear() {
        let mut p = small_page();
        p.append_grapheme(3, 2, '\u{0301}');
        assert!(p.get_row(2).grapheme_hint());
        assert_eq!(p.lookup_grapheme(3, 2), Some(&['\u{0301}'][..]));
        assert!(p.get_cells(2)[3].has_grapheme);
        p.clear_grapheme(3, 2);
        assert_eq!(p.lookup_grapheme(3, 2), None);
        assert!(!p.get_cells(2)[3].has_grapheme);
        // hint bit is NOT recomputed — still set despite no grapheme cells.
        assert!(p.get_row(2).grapheme_hint());
    }

    #[test]
    fn grapheme_key_follows_row_swap() {
        let mut p = small_page();
        p.append_grapheme(0, 0, '\u{0301}');
        p.swap_rows(0, 1);
        // the physical cell that carried the combining mark is now row 1's.
        assert_eq!(p.lookup_grapheme(0, 1), Some(&['\u{0301}'][..]));
        assert_eq!(p.lookup_grapheme(0, 0), None);
    }

    #[test]
    fn clear_row_resets_cells_and_flags() {
        let mut p = small_page();
        p.get_cell_mut(0, 0).codepoint = 'Z' as u32;
        p.get_cell_mut(1, 0).wide = Wide::Wide;
        p.append_grapheme(2, 0, 'q');
        p.clear_row(0);
        for c in p.get_cells(0) {
            assert!(c.is_empty());
        }
        assert!(!p.get_row(0).wrap());
        assert_eq!(p.lookup_grapheme(2, 0), None);
    }

    #[test]
    fn intern_style_dedups() {
        let mut p = small_page();
        let s = Style {
            fg: core_style::Color::Palette(3),
            ..Default::default()
        };
        let id1 = p.intern_style(s).unwrap();
        let id2 = p.intern_style(s).unwrap();
        assert_eq!(id1, id2);
    }

    #[test]
    fn default_style_is_id_zero_and_not_stored() {
        let mut p = small_page();
        let id = p.intern_style(Style::default()).unwrap();
        assert!(id.is_default());
    }
}
