//! Screen: cursor state, viewport, coordinate conversions and
//! string dumps over a [`PageList`].

use crate::cursor::Cursor;
use crate::region::ScrollingRegion;
use core_page::{Capacity, Page, Wide};
use core_pagelist::{Direction, PageList, Pin, Point, Traversal};
use tracing::trace;

pub use core_page::Capacity as PageCapacity;

pub struct Screen {
    pages: PageList,
    cursor: Cursor,
    saved_cursor: Option<Cursor>,
    region: ScrollingRegion,
    /// Rows the viewport is scrolled up from the bottom of the active area.
    /// `0` means the viewport shows the active area (the common case).
    viewport_offset: u32,
}

impl Screen {
    pub fn new(rows: u16, cols: u16, capacity: Capacity, max_scrollback_rows: u32) -> Self {
        let pages = PageList::new(rows, cols, capacity, max_scrollback_rows);
        let top_left = pages.pin(Point::Active { x: 0, y: 0 }).expect("active area always resolvable");
        Self {
            pages,
            cursor: Cursor::new(top_left),
            saved_cursor: None,
            region: ScrollingRegion::full(rows, cols),
            viewport_offset: 0,
        }
    }

    pub fn rows(&self) -> u16 {
        self.pages.rows()
    }

    pub fn cols(&self) -> u16 {
        self.pages.cols()
    }

    pub fn pages(&self) -> &PageList {
        &self.pages
    }

    pub fn pages_mut(&mut self) -> &mut PageList {
        &mut self.pages
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn cursor_mut(&mut self) -> &mut Cursor {
        &mut self.cursor
    }

    pub fn region(&self) -> ScrollingRegion {
        self.region
    }

    pub fn set_region(&mut self, region: ScrollingRegion) {
        self.region = region;
    }

    pub fn save_cursor(&mut self) {
        self.saved_cursor = Some(self.cursor);
    }

    pub fn restore_cursor(&mut self) {
        if let Some(saved) = self.saved_cursor.take() {
            self.cursor = saved;
        }
    }

    /// Reload the cursor's cached pin from `(x, y)` in the active area. Must
    /// be called after any operation that could have moved rows in memory
    /// (`insert_lines`, `scroll_down`) before trusting `cursor().pin()`.
    pub fn cursor_absolute(&mut self, x: u16, y: u16) {
        let pin = self
            .pages
            .pin(Point::Active { x, y: y as u32 })
            .expect("active area always resolvable");
        self.cursor.x = x;
        self.cursor.y = y;
        self.cursor.pin = pin;
    }

    /// Fast pointer-increment cursor move, one row down. Returns `false`
    /// (and leaves the cursor unmoved) at the bottom of the active area —
    /// the caller is expected to fall back to `grow_active_area` there.
    pub fn cursor_down(&mut self) -> bool {
        if self.cursor.y + 1 >= self.rows() {
            return false;
        }
        match self.pages.pin_down_overflow(self.cursor.pin, 1) {
            Traversal::Offset(p) => {
                self.cursor.y += 1;
                self.cursor.pin = p;
                true
            }
            Traversal::Overflow { .. } => false,
        }
    }

    pub fn cursor_up(&mut self, n: u16) {
        if n == 0 {
            return;
        }
        let n = n.min(self.cursor.y);
        if let Traversal::Offset(p) = self.pages.pin_up_overflow(self.cursor.pin, n as u32) {
            self.cursor.y -= n;
            self.cursor.pin = p;
        }
    }

    pub fn cursor_set_x(&mut self, x: u16) {
        let x = x.min(self.cols().saturating_sub(1));
        self.cursor.x = x;
        self.cursor.pin.x = x;
    }

    /// Grow the active area by one row (extends the tail page or allocates
    /// a new one, evicting scrollback as needed), and move the cursor to
    /// `(left, rows-1)` of it.
    pub fn grow_active_area(&mut self, left: u16) -> Pin {
        let pin = self.pages.cursor_down_scroll();
        self.cursor.y = self.rows() - 1;
        self.cursor.x = left;
        self.cursor.pin = Pin::new(pin.page, pin.row_offset, left);
        self.cursor.pin
    }

    /// Text content of the active rows `[top, bottom]`, newline-joined,
    /// trailing blank cells trimmed per row.
    pub fn dump_string_range(&self, top: u16, bottom: u16) -> String {
        let mut out = String::new();
        for (i, y) in (top..=bottom).enumerate() {
            if i > 0 {
                out.push('\n');
            }
            let Some(row_start) = self.pages.pin(Point::Active { x: 0, y: y as u32 }) else {
                continue;
            };
            let page = self.pages.page(row_start.page);
            let mut line = String::new();
            for x in 0..self.cols() {
                push_cell_text(page, row_start.row_offset, x, &mut line);
            }
            out.push_str(line.trim_end_matches(' '));
        }
        out
    }

    pub fn dump_string(&self) -> String {
        self.dump_string_range(0, self.rows() - 1)
    }

    /// [`dump_string`](Self::dump_string) with no distinction kept between
    /// trailing-blank rows — xterm's "plain text" selection semantics.
    pub fn plain_string(&self) -> String {
        self.dump_string().trim_end_matches('\n').to_string()
    }

    /// Pins for each row of the active area, top to bottom (or `limit` rows
    /// of it), for callers that want to walk cells themselves (the Unicode
    /// virtual placement iterator, selection, etc.).
    pub fn row_iterator_from_top(&self, limit: Option<u32>) -> impl Iterator<Item = Pin> + '_ {
        let top = self
            .pages
            .pin(Point::Active { x: 0, y: 0 })
            .expect("active area always resolvable");
        self.pages.row_iterator(top, Direction::Forward, limit)
    }

    pub fn viewport_offset(&self) -> u32 {
        self.viewport_offset
    }

    pub fn scroll_viewport_to_top(&mut self) {
        self.viewport_offset = u32::MAX;
        trace!(target: "screen.viewport", "viewport_scrolled_to_top");
    }

    pub fn scroll_viewport_to_bottom(&mut self) {
        self.viewport_offset = 0;
    }

    /// Resize the viewport. Per the documented policy, this adjusts
    /// dimensions and clamps the cursor and region but never reflows
    /// existing rows to a new column count (see [`PageList::resize`]).
    pub fn resize(&mut self, rows: u16, cols: u16) {
        self.pages.resize(rows, cols);
        self.region = ScrollingRegion::full(rows, cols);
        let x = self.cursor.x.min(cols.saturating_sub(1));
        let y = self.cursor.y.min(rows.saturating_sub(1));
        self.cursor_absolute(x, y);
        self.viewport_offset = 0;
    }
}

fn push_cell_text(page: &Page, row: u16, col: u16, out: &mut String) {
    let (_, cell) = page.get_row_and_cell(col, row);
    if matches!(cell.wide, Wide::SpacerTail | Wide::SpacerHead) {
        return;
    }
    if cell.is_empty() {
        out.push(' ');
        return;
    }
    if let Some(c) = char::from_u32(cell.codepoint) {
        out.push(c);
    }
    if cell.has_grapheme {
        if let Some(extra) = page.lookup_grapheme(col, row) {
            out.extend(extra.iter());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_page::Capacity;

    fn small() -> Screen {
        Screen::new(
            5,
            10,
            Capacity {
                cols: 10,
                rows: 5,
                styles: 8,
                grapheme_bytes: 64,
            },
            1000,
        )
    }

    #[test]
    fn new_screen_dumps_all_blank() {
        let s = small();
        // every row is all-spaces, and trailing blanks are trimmed per row
        assert_eq!(s.dump_string(), "\n\n\n\n");
    }

    #[test]
    fn cursor_absolute_updates_cached_pin() {
        let mut s = small();
        s.cursor_absolute(3, 2);
        assert_eq!(s.cursor().x, 3);
        assert_eq!(s.cursor().y, 2);
    }

    #[test]
    fn cursor_down_stops_at_bottom_of_active_area() {
        let mut s = small();
        s.cursor_absolute(0, 4);
        assert!(!s.cursor_down());
        assert_eq!(s.cursor().y, 4);
    }

    #[test]
    fn grow_active_area_advances_viewport() {
        let mut s = small();
        let before = s.pages().rows();
        s.grow_active_area(0);
        assert_eq!(s.pages().rows(), before);
        assert_eq!(s.cursor().y, s.rows() - 1);
    }

    #[test]
    fn save_and_restore_cursor_roundtrip() {
        let mut s = small();
        s.cursor_absolute(2, 2);
        s.save_cursor();
        s.cursor_absolute(0, 0);
        s.restore_cursor();
        assert_eq!(s.cursor().x, 2);
        assert_eq!(s.cursor().y, 2);
    }

    #[test]
    fn dump_reflects_written_cells() {
        let mut s = small();
        let page = s.pages_mut().page_mut(s.cursor().pin().page);
        page.get_cell_mut(0, 0).codepoint = 'h' as u32;
        page.get_cell_mut(1, 0).codepoint = 'i' as u32;
        let dump = s.dump_string_range(0, 0);
        assert_eq!(dump, "hi");
    }
}
