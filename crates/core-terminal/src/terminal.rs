//! The print/cursor engine: turns decoded characters and
//! cursor-motion requests into writes against a [`Screen`]'s pages.

use crate::modes::{Mode, Modes, StatusDisplay};
use core_page::{Cell, Wide};
use core_pagelist::Pin;
use core_screen::{PageCapacity, Screen, Tabstops};
use core_style::Id as StyleId;
use tracing::trace;

pub struct Terminal {
    primary: Screen,
    alternate: Screen,
    alt_active: bool,
    modes: Modes,
    status_display: StatusDisplay,
    tabstops: Tabstops,
}

impl Terminal {
    pub fn new(rows: u16, cols: u16, capacity: PageCapacity, max_scrollback_rows: u32) -> Self {
        Self {
            primary: Screen::new(rows, cols, capacity, max_scrollback_rows),
            alternate: Screen::new(rows, cols, capacity, 0),
            alt_active: false,
            modes: Modes::default(),
            status_display: StatusDisplay::default(),
            tabstops: Tabstops::new(cols),
        }
    }

    pub fn screen(&self) -> &Screen {
        if self.alt_active { &self.alternate } else { &self.primary }
    }

    pub fn screen_mut(&mut self) -> &mut Screen {
        if self.alt_active { &mut self.alternate } else { &mut self.primary }
    }

    pub fn primary(&self) -> &Screen {
        &self.primary
    }

    pub fn alternate(&self) -> &Screen {
        &self.alternate
    }

    pub fn cols(&self) -> u16 {
        self.screen().cols()
    }

    pub fn rows(&self) -> u16 {
        self.screen().rows()
    }

    pub fn modes(&self) -> &Modes {
        &self.modes
    }

    pub fn set_mode(&mut self, mode: Mode, value: bool) {
        self.modes.set(mode, value);
    }

    pub fn mode(&self, mode: Mode) -> bool {
        self.modes.get(mode)
    }

    pub fn status_display(&self) -> StatusDisplay {
        self.status_display
    }

    pub fn set_status_display(&mut self, display: StatusDisplay) {
        self.status_display = display;
    }

    pub fn set_alt_screen(&mut self, active: bool) {
        if active == self.alt_active {
            return;
        }
        self.alt_active = active;
        self.screen_mut().cursor_mut().pending_wrap = false;
    }

    pub fn resize(&mut self, rows: u16, cols: u16) {
        self.primary.resize(rows, cols);
        self.alternate.resize(rows, cols);
        self.tabstops = Tabstops::new(cols);
    }

    // -- tab stops ---------------------------------------------------

    pub fn set_tab_stop_at_cursor(&mut self) {
        let x = self.screen().cursor().x;
        self.tabstops.set(x);
    }

    pub fn clear_tab_stop_at_cursor(&mut self) {
        let x = self.screen().cursor().x;
        self.tabstops.clear(x);
    }

    pub fn clear_all_tab_stops(&mut self) {
        self.tabstops.reset(0);
    }

    pub fn reset_tab_stops(&mut self, interval: u16) {
        self.tabstops.reset(interval);
    }

    // -- cell/page plumbing --------------------------------------------

    fn pin_at(&self, x: u16, y: u16) -> Pin {
        self.screen()
            .pages()
            .pin(core_pagelist::Point::Active { x, y: y as u32 })
            .expect("active area always resolvable")
    }

    fn cell_at(&self, x: u16, y: u16) -> Cell {
        let pin = self.pin_at(x, y);
        *self.screen().pages().page(pin.page).get_row_and_cell(x, pin.row_offset).1
    }

    fn cluster_text_at(&self, x: u16, y: u16) -> String {
        let pin = self.pin_at(x, y);
        let page = self.screen().pages().page(pin.page);
        let (_, cell) = page.get_row_and_cell(x, pin.row_offset);
        let mut s = String::new();
        if cell.codepoint != 0 {
            if let Some(c) = char::from_u32(cell.codepoint) {
                s.push(c);
            }
        }
        if cell.has_grapheme {
            if let Some(extra) = page.lookup_grapheme(x, pin.row_offset) {
                s.extend(extra.iter());
            }
        }
        s
    }

    /// The text cell immediately to the left of `(x, y)`, skipping over a
    /// `SpacerTail` to land on its `Wide` partner. `None` at the left edge.
    fn prev_text_cell(&self, x: u16, y: u16) -> Option<(u16, u16)> {
        if x == 0 {
            return None;
        }
        let left = x - 1;
        if self.cell_at(left, y).wide == Wide::SpacerTail {
            if left == 0 {
                return None;
            }
            return Some((left - 1, y));
        }
        Some((left, y))
    }

    /// `right_limit` is `region.right` when the cursor sits inside the
    /// scrolling region's columns, otherwise the full screen width — the
    /// cursor can be parked outside the margins (by `CUP`, say) and `print`
    /// still needs a sane column to wrap against.
    fn right_limit(&self) -> u16 {
        let region = self.screen().region();
        let x = self.screen().cursor().x;
        if x >= region.left && x <= region.right {
            region.right
        } else {
            self.cols().saturating_sub(1)
        }
    }

    fn reset_cell_to_default(&mut self, x: u16, y: u16) {
        let pin = self.pin_at(x, y);
        let page = self.screen_mut().pages_mut().page_mut(pin.page);
        let old = *page.get_row_and_cell(x, pin.row_offset).1;
        if old.has_grapheme {
            page.clear_grapheme(x, pin.row_offset);
        }
        if !old.style_id().is_default() {
            page.style_release(old.style_id());
        }
        *page.get_cell_mut(x, pin.row_offset) = Cell::default();
    }

    fn write_spacer_tail(&mut self, x: u16, y: u16, style_id: StyleId) {
        self.reset_cell_to_default(x, y);
        let pin = self.pin_at(x, y);
        let page = self.screen_mut().pages_mut().page_mut(pin.page);
        let cell = page.get_cell_mut(x, pin.row_offset);
        cell.wide = Wide::SpacerTail;
        cell.style_id = style_id.0;
        if !style_id.is_default() {
            page.style_ref(style_id);
        }
    }

    fn write_spacer_head(&mut self, x: u16, y: u16, style_id: StyleId) {
        self.reset_cell_to_default(x, y);
        let pin = self.pin_at(x, y);
        let page = self.screen_mut().pages_mut().page_mut(pin.page);
        let cell = page.get_cell_mut(x, pin.row_offset);
        cell.wide = Wide::SpacerHead;
        cell.style_id = style_id.0;
        if !style_id.is_default() {
            page.style_ref(style_id);
        }
    }

    /// Clears the wide/spacer neighbor left behind by overwriting one half of
    /// a wide-character pair. `spacer_head` is deliberately left untouched —
    /// reclaiming it would require walking back onto the previous row, and a
    /// stray `SpacerHead` is cosmetic (it renders as a blank column) rather
    /// than a correctness hazard.
    fn unlink_wide_pair(&mut self, wide_x: u16, y: u16) {
        let cols = self.cols();
        if wide_x + 1 < cols {
            self.reset_cell_to_default(wide_x + 1, y);
        }
        if wide_x == 0 && y > 0 {
            let pin = self.pin_at(0, y);
            let wrapped = self.screen().pages().page(pin.page).get_row(pin.row_offset).wrap_continuation();
            if wrapped {
                self.reset_cell_to_default(cols - 1, y - 1);
            }
        }
    }

    /// Overwrite `(x, y)` with a single codepoint, releasing whatever was
    /// there (style ref, grapheme continuations, wide-pair neighbor) first.
    fn print_cell(&mut self, x: u16, y: u16, c: char, wide: Wide) {
        let old = self.cell_at(x, y);
        if old.wide != wide {
            match old.wide {
                Wide::Wide => self.unlink_wide_pair(x, y),
                Wide::SpacerTail if x > 0 => self.unlink_wide_pair(x - 1, y),
                _ => {}
            }
        }
        let style_id = self.screen().cursor().style_id;
        self.reset_cell_to_default(x, y);
        let pin = self.pin_at(x, y);
        let page = self.screen_mut().pages_mut().page_mut(pin.page);
        let cell = page.get_cell_mut(x, pin.row_offset);
        cell.codepoint = c as u32;
        cell.style_id = style_id.0;
        cell.wide = wide;
        if !style_id.is_default() {
            page.style_ref(style_id);
        }
    }

    fn append_grapheme_at(&mut self, x: u16, y: u16, c: char) {
        let pin = self.pin_at(x, y);
        self.screen_mut().pages_mut().page_mut(pin.page).append_grapheme(x, pin.row_offset, c);
    }

    fn make_wide_at(&mut self, x: u16, y: u16) {
        let region = self.screen().region();
        if x >= region.right {
            // No room to expand this cell into a pair in place; leave it
            // narrow and fall through to a plain grapheme append.
            return;
        }
        let pin = self.pin_at(x, y);
        self.screen_mut().pages_mut().page_mut(pin.page).get_cell_mut(x, pin.row_offset).wide = Wide::Wide;
        let style_id = self.cell_at(x, y).style_id();
        self.write_spacer_tail(x + 1, y, style_id);
    }

    fn make_narrow_at(&mut self, x: u16, y: u16) {
        let pin = self.pin_at(x, y);
        self.screen_mut().pages_mut().page_mut(pin.page).get_cell_mut(x, pin.row_offset).wide = Wide::Narrow;
        if x + 1 < self.cols() {
            self.reset_cell_to_default(x + 1, y);
        }
    }

    fn handle_grapheme_extend(&mut self, x: u16, y: u16, c: char) {
        let base = char::from_u32(self.cell_at(x, y).codepoint);
        if c == core_text::VS16 && self.cell_at(x, y).wide != Wide::Wide && base.is_some_and(core_text::is_extended_pictographic) {
            self.make_wide_at(x, y);
        } else if c == core_text::VS15 && self.cell_at(x, y).wide == Wide::Wide {
            self.make_narrow_at(x, y);
        }
        self.append_grapheme_at(x, y, c);
    }

    // -- print -----------------------------------------------------------

    /// Print one decoded character, applying grapheme clustering (if mode
    /// 2027 is on), wide-character pairing, wraparound and the scrolling
    /// region. A no-op while the status line (not the grid) is selected.
    pub fn print(&mut self, c: char) {
        if !self.is_main_display() {
            return;
        }
        if self.modes.grapheme_cluster {
            let cursor_x = self.screen().cursor().x;
            if cursor_x > 0 {
                if let Some((px, py)) = self.prev_text_cell(cursor_x, self.screen().cursor().y) {
                    let prev_text = self.cluster_text_at(px, py);
                    if !prev_text.is_empty() && !core_text::is_break(&prev_text, c) {
                        self.handle_grapheme_extend(px, py, c);
                        return;
                    }
                }
            }
        }
        match core_text::codepoint_width(c) {
            2 => self.print_width2(c),
            _ => self.print_width1(c),
        }
    }

    fn resolve_pending_wrap(&mut self, width: u16) {
        if !self.screen().cursor().pending_wrap {
            return;
        }
        if self.modes.wraparound {
            self.do_wrap();
        } else {
            self.screen_mut().cursor_mut().pending_wrap = false;
            let right = self.right_limit();
            let left = self.screen().region().left;
            let x = if width == 2 { right.saturating_sub(1) } else { right };
            self.screen_mut().cursor_set_x(x.max(left));
        }
    }

    fn print_width1(&mut self, c: char) {
        self.resolve_pending_wrap(1);
        let x = self.screen().cursor().x;
        let y = self.screen().cursor().y;
        self.print_cell(x, y, c, Wide::Narrow);
        let right = self.right_limit();
        if x == right {
            self.screen_mut().cursor_mut().pending_wrap = true;
        } else {
            self.screen_mut().cursor_set_x(x + 1);
        }
    }

    fn print_width2(&mut self, c: char) {
        self.resolve_pending_wrap(2);
        let x = self.screen().cursor().x;
        let y = self.screen().cursor().y;
        let right = self.right_limit();
        let left = self.screen().region().left;
        if right == left {
            // No room to place a wide pair at all: write a single space,
            // same as the effective-width-1 case real terminals fall back to.
            self.print_cell(x, y, ' ', Wide::Narrow);
            if x == right {
                self.screen_mut().cursor_mut().pending_wrap = true;
            } else {
                self.screen_mut().cursor_set_x(x + 1);
            }
            return;
        }
        if x == right {
            if !self.modes.wraparound {
                // Dropped silently: no room for the pair and nothing to wrap into.
                return;
            }
            let style_id = self.screen().cursor().style_id;
            self.write_spacer_head(x, y, style_id);
            self.do_wrap();
            let y2 = self.screen().cursor().y;
            let left = self.screen().region().left;
            self.place_wide_pair(left, y2, c);
            return;
        }
        self.place_wide_pair(x, y, c);
    }

    fn place_wide_pair(&mut self, x: u16, y: u16, c: char) {
        let style_id = self.screen().cursor().style_id;
        self.print_cell(x, y, c, Wide::Wide);
        self.write_spacer_tail(x + 1, y, style_id);
        let right = self.right_limit();
        if x + 1 == right {
            self.screen_mut().cursor_set_x(right);
            self.screen_mut().cursor_mut().pending_wrap = true;
        } else {
            self.screen_mut().cursor_set_x(x + 2);
        }
    }

    fn do_wrap(&mut self) {
        let y = self.screen().cursor().y;
        let x = self.screen().cursor().x;
        let pin = self.pin_at(x, y);
        self.screen_mut().pages_mut().page_mut(pin.page).set_row_wrap(pin.row_offset, true);
        self.index();
        let left = self.screen().region().left;
        self.screen_mut().cursor_set_x(left);
        let y2 = self.screen().cursor().y;
        let pin2 = self.pin_at(left, y2);
        self.screen_mut().pages_mut().page_mut(pin2.page).set_row_wrap_continuation(pin2.row_offset, true);
        self.screen_mut().cursor_mut().pending_wrap = false;
    }

    // -- cursor motion and scrolling --------------------------------------

    /// Whether the grid (as opposed to the OSC-set status line) is the
    /// active display. Every grid-mutating entry point below is a no-op
    /// otherwise.
    fn is_main_display(&self) -> bool {
        self.status_display == StatusDisplay::Main
    }

    pub fn carriage_return(&mut self) {
        if !self.is_main_display() {
            return;
        }
        let region = self.screen().region();
        let x = self.screen().cursor().x;
        let target = if self.modes.origin {
            region.left
        } else if x >= region.left {
            region.left
        } else {
            0
        };
        self.screen_mut().cursor_set_x(target);
        self.screen_mut().cursor_mut().pending_wrap = false;
    }

    pub fn linefeed(&mut self) {
        self.index();
        if self.modes.linefeed {
            self.carriage_return();
        }
    }

    /// Move the cursor down one row, scrolling the region (or growing the
    /// active area, outside a restricted region) at the bottom margin.
    pub fn index(&mut self) {
        if !self.is_main_display() {
            return;
        }
        let region = self.screen().region();
        let rows = self.rows();
        let cols = self.cols();
        let y = self.screen().cursor().y;
        if y < region.top || y > region.bottom {
            if y + 1 < rows {
                self.screen_mut().cursor_down();
            }
            return;
        }
        if y == region.bottom {
            if region.is_full_screen(rows, cols) {
                let x = self.screen().cursor().x;
                self.screen_mut().grow_active_area(x);
            } else {
                self.scroll_region_up(1);
            }
            return;
        }
        self.screen_mut().cursor_down();
    }

    pub fn cursor_right(&mut self, n: u16) {
        if !self.is_main_display() {
            return;
        }
        let limit = self.right_limit();
        let x = self.screen().cursor().x;
        self.screen_mut().cursor_set_x((x + n).min(limit));
        self.screen_mut().cursor_mut().pending_wrap = false;
    }

    /// `cursor_left`, honoring reverse-wrap: when the cursor is already at
    /// the left margin and `n` is not yet exhausted, reverse-wrap walks up a
    /// row (to the right margin) instead of stopping, and the extended
    /// variant additionally permits crossing the very top of the region.
    /// xterm loops all the way to the bottom-right corner from `(0, 0)`;
    /// this core terminates the loop there instead (documented simplification).
    pub fn cursor_left(&mut self, mut n: u16) {
        if !self.is_main_display() {
            return;
        }
        let region = self.screen().region();
        while n > 0 {
            let x = self.screen().cursor().x;
            let left_limit = if x >= region.left { region.left } else { 0 };
            if x > left_limit {
                self.screen_mut().cursor_set_x(x - 1);
                n -= 1;
                continue;
            }
            if !(self.modes.reverse_wrap || self.modes.reverse_wrap_extended) {
                break;
            }
            n -= 1;
            let y = self.screen().cursor().y;
            if y > region.top {
                self.screen_mut().cursor_up(1);
                let right = if self.modes.enable_left_and_right_margin { region.right } else { self.cols() - 1 };
                self.screen_mut().cursor_set_x(right);
            } else if self.modes.reverse_wrap_extended {
                break;
            } else {
                break;
            }
        }
        self.screen_mut().cursor_mut().pending_wrap = false;
    }

    pub fn set_cursor_pos(&mut self, row: u16, col: u16) {
        if !self.is_main_display() {
            return;
        }
        let region = self.screen().region();
        let origin = self.modes.origin;
        let (base_y, base_x, max_y, max_x) = if origin {
            (region.top, region.left, region.bottom, region.right)
        } else {
            (0, 0, self.rows() - 1, self.cols() - 1)
        };
        let y = (base_y + row.saturating_sub(1)).min(max_y);
        let x = (base_x + col.saturating_sub(1)).min(max_x);
        self.screen_mut().cursor_absolute(x, y);
        self.screen_mut().cursor_mut().pending_wrap = false;
    }

    pub fn set_top_and_bottom_margin(&mut self, top: u16, bottom: u16) {
        if !self.is_main_display() {
            return;
        }
        let rows = self.rows();
        let t = top.saturating_sub(1).min(rows - 1);
        let b = if bottom == 0 { rows - 1 } else { bottom.saturating_sub(1).min(rows - 1) };
        if t >= b {
            trace!(target: "terminal.margin", "ignored_invalid_top_bottom_margin");
            return;
        }
        let mut region = self.screen().region();
        region.top = t;
        region.bottom = b;
        self.screen_mut().set_region(region);
        self.home_cursor_for_margin_change(region);
    }

    pub fn set_left_and_right_margin(&mut self, left: u16, right: u16) {
        if !self.is_main_display() {
            return;
        }
        if !self.modes.enable_left_and_right_margin {
            return;
        }
        let cols = self.cols();
        let l = left.saturating_sub(1).min(cols - 1);
        let r = if right == 0 { cols - 1 } else { right.saturating_sub(1).min(cols - 1) };
        if l >= r {
            trace!(target: "terminal.margin", "ignored_invalid_left_right_margin");
            return;
        }
        let mut region = self.screen().region();
        region.left = l;
        region.right = r;
        self.screen_mut().set_region(region);
        self.home_cursor_for_margin_change(region);
    }

    fn home_cursor_for_margin_change(&mut self, region: core_screen::ScrollingRegion) {
        let (x, y) = if self.modes.origin { (region.left, region.top) } else { (0, 0) };
        self.screen_mut().cursor_absolute(x, y);
        self.screen_mut().cursor_mut().pending_wrap = false;
    }

    fn swap_active_rows(&mut self, y1: u16, y2: u16) {
        let p1 = self.pin_at(0, y1);
        let p2 = self.pin_at(0, y2);
        if p1.page == p2.page {
            let page = p1.page;
            self.screen_mut().pages_mut().page_mut(page).swap_rows(p1.row_offset, p2.row_offset);
            self.screen_mut().pages_mut().notify_rows_swapped(page, p1.row_offset, p2.row_offset);
        } else {
            self.swap_rows_cross_page(p1, p2);
        }
    }

    /// Row swap that straddles a page boundary: no pointer-swap shortcut is
    /// available, so cell content and grapheme continuations are copied by
    /// hand. Tracked pins are not migrated here — a vanishingly rare path
    /// given the default page capacity comfortably spans one screen's worth
    /// of rows.
    fn swap_rows_cross_page(&mut self, p1: Pin, p2: Pin) {
        let cols = self.cols();
        let mut hint1 = false;
        let mut hint2 = false;
        for x in 0..cols {
            let c1 = *self.screen().pages().page(p1.page).get_row_and_cell(x, p1.row_offset).1;
            let c2 = *self.screen().pages().page(p2.page).get_row_and_cell(x, p2.row_offset).1;
            let g1 = self.screen().pages().page(p1.page).lookup_grapheme(x, p1.row_offset).map(<[char]>::to_vec);
            let g2 = self.screen().pages().page(p2.page).lookup_grapheme(x, p2.row_offset).map(<[char]>::to_vec);

            let page1 = self.screen_mut().pages_mut().page_mut(p1.page);
            page1.clear_grapheme(x, p1.row_offset);
            *page1.get_cell_mut(x, p1.row_offset) = c2;
            if let Some(g) = &g2 {
                for ch in g {
                    page1.append_grapheme(x, p1.row_offset, *ch);
                }
                hint1 = true;
            }

            let page2 = self.screen_mut().pages_mut().page_mut(p2.page);
            page2.clear_grapheme(x, p2.row_offset);
            *page2.get_cell_mut(x, p2.row_offset) = c1;
            if let Some(g) = &g1 {
                for ch in g {
                    page2.append_grapheme(x, p2.row_offset, *ch);
                }
                hint2 = true;
            }
        }
        let (wrap1, cont1) = {
            let row = self.screen().pages().page(p1.page).get_row(p1.row_offset);
            (row.wrap(), row.wrap_continuation())
        };
        let (wrap2, cont2) = {
            let row = self.screen().pages().page(p2.page).get_row(p2.row_offset);
            (row.wrap(), row.wrap_continuation())
        };
        let page1 = self.screen_mut().pages_mut().page_mut(p1.page);
        page1.set_row_wrap(p1.row_offset, wrap2);
        page1.set_row_wrap_continuation(p1.row_offset, cont2);
        page1.set_row_grapheme_hint(p1.row_offset, hint1);
        let page2 = self.screen_mut().pages_mut().page_mut(p2.page);
        page2.set_row_wrap(p2.row_offset, wrap1);
        page2.set_row_wrap_continuation(p2.row_offset, cont1);
        page2.set_row_grapheme_hint(p2.row_offset, hint2);
    }

    fn shift_region_down_by_one(&mut self, top: u16, bottom: u16) {
        if bottom <= top {
            return;
        }
        for row in (top + 1..=bottom).rev() {
            self.swap_active_rows(row, row - 1);
        }
    }

    fn shift_region_up_by_one(&mut self, top: u16, bottom: u16) {
        if bottom <= top {
            return;
        }
        for row in top..bottom {
            self.swap_active_rows(row, row + 1);
        }
    }

    fn clear_row_region(&mut self, y: u16) {
        let region = self.screen().region();
        for x in region.left..=region.right {
            self.reset_cell_to_default(x, y);
        }
        let pin = self.pin_at(region.left, y);
        let page = self.screen_mut().pages_mut().page_mut(pin.page);
        page.set_row_wrap(pin.row_offset, false);
        page.set_row_wrap_continuation(pin.row_offset, false);
    }

    fn scroll_region_up(&mut self, n: u16) {
        let region = self.screen().region();
        let n = n.min(region.height());
        if n == 0 {
            return;
        }
        for _ in 0..n {
            self.shift_region_up_by_one(region.top, region.bottom);
        }
        for row in (region.bottom - n + 1)..=region.bottom {
            self.clear_row_region(row);
        }
    }

    /// `SD` — scroll the whole region's content down by `n`, pulling blank
    /// rows in at the top margin.
    pub fn scroll_down(&mut self, n: u16) {
        if !self.is_main_display() {
            return;
        }
        let region = self.screen().region();
        let n = n.min(region.height());
        if n == 0 {
            return;
        }
        for _ in 0..n {
            self.shift_region_down_by_one(region.top, region.bottom);
        }
        for row in region.top..(region.top + n) {
            self.clear_row_region(row);
        }
    }

    /// `IL` — insert `n` blank lines at the cursor row, pushing the rows
    /// below it down and off the bottom margin. A no-op outside the region.
    pub fn insert_lines(&mut self, n: u16) {
        if !self.is_main_display() {
            return;
        }
        let region = self.screen().region();
        let y = self.screen().cursor().y;
        if y < region.top || y > region.bottom {
            return;
        }
        let available = region.bottom - y + 1;
        let n = n.min(available);
        if n == 0 {
            return;
        }
        for _ in 0..n {
            self.shift_region_down_by_one(y, region.bottom);
        }
        for row in y..(y + n) {
            self.clear_row_region(row);
        }
        let left = region.left;
        self.screen_mut().cursor_absolute(left, y);
        self.screen_mut().cursor_mut().pending_wrap = false;
    }

    /// `ECH` — clear `n` cells starting at the cursor, clamped to the
    /// current right limit. Does not move the cursor.
    pub fn erase_chars(&mut self, n: u16) {
        if !self.is_main_display() || n == 0 {
            return;
        }
        let x = self.screen().cursor().x;
        let y = self.screen().cursor().y;
        let limit = self.right_limit();
        let mut end = x.saturating_add(n).min(limit + 1).max(x);
        if end > x && end - 1 < self.cols() && self.cell_at(end - 1, y).wide == Wide::Wide && end < self.cols() {
            end += 1;
        }
        for col in x..end {
            self.reset_cell_to_default(col, y);
        }
        let pin = self.pin_at(0, y);
        let page = self.screen_mut().pages_mut().page_mut(pin.page);
        page.set_row_wrap(pin.row_offset, false);
        self.screen_mut().cursor_mut().pending_wrap = false;
    }

    pub fn horizontal_tab(&mut self) {
        if !self.is_main_display() {
            return;
        }
        let limit = self.right_limit();
        let x = self.screen().cursor().x;
        let next = self.tabstops.next_stop(x, limit + 1).unwrap_or(limit);
        self.screen_mut().cursor_set_x(next);
        self.screen_mut().cursor_mut().pending_wrap = false;
    }

    pub fn horizontal_tab_back(&mut self) {
        if !self.is_main_display() {
            return;
        }
        let region = self.screen().region();
        let x = self.screen().cursor().x;
        let left = if x >= region.left { region.left } else { 0 };
        let prev = self.tabstops.prev_stop(x, left).unwrap_or(left);
        self.screen_mut().cursor_set_x(prev);
        self.screen_mut().cursor_mut().pending_wrap = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_page::Capacity;

    fn small() -> Terminal {
        Terminal::new(
            5,
            10,
            Capacity {
                cols: 10,
                rows: 5,
                styles: 8,
                grapheme_bytes: 256,
            },
            1000,
        )
    }

    fn row_text(t: &Terminal, y: u16) -> String {
        t.screen().dump_string_range(y, y)
    }

    #[test]
    fn print_advances_cursor_and_writes_cells() {
        let mut t = small();
        for c in "hi".chars() {
            t.print(c);
        }
        assert_eq!(row_text(&t, 0), "hi");
        assert_eq!(t.screen().cursor().x, 2);
    }

    #[test]
    fn print_wraps_at_right_margin() {
        let mut t = small();
        for c in "0123456789".chars() {
            t.print(c);
        }
        // pending_wrap set, not yet consumed
        assert_eq!(t.screen().cursor().y, 0);
        assert!(t.screen().cursor().pending_wrap);
        t.print('X');
        assert_eq!(t.screen().cursor().y, 1);
        assert_eq!(row_text(&t, 1), "X");
        assert!(t.screen().pages().page(t.screen().cursor().pin().page).get_row(0).wrap());
    }

    #[test]
    fn wide_character_occupies_two_cells() {
        let mut t = small();
        t.print('\u{4E2D}'); // CJK wide char
        assert_eq!(t.screen().cursor().x, 2);
        let pin = t.pin_at(0, 0);
        let page = t.screen().pages().page(pin.page);
        assert_eq!(page.get_cells(0)[0].wide, Wide::Wide);
        assert_eq!(page.get_cells(0)[1].wide, Wide::SpacerTail);
    }

    #[test]
    fn vs16_widens_emoji_presentation() {
        let mut t = small();
        t.set_mode(Mode::GraphemeCluster, true);
        t.print('\u{2764}'); // heavy black heart, narrow by default
        assert_eq!(t.screen().cursor().x, 1);
        t.print(core_text::VS16);
        let pin = t.pin_at(0, 0);
        let page = t.screen().pages().page(pin.page);
        assert_eq!(page.get_cells(0)[0].wide, Wide::Wide);
        assert_eq!(page.get_cells(0)[1].wide, Wide::SpacerTail);
    }

    #[test]
    fn carriage_return_and_linefeed() {
        let mut t = small();
        t.print('a');
        t.print('b');
        t.carriage_return();
        assert_eq!(t.screen().cursor().x, 0);
        t.linefeed();
        assert_eq!(t.screen().cursor().y, 1);
    }

    #[test]
    fn index_scrolls_at_bottom_of_restricted_region() {
        let mut t = small();
        t.set_top_and_bottom_margin(1, 3);
        for _ in 0..3 {
            t.index();
        }
        // region height is 3 (rows 0..=2); three indexes from row 0 lands
        // back at row 2 (the bottom), having scrolled once.
        assert_eq!(t.screen().cursor().y, 2);
    }

    #[test]
    fn insert_lines_pushes_content_down_and_clears_cursor_row() {
        let mut t = small();
        t.print('a');
        t.carriage_return();
        t.index();
        t.print('b');
        t.screen_mut().cursor_absolute(0, 0);
        t.insert_lines(1);
        assert_eq!(row_text(&t, 0), "");
        assert_eq!(row_text(&t, 1), "a");
        assert_eq!(row_text(&t, 2), "b");
    }

    #[test]
    fn erase_chars_clears_without_moving_cursor() {
        let mut t = small();
        for c in "hello".chars() {
            t.print(c);
        }
        t.screen_mut().cursor_absolute(1, 0);
        t.erase_chars(3);
        assert_eq!(row_text(&t, 0), "h");
        assert_eq!(t.screen().cursor().x, 1);
    }

    #[test]
    fn erase_chars_sweeps_trailing_wide_spacer() {
        let mut t = small();
        t.print('a');
        t.print('\u{4E2D}'); // wide char at columns 1-2
        t.screen_mut().cursor_absolute(1, 0);
        t.erase_chars(1);
        let pin = t.pin_at(0, 0);
        let page = t.screen().pages().page(pin.page);
        assert!(page.get_cells(0)[1].is_empty());
        assert!(page.get_cells(0)[2].is_empty());
    }

    #[test]
    fn horizontal_tab_stops_at_default_interval() {
        let mut t = small();
        t.horizontal_tab();
        assert_eq!(t.screen().cursor().x, 8);
    }

    #[test]
    fn cursor_left_reverse_wraps_to_previous_row() {
        let mut t = small();
        t.set_mode(Mode::ReverseWrap, true);
        t.screen_mut().cursor_absolute(0, 1);
        t.cursor_left(1);
        assert_eq!(t.screen().cursor().y, 0);
        assert_eq!(t.screen().cursor().x, 9);
    }

    #[test]
    fn cursor_left_extended_terminates_at_origin() {
        let mut t = small();
        t.set_mode(Mode::ReverseWrapExtended, true);
        t.screen_mut().cursor_absolute(0, 0);
        t.cursor_left(5);
        assert_eq!(t.screen().cursor().x, 0);
        assert_eq!(t.screen().cursor().y, 0);
    }

    #[test]
    fn wide_char_on_one_column_terminal_writes_a_space() {
        let mut t = Terminal::new(
            3,
            1,
            Capacity {
                cols: 1,
                rows: 3,
                styles: 8,
                grapheme_bytes: 64,
            },
            1000,
        );
        t.print('\u{4E2D}'); // CJK wide char: no room for a pair on a 1-col grid
        let pin = t.pin_at(0, 0);
        let page = t.screen().pages().page(pin.page);
        let cell = page.get_cells(0)[0];
        assert_eq!(cell.codepoint, ' ' as u32);
        assert_eq!(cell.wide, Wide::Narrow);
        assert!(t.screen().cursor().pending_wrap);
    }

    #[test]
    fn wide_char_at_margin_with_wraparound_off_is_dropped() {
        let mut t = small();
        t.set_mode(Mode::Wraparound, false);
        for _ in 0..9 {
            t.print('x');
        }
        assert_eq!(t.screen().cursor().x, 9);
        t.print('\u{4E2D}'); // CJK wide char: no room at the margin, wraparound is off
        assert_eq!(t.screen().cursor().x, 9);
        assert!(!t.screen().cursor().pending_wrap);
        let pin = t.pin_at(9, 0);
        let page = t.screen().pages().page(pin.page);
        assert!(page.get_cells(0)[9].is_empty());
    }

    #[test]
    fn print_is_a_no_op_while_status_line_is_selected() {
        let mut t = small();
        t.set_status_display(StatusDisplay::StatusLine);
        t.print('x');
        assert_eq!(row_text(&t, 0), "");
        assert_eq!(t.screen().cursor().x, 0);
    }
}
