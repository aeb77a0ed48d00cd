//! PageList: a doubly-linked list of [`Page`]s forming
//! scrollback plus the active area, with tracked pins that migrate across
//! page growth and eviction.

use crate::pin::{Pin, PinHandle, Point};
use core_page::{Capacity, Cell, Page, Row};
use tracing::debug;

/// Identifies a page within a [`PageList`]. Stable for the page's lifetime;
/// ids are reused (slab-allocated) once a page is evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageId(u32);

struct PageNode {
    page: Page,
    /// Rows of this page that are part of the list's history, `<=
    /// page.capacity().rows`. Distinct from `Page`'s own (fixed) `size`: the
    /// page is always allocated at full capacity, but only a prefix of it is
    /// "real" content the list will walk or pin into.
    written_rows: u16,
    prev: Option<PageId>,
    next: Option<PageId>,
}

/// Result of [`PageList::pin_down_overflow`] / [`PageList::pin_up_overflow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Traversal {
    /// Landed exactly on a row after consuming the full step count.
    Offset(Pin),
    /// Ran out of rows before consuming the full step; `end` is the
    /// furthest valid pin reached and `remaining` is how many rows short.
    Overflow { end: Pin, remaining: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

pub struct PageList {
    nodes: Vec<Option<PageNode>>,
    free: Vec<PageId>,
    head: Option<PageId>,
    tail: Option<PageId>,
    /// Height of the active area / viewport, in rows.
    rows: u16,
    cols: u16,
    capacity_template: Capacity,
    max_scrollback_rows: u32,
    pins: Vec<Option<Pin>>,
    pins_free: Vec<u32>,
}

impl PageList {
    /// Build a list with one page and `rows` blank rows already committed to
    /// the active area, so `pin(Point::Active { .. })` is valid from the
    /// first call — mirroring how a screen is expected to seed its viewport
    /// before any printing starts.
    pub fn new(rows: u16, cols: u16, capacity: Capacity, max_scrollback_rows: u32) -> Self {
        let capacity_template = Capacity {
            cols,
            ..capacity
        };
        let mut list = Self {
            nodes: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            rows,
            cols,
            capacity_template,
            max_scrollback_rows,
            pins: Vec::new(),
            pins_free: Vec::new(),
        };
        let first = list.alloc_page();
        list.head = Some(first);
        list.tail = Some(first);
        for _ in 0..rows {
            list.cursor_down_scroll();
        }
        list
    }

    pub fn rows(&self) -> u16 {
        self.rows
    }

    pub fn cols(&self) -> u16 {
        self.cols
    }

    fn node(&self, id: PageId) -> &PageNode {
        self.nodes[id.0 as usize].as_ref().expect("stale PageId")
    }

    fn node_mut(&mut self, id: PageId) -> &mut PageNode {
        self.nodes[id.0 as usize].as_mut().expect("stale PageId")
    }

    pub fn page(&self, id: PageId) -> &Page {
        &self.node(id).page
    }

    pub fn page_mut(&mut self, id: PageId) -> &mut Page {
        &mut self.node_mut(id).page
    }

    pub fn row(&self, pin: Pin) -> &Row {
        self.page(pin.page).get_row(pin.row_offset)
    }

    pub fn cells(&self, pin: Pin) -> &[Cell] {
        self.page(pin.page).get_cells(pin.row_offset)
    }

    fn alloc_page(&mut self) -> PageId {
        let page = Page::new(self.capacity_template);
        let node = PageNode {
            page,
            written_rows: 0,
            prev: None,
            next: None,
        };
        if let Some(id) = self.free.pop() {
            self.nodes[id.0 as usize] = Some(node);
            id
        } else {
            let id = PageId(self.nodes.len() as u32);
            self.nodes.push(Some(node));
            id
        }
    }

    fn append_page(&mut self) -> PageId {
        let new_id = self.alloc_page();
        let old_tail = self.tail.expect("list always has a tail");
        self.node_mut(old_tail).next = Some(new_id);
        self.node_mut(new_id).prev = Some(old_tail);
        self.tail = Some(new_id);
        new_id
    }

    /// Append a new row to the bottom of the active area: extends the tail
    /// page if it has spare capacity, otherwise allocates a new page. Evicts
    /// scrollback pages beyond `max_scrollback_rows` afterward.
    pub fn cursor_down_scroll(&mut self) -> Pin {
        let tail = self.tail.expect("list always has a tail");
        let page_capacity_rows = self.page(tail).capacity().rows;
        let (page_id, row) = {
            let node = self.node_mut(tail);
            if node.written_rows < page_capacity_rows {
                node.written_rows += 1;
                (tail, node.written_rows - 1)
            } else {
                let new_id = self.append_page();
                let node = self.node_mut(new_id);
                node.written_rows = 1;
                (new_id, 0)
            }
        };
        self.evict_excess_scrollback();
        Pin::new(page_id, row, 0)
    }

    fn total_written_rows(&self) -> u32 {
        let mut id = self.head;
        let mut total = 0u32;
        while let Some(cur) = id {
            let node = self.node(cur);
            total += node.written_rows as u32;
            id = node.next;
        }
        total
    }

    fn scrollback_rows(&self) -> u32 {
        self.total_written_rows()
            .saturating_sub(self.rows as u32)
    }

    fn evict_excess_scrollback(&mut self) {
        while self.scrollback_rows() > self.max_scrollback_rows && self.head != self.tail {
            self.remove_head_page();
        }
    }

    fn remove_head_page(&mut self) {
        let head = self.head.expect("list always has a head");
        let next = self.node(head).next.expect("head != tail implies a next page");
        self.node_mut(next).prev = None;
        self.head = Some(next);

        for slot in self.pins.iter_mut().flatten() {
            if slot.page == head {
                debug!(target: "pagelist.pin", "pin_clamped_to_new_head_on_evict");
                *slot = Pin::new(next, 0, slot.x);
            }
        }

        self.nodes[head.0 as usize] = None;
        self.free.push(head);
    }

    /// Resolve a tagged coordinate into a concrete pin. `None` only if the
    /// list is malformed (never happens in practice: the list always has at
    /// least one page).
    pub fn pin(&self, point: Point) -> Option<Pin> {
        let (x, y) = point.xy();
        match point {
            Point::Screen { .. } | Point::History { .. } => {
                let top = Pin::new(self.head?, 0, 0);
                match self.pin_down_overflow(top, y) {
                    Traversal::Offset(mut p) => {
                        p.x = x;
                        Some(p)
                    }
                    Traversal::Overflow { mut end, .. } => {
                        end.x = x;
                        Some(end)
                    }
                }
            }
            Point::Active { .. } | Point::Viewport { .. } => {
                let top = self.active_top();
                match self.pin_down_overflow(top, y) {
                    Traversal::Offset(mut p) => {
                        p.x = x;
                        Some(p)
                    }
                    Traversal::Overflow { mut end, .. } => {
                        end.x = x;
                        Some(end)
                    }
                }
            }
        }
    }

    /// Top-left pin of the active area: the last `self.rows` rows of the
    /// list, walking backward from the tail.
    fn active_top(&self) -> Pin {
        let mut remaining = self.rows as u32;
        let mut id = self.tail.expect("list always has a tail");
        loop {
            let node = self.node(id);
            let wr = node.written_rows as u32;
            if wr >= remaining {
                let row_offset = (wr - remaining) as u16;
                return Pin::new(id, row_offset, 0);
            }
            remaining -= wr;
            match node.prev {
                Some(prev) => id = prev,
                None => return Pin::new(id, 0, 0),
            }
        }
    }

    /// Walk forward `n` rows from `pin`, crossing page boundaries.
    pub fn pin_down_overflow(&self, pin: Pin, n: u32) -> Traversal {
        let mut id = pin.page;
        let mut row = pin.row_offset as u32;
        let mut remaining = n;
        loop {
            let node = self.node(id);
            let wr = node.written_rows as u32;
            let available = wr.saturating_sub(row + 1);
            if remaining <= available {
                return Traversal::Offset(Pin::new(id, (row + remaining) as u16, pin.x));
            }
            remaining -= available;
            match node.next {
                Some(next) => {
                    id = next;
                    row = 0;
                    if remaining == 0 {
                        return Traversal::Offset(Pin::new(id, 0, pin.x));
                    }
                    remaining -= 1;
                }
                None => {
                    let end_row = (wr.max(1) - 1) as u16;
                    return Traversal::Overflow {
                        end: Pin::new(id, end_row, pin.x),
                        remaining,
                    };
                }
            }
        }
    }

    /// Walk backward `n` rows from `pin`, crossing page boundaries.
    pub fn pin_up_overflow(&self, pin: Pin, n: u32) -> Traversal {
        let mut id = pin.page;
        let mut row = pin.row_offset as u32;
        let mut remaining = n;
        loop {
            if remaining <= row {
                return Traversal::Offset(Pin::new(id, (row - remaining) as u16, pin.x));
            }
            remaining -= row;
            let node = self.node(id);
            match node.prev {
                Some(prev) => {
                    id = prev;
                    let prev_wr = self.node(id).written_rows as u32;
                    row = prev_wr.saturating_sub(1);
                    if remaining == 0 {
                        return Traversal::Offset(Pin::new(id, row as u16, pin.x));
                    }
                    remaining -= 1;
                }
                None => {
                    return Traversal::Overflow {
                        end: Pin::new(id, 0, pin.x),
                        remaining,
                    };
                }
            }
        }
    }

    pub fn row_iterator(&self, start: Pin, direction: Direction, limit: Option<u32>) -> RowIter<'_> {
        RowIter {
            list: self,
            current: Some(start),
            direction,
            remaining: limit,
        }
    }

    pub fn track_pin(&mut self, pin: Pin) -> PinHandle {
        if let Some(idx) = self.pins_free.pop() {
            self.pins[idx as usize] = Some(pin);
            PinHandle(idx)
        } else {
            let idx = self.pins.len() as u32;
            self.pins.push(Some(pin));
            PinHandle(idx)
        }
    }

    pub fn untrack_pin(&mut self, handle: PinHandle) {
        if let Some(slot) = self.pins.get_mut(handle.0 as usize) {
            *slot = None;
            self.pins_free.push(handle.0);
        }
    }

    pub fn get_pin(&self, handle: PinHandle) -> Pin {
        self.pins[handle.0 as usize].expect("stale PinHandle")
    }

    /// Row-swap notification: when a caller (the print engine) swaps two row
    /// headers within `page` (e.g. for `insert_lines`), any tracked pin
    /// referencing either row must move with it.
    pub fn notify_rows_swapped(&mut self, page: PageId, a: u16, b: u16) {
        for slot in self.pins.iter_mut().flatten() {
            if slot.page == page {
                if slot.row_offset == a {
                    slot.row_offset = b;
                } else if slot.row_offset == b {
                    slot.row_offset = a;
                }
            }
        }
    }

    /// Change the viewport's row/column count. Growing or shrinking `rows`
    /// just changes how many trailing rows `active_top` walks back from —
    /// existing pages are untouched either way. `cols` only affects pages
    /// allocated from this point on: there is no reflow of already-written
    /// rows to a new width.
    pub fn resize(&mut self, rows: u16, cols: u16) {
        self.rows = rows;
        self.cols = cols;
        self.capacity_template.cols = cols;
    }
}

pub struct RowIter<'a> {
    list: &'a PageList,
    current: Option<Pin>,
    direction: Direction,
    remaining: Option<u32>,
}

impl<'a> Iterator for RowIter<'a> {
    type Item = Pin;

    fn next(&mut self) -> Option<Pin> {
        if let Some(0) = self.remaining {
            return None;
        }
        let pin = self.current?;
        if let Some(r) = &mut self.remaining {
            *r -= 1;
        }
        self.current = match self.direction {
            Direction::Forward => match self.list.pin_down_overflow(pin, 1) {
                Traversal::Offset(p) => Some(p),
                Traversal::Overflow { .. } => None,
            },
            Direction::Backward => match self.list.pin_up_overflow(pin, 1) {
                Traversal::Offset(p) => Some(p),
                Traversal::Overflow { .. } => None,
            },
        };
        Some(pin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_page::Capacity;

    fn small_capacity() -> Capacity {
        Capacity {
            cols: 10,
            rows: 4,
            styles: 8,
            grapheme_bytes: 64,
        }
    }

    #[test]
    fn new_list_seeds_active_rows() {
        let list = PageList::new(4, 10, small_capacity(), 100);
        let top = list.pin(Point::Active { x: 0, y: 0 }).unwrap();
        let bottom = list.pin(Point::Active { x: 0, y: 3 }).unwrap();
        assert_ne!(top, bottom);
    }

    #[test]
    fn cursor_down_scroll_spills_to_new_page_at_capacity() {
        let mut list = PageList::new(4, 10, small_capacity(), 100);
        // The first page (capacity.rows = 4) is already full from `new`.
        let pin = list.cursor_down_scroll();
        assert_ne!(pin.page, list.head.unwrap());
    }

    #[test]
    fn pin_down_overflow_crosses_page_boundary() {
        let mut list = PageList::new(4, 10, small_capacity(), 100);
        list.cursor_down_scroll();
        list.cursor_down_scroll();
        let start = Pin::new(list.head.unwrap(), 0, 0);
        match list.pin_down_overflow(start, 5) {
            Traversal::Offset(p) => assert_ne!(p.page, list.head.unwrap()),
            Traversal::Overflow { .. } => panic!("should have landed within the list"),
        }
    }

    #[test]
    fn pin_down_overflow_past_end_reports_remaining() {
        let list = PageList::new(4, 10, small_capacity(), 100);
        let start = Pin::new(list.head.unwrap(), 0, 0);
        match list.pin_down_overflow(start, 1000) {
            Traversal::Overflow { remaining, .. } => assert!(remaining > 0),
            Traversal::Offset(_) => panic!("1000 rows should overflow a 4-row page"),
        }
    }

    #[test]
    fn eviction_bounds_scrollback() {
        let mut list = PageList::new(4, 10, small_capacity(), 4);
        for _ in 0..20 {
            list.cursor_down_scroll();
        }
        assert!(list.scrollback_rows() <= 4 + small_capacity().rows as u32);
    }

    #[test]
    fn tracked_pin_migrates_on_row_swap() {
        let mut list = PageList::new(4, 10, small_capacity(), 100);
        let page = list.head.unwrap();
        let pin = Pin::new(page, 0, 0);
        let handle = list.track_pin(pin);
        list.notify_rows_swapped(page, 0, 1);
        assert_eq!(list.get_pin(handle).row_offset, 1);
    }

    #[test]
    fn row_iterator_forward_stops_at_limit() {
        let list = PageList::new(4, 10, small_capacity(), 100);
        let start = Pin::new(list.head.unwrap(), 0, 0);
        let rows: Vec<_> = list.row_iterator(start, Direction::Forward, Some(2)).collect();
        assert_eq!(rows.len(), 2);
    }
}
