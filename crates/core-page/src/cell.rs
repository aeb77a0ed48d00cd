//! Row and Cell layouts: the packed, zero-initializable per-cell data a
//! page stores.

use bitflags::bitflags;
use core_offset::O;
use core_style::Id as StyleId;

/// How a cell participates in a wide-character pair.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Wide {
    #[default]
    Narrow = 0,
    /// The left half of a wide character; must be followed by `SpacerTail`.
    Wide = 1,
    /// The right half of a wide character.
    SpacerTail = 2,
    /// Reserves the rightmost column of a row for a wide character that
    /// wrapped to column 0 of the next row.
    SpacerHead = 3,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RowFlags: u8 {
        /// This row's last cell logically continues onto the next row.
        const WRAP = 1 << 0;
        /// This row's first cell is the continuation of the previous row's wrap.
        const WRAP_CONTINUATION = 1 << 1;
        /// Hint: at least one cell in this row carries a grapheme. Never
        /// cleared eagerly by single-cell operations (see `clear_grapheme`).
        const GRAPHEME = 1 << 2;
    }
}

/// A single grid cell. The all-zero value is a valid, empty cell: this is
/// relied on since page storage is zero-initialized on allocation.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cell {
    pub codepoint: u32,
    pub style_id: u16,
    pub wide: Wide,
    pub has_grapheme: bool,
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        *self == Cell::default()
    }

    pub fn style_id(&self) -> StyleId {
        StyleId(self.style_id)
    }
}

/// A row header: an offset to this row's `cols` cells within the page's cell
/// buffer, plus flags. Rows are swapped (not their cell data) to implement
/// `insert_lines`/scroll without an O(cols) copy per row.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Row {
    pub cells: O<Cell>,
    pub flags: RowFlags,
}

impl Row {
    pub fn new(cells: O<Cell>) -> Self {
        Self {
            cells,
            flags: RowFlags::empty(),
        }
    }

    pub fn wrap(&self) -> bool {
        self.flags.contains(RowFlags::WRAP)
    }

    pub fn set_wrap(&mut self, v: bool) {
        self.flags.set(RowFlags::WRAP, v);
    }

    pub fn wrap_continuation(&self) -> bool {
        self.flags.contains(RowFlags::WRAP_CONTINUATION)
    }

    pub fn set_wrap_continuation(&mut self, v: bool) {
        self.flags.set(RowFlags::WRAP_CONTINUATION, v);
    }

    pub fn grapheme_hint(&self) -> bool {
        self.flags.contains(RowFlags::GRAPHEME)
    }

    pub fn set_grapheme_hint(&mut self, v: bool) {
        self.flags.set(RowFlags::GRAPHEME, v);
    }
}
