//! Unicode virtual placement iterator: scans the grid for
//! Kitty's Unicode-placeholder encoding (`U+10EEEE` plus two diacritics
//! that select row/col via a sorted lookup table) rather than relying on a
//! tracked [`core_pagelist::Pin`].

use core_pagelist::{Direction, PageList, Pin};
use std::sync::OnceLock;

/// Codepoint Kitty clients print to reserve a cell for a virtual placement.
pub const PLACEHOLDER_CODEPOINT: u32 = 0x10EEEE;

/// A virtual placement found by scanning the grid: the cell it occupies,
/// and the `(row, col)` it encodes via the cell's attached diacritics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualPlacement {
    pub pin: Pin,
    pub row: u32,
    pub col: u32,
}

/// Sorted table of combining-mark codepoints used as the row/col alphabet.
/// Reconstructed from the Unicode combining-diacritical-mark blocks (not a
/// verbatim copy of the upstream table, which wasn't available to ground
/// this against — see DESIGN.md). Binary search requires ascending order.
fn diacritics_table() -> &'static [char] {
    static TABLE: OnceLock<Vec<char>> = OnceLock::new();
    TABLE.get_or_init(|| {
        const RANGES: &[(u32, u32)] = &[
            (0x0300, 0x036F), // Combining Diacritical Marks
            (0x1AB0, 0x1AFF), // Combining Diacritical Marks Extended
            (0x1DC0, 0x1DFF), // Combining Diacritical Marks Supplement
            (0x20D0, 0x20FF), // Combining Diacritical Marks for Symbols
        ];
        let mut table: Vec<char> = RANGES
            .iter()
            .flat_map(|&(lo, hi)| lo..=hi)
            .filter_map(char::from_u32)
            .collect();
        table.sort_unstable();
        table.dedup();
        table
    })
}

fn table_index(c: char) -> Option<u32> {
    diacritics_table().binary_search(&c).ok().map(|i| i as u32)
}

/// Decode a placeholder cell's attached grapheme into row/col. A third
/// diacritic (high bits of an explicit image id) is part of the upstream
/// encoding but is not needed to resolve a placement; only the two that
/// select row/col are decoded here.
fn decode(graphemes: &[char]) -> Option<(u32, u32)> {
    if graphemes.len() < 2 {
        return None;
    }
    let row = table_index(graphemes[0])?;
    let col = table_index(graphemes[1])?;
    Some((row, col))
}

/// Scan up to `limit` rows from `start` in `direction` for virtual
/// placement cells.
pub fn scan(
    pagelist: &PageList,
    start: Pin,
    direction: Direction,
    limit: Option<u32>,
) -> Vec<VirtualPlacement> {
    let mut out = Vec::new();
    let cols = pagelist.cols();
    for pin in pagelist.row_iterator(start, direction, limit) {
        let row = pagelist.page(pin.page).get_row(pin.row_offset);
        if !row.grapheme_hint() {
            continue;
        }
        for x in 0..cols {
            let (_, cell) = pagelist.page(pin.page).get_row_and_cell(x, pin.row_offset);
            if cell.codepoint != PLACEHOLDER_CODEPOINT || !cell.has_grapheme {
                continue;
            }
            let Some(graphemes) = pagelist.page(pin.page).lookup_grapheme(x, pin.row_offset)
            else {
                continue;
            };
            if let Some((row_idx, col_idx)) = decode(graphemes) {
                out.push(VirtualPlacement {
                    pin: Pin::new(pin.page, pin.row_offset, x),
                    row: row_idx,
                    col: col_idx,
                });
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_page::Capacity;
    use core_pagelist::Point;

    #[test]
    fn table_is_sorted_and_nonempty() {
        let table = diacritics_table();
        assert!(!table.is_empty());
        assert!(table.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn scan_finds_placeholder_cell() {
        let mut list = PageList::new(10, 10, Capacity::default(), 100);
        let table = diacritics_table();
        let row_char = table[3];
        let col_char = table[5];

        {
            let pin = list.pin(Point::Active { x: 2, y: 1 }).unwrap();
            let page = list.page_mut(pin.page);
            let cell = page.get_cell_mut(2, pin.row_offset);
            cell.codepoint = PLACEHOLDER_CODEPOINT;
            cell.has_grapheme = true;
            page.append_grapheme(2, pin.row_offset, row_char);
            page.append_grapheme(2, pin.row_offset, col_char);
            page.set_row_grapheme_hint(pin.row_offset, true);
        }

        let start = list.pin(Point::Active { x: 0, y: 0 }).unwrap();
        let found = scan(&list, start, Direction::Forward, None);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].row, 3);
        assert_eq!(found[0].col, 5);
    }

    #[test]
    fn scan_skips_rows_without_grapheme_hint() {
        let list = PageList::new(5, 5, Capacity::default(), 100);
        let start = list.pin(Point::Active { x: 0, y: 0 }).unwrap();
        let found = scan(&list, start, Direction::Forward, None);
        assert!(found.is_empty());
    }
}
