//! Fixed page capacity and current (logical) size.

use crate::cell::{Cell, Row};
use std::mem::size_of;

/// A page's fixed, immutable-after-construction capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capacity {
    pub cols: u16,
    pub rows: u16,
    pub styles: u16,
    pub grapheme_bytes: u32,
}

impl Default for Capacity {
    fn default() -> Self {
        Self {
            cols: 250,
            rows: 250,
            styles: 128,
            grapheme_bytes: 1024,
        }
    }
}

impl Capacity {
    /// Re-derive a row count for a new column count, holding the total
    /// `rows * (row_header + cols * cell)` byte budget constant. Fails (`None`)
    /// if that would require zero rows.
    pub fn adjust_cols(&self, new_cols: u16) -> Option<Capacity> {
        let row_header = size_of::<Row>() as u64;
        let cell = size_of::<Cell>() as u64;
        let total = self.rows as u64 * (row_header + self.cols as u64 * cell);
        let per_row = row_header + new_cols as u64 * cell;
        if per_row == 0 {
            return None;
        }
        let new_rows = total / per_row;
        if new_rows == 0 || new_rows > u16::MAX as u64 {
            return None;
        }
        Some(Capacity {
            cols: new_cols,
            rows: new_rows as u16,
            ..*self
        })
    }

    pub fn cell_buffer_bytes(&self) -> usize {
        self.rows as usize * self.cols as usize * size_of::<Cell>()
    }
}

/// A page's current logical size; always `<= capacity` component-wise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    pub cols: u16,
    pub rows: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjust_cols_preserves_total_budget() {
        let cap = Capacity {
            cols: 100,
            rows: 100,
            ..Default::default()
        };
        let adjusted = cap.adjust_cols(50).unwrap();
        assert_eq!(adjusted.cols, 50);
        assert!(adjusted.rows > cap.rows);
    }

    #[test]
    fn adjust_cols_to_zero_rows_fails() {
        let cap = Capacity {
            cols: 10,
            rows: 1,
            ..Default::default()
        };
        // A huge new column count would need 0 rows to stay within budget.
        assert!(cap.adjust_cols(u16::MAX).is_none());
    }
}
