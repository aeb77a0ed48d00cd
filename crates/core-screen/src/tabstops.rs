//! Tab stop bitset.
//!
//! `SmallVec<[u64; 8]>` inlines up to 512 columns' worth of bits and spills
//! to the heap beyond that, which is exactly the "preallocate for 512,
//! overflow otherwise" shape this wants without hand-rolling the spill logic.

use smallvec::SmallVec;

pub struct Tabstops {
    words: SmallVec<[u64; 8]>,
    cols: u16,
}

impl Tabstops {
    pub fn new(cols: u16) -> Self {
        let word_count = (cols as usize).div_ceil(64).max(1);
        let mut t = Self {
            words: SmallVec::from_elem(0u64, word_count),
            cols,
        };
        t.reset(8);
        t
    }

    pub fn cols(&self) -> u16 {
        self.cols
    }

    fn word_index(col: u16) -> (usize, u32) {
        (col as usize / 64, col as u32 % 64)
    }

    pub fn set(&mut self, col: u16) {
        if col >= self.cols {
            return;
        }
        let (w, b) = Self::word_index(col);
        self.words[w] |= 1u64 << b;
    }

    pub fn clear(&mut self, col: u16) {
        if col >= self.cols {
            return;
        }
        let (w, b) = Self::word_index(col);
        self.words[w] &= !(1u64 << b);
    }

    pub fn is_set(&self, col: u16) -> bool {
        if col >= self.cols {
            return false;
        }
        let (w, b) = Self::word_index(col);
        self.words[w] & (1u64 << b) != 0
    }

    /// Clear every stop, then set one every `interval` columns starting at
    /// `interval - 1`, stopping before `cols - 1` (the last column never
    /// gets an implicit stop).
    pub fn reset(&mut self, interval: u16) {
        for w in self.words.iter_mut() {
            *w = 0;
        }
        if interval == 0 {
            return;
        }
        let mut col = interval.saturating_sub(1);
        while col < self.cols.saturating_sub(1) {
            self.set(col);
            col += interval;
        }
    }

    /// The next set stop strictly after `col`, if any, within `limit`.
    pub fn next_stop(&self, col: u16, limit: u16) -> Option<u16> {
        let mut c = col + 1;
        while c < limit.min(self.cols) {
            if self.is_set(c) {
                return Some(c);
            }
            c += 1;
        }
        None
    }

    /// The previous set stop strictly before `col`, if any, at or after
    /// `limit`.
    pub fn prev_stop(&self, col: u16, limit: u16) -> Option<u16> {
        let mut c = col;
        while c > limit {
            c -= 1;
            if self.is_set(c) {
                return Some(c);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_interval_is_eight() {
        let t = Tabstops::new(40);
        assert!(t.is_set(7));
        assert!(t.is_set(15));
        assert!(!t.is_set(8));
    }

    #[test]
    fn reset_clears_previous_stops() {
        let mut t = Tabstops::new(40);
        t.set(3);
        t.reset(10);
        assert!(!t.is_set(3));
        assert!(t.is_set(9));
        assert!(t.is_set(19));
    }

    #[test]
    fn never_sets_last_column() {
        let t = Tabstops::new(16);
        assert!(!t.is_set(15));
    }

    #[test]
    fn next_and_prev_stop() {
        let t = Tabstops::new(40);
        assert_eq!(t.next_stop(0, 40), Some(7));
        assert_eq!(t.next_stop(7, 40), Some(15));
        assert_eq!(t.prev_stop(10, 0), Some(7));
    }

    #[test]
    fn spills_to_heap_beyond_512_columns() {
        let t = Tabstops::new(1000);
        assert_eq!(t.cols(), 1000);
        assert!(t.words.spilled());
    }
}
