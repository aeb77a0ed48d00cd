//! Scrollback + active area storage: a list of pages threaded
//! together, addressed through pins that survive page growth and eviction.

mod list;
mod pin;

pub use list::{Direction, PageId, PageList, RowIter, Traversal};
pub use pin::{Pin, PinHandle, Point};
