//! Screen and tabstops: cursor-aware coordinate
//! conversions and string dumps over a [`core_pagelist::PageList`].

mod cursor;
mod region;
mod screen;
mod tabstops;

pub use cursor::Cursor;
pub use region::ScrollingRegion;
pub use screen::{PageCapacity, Screen};
pub use tabstops::Tabstops;
